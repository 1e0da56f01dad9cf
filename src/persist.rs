use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::debug;

/// Atomic write failure. Fatal for the run: the rename-based replace never
/// partially applies, so the previous on-disk state stays intact.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

/// Write `content` to `path` via a temp file in the same directory plus an
/// atomic rename, so a crash mid-write never leaves a partial file behind.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), PersistError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    ensure_dir(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| PersistError::Write {
        path: path.display().to_string(),
        source: e,
    })?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| PersistError::Write {
            path: path.display().to_string(),
            source: e,
        })?;
    tmp.persist(path).map_err(|e| PersistError::Write {
        path: path.display().to_string(),
        source: e.error,
    })?;

    debug!("saved {} ({} bytes)", path.display(), content.len());
    Ok(())
}

pub fn ensure_dir(dir: &Path) -> Result<(), PersistError> {
    fs::create_dir_all(dir).map_err(|e| PersistError::CreateDir {
        path: dir.display().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_replace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_atomic(&path, "first\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\n");
        write_atomic(&path, "second\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second\n");
    }

    #[test]
    fn creates_missing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/out.txt");
        write_atomic(&path, "x").unwrap();
        assert!(path.exists());
    }
}
