use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::persist::{self, PersistError};

pub const NA: &str = "N/A";

pub const REQUIRED_COLUMNS: [&str; 7] = [
    "Org",
    "Standard",
    "Stable Version",
    "Stable Version Link",
    "Draft Version",
    "Draft Version Link",
    "Core Changes",
];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("standards CSV missing required column {0:?}")]
    MissingColumn(&'static str),
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Issuing organization. A closed set: adding one means adding a variant and
/// its extractor, not editing a dispatch chain. Unknown tags load as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Org {
    W3c,
    Iso,
    Ietf,
    Oidf,
    Eu,
    Hl,
    Other,
}

impl Org {
    pub fn parse(tag: &str) -> Org {
        match tag.trim().to_ascii_uppercase().as_str() {
            "W3C" => Org::W3c,
            "ISO" => Org::Iso,
            "IETF" => Org::Ietf,
            "OIDF" => Org::Oidf,
            "EU" => Org::Eu,
            "HL" => Org::Hl,
            _ => Org::Other,
        }
    }
}

impl fmt::Display for Org {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Org::W3c => "W3C",
            Org::Iso => "ISO",
            Org::Ietf => "IETF",
            Org::Oidf => "OIDF",
            Org::Eu => "EU",
            Org::Hl => "HL",
            Org::Other => "Other",
        };
        f.write_str(tag)
    }
}

/// One tracked standard. `name` is immutable identity; the four value fields
/// use the `"N/A"` sentinel for absent and are the only fields the engine
/// mutates (plus `core_changes`, rewritten when a version field changed).
#[derive(Debug, Clone, Serialize)]
pub struct StandardRecord {
    pub org: Org,
    pub org_tag: String,
    pub name: String,
    pub stable_version: String,
    pub stable_link: String,
    pub draft_version: String,
    pub draft_link: String,
    pub core_changes: String,
}

impl StandardRecord {
    pub fn has_stable_link(&self) -> bool {
        !is_na(&self.stable_link)
    }

    pub fn has_draft_link(&self) -> bool {
        !is_na(&self.draft_link)
    }
}

/// Normalize the CSV's flavors of "nothing here" to the one sentinel.
pub fn norm_na(v: &str) -> String {
    let s = v.trim();
    if s.is_empty() {
        return NA.to_string();
    }
    match s.to_ascii_lowercase().as_str() {
        "nan" | "none" | "null" | "n/a" => NA.to_string(),
        _ => s.to_string(),
    }
}

pub fn is_na(v: &str) -> bool {
    norm_na(v) == NA
}

/// Load the ordered record list, rejecting an incomplete header set before
/// the engine runs.
pub fn load(path: &Path) -> Result<Vec<StandardRecord>, StoreError> {
    let content = std::fs::read_to_string(path).map_err(|e| StoreError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut reader = csv::Reader::from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    for col in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == col) {
            return Err(StoreError::MissingColumn(col));
        }
    }
    let idx = |col: &str| headers.iter().position(|h| h == col).unwrap();
    let (i_org, i_name) = (idx("Org"), idx("Standard"));
    let (i_sv, i_sl) = (idx("Stable Version"), idx("Stable Version Link"));
    let (i_dv, i_dl) = (idx("Draft Version"), idx("Draft Version Link"));
    let i_cc = idx("Core Changes");

    let mut rows = Vec::new();
    for result in reader.records() {
        let rec = result?;
        let get = |i: usize| rec.get(i).unwrap_or("").to_string();
        let org_tag = get(i_org).trim().to_string();
        rows.push(StandardRecord {
            org: Org::parse(&org_tag),
            org_tag,
            name: get(i_name).trim().to_string(),
            stable_version: norm_na(&get(i_sv)),
            stable_link: norm_na(&get(i_sl)),
            draft_version: norm_na(&get(i_dv)),
            draft_link: norm_na(&get(i_dl)),
            core_changes: get(i_cc),
        });
    }
    info!("loaded {} records from {}", rows.len(), path.display());
    Ok(rows)
}

/// Write the full record list back, atomically, preserving input order.
pub fn write(path: &Path, rows: &[StandardRecord]) -> Result<(), StoreError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(REQUIRED_COLUMNS)?;
    for r in rows {
        wtr.write_record([
            r.org_tag.as_str(),
            r.name.as_str(),
            r.stable_version.as_str(),
            r.stable_link.as_str(),
            r.draft_version.as_str(),
            r.draft_link.as_str(),
            r.core_changes.as_str(),
        ])?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| StoreError::Csv(csv::Error::from(e.into_error())))?;
    let content = String::from_utf8_lossy(&bytes).into_owned();
    persist::write_atomic(path, &content)?;
    info!("wrote {} records to {}", rows.len(), path.display());
    Ok(())
}
