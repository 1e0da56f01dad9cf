use std::path::PathBuf;

use crate::record::Org;

/// All run-scoped settings, built once in `main` and passed explicitly into
/// every component. Environment overrides mirror the deployed automation:
/// `SVT_LOG_ROOT`, `SVT_SNAPSHOT_DIR`, `SVT_DIFF_DIR`, `SVT_BASELINE_DIFF`.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub csv_path: PathBuf,
    pub readme_path: PathBuf,
    pub snapshot_dir: PathBuf,
    pub diff_dir: PathBuf,
    /// Also write a diff artifact on first observation of a URL.
    pub baseline_diff: bool,
    /// Max concurrent row fetches.
    pub concurrency: usize,
    pub dry_run: bool,
}

impl RunContext {
    pub fn from_env(csv_path: Option<PathBuf>, dry_run: bool) -> Self {
        let log_root = env_path("SVT_LOG_ROOT").unwrap_or_else(|| PathBuf::from("logs"));
        let snapshot_dir =
            env_path("SVT_SNAPSHOT_DIR").unwrap_or_else(|| log_root.join("snapshots"));
        let diff_dir = env_path("SVT_DIFF_DIR").unwrap_or_else(|| log_root.join("diffs"));

        RunContext {
            csv_path: csv_path.unwrap_or_else(|| PathBuf::from("standards.csv")),
            readme_path: PathBuf::from("README.md"),
            snapshot_dir,
            diff_dir,
            baseline_diff: env_truthy("SVT_BASELINE_DIFF"),
            concurrency: 4,
            dry_run,
        }
    }

    /// Whether a draft link discovered on a stable page is recorded even when
    /// its page yielded no usable version. W3C and ISO links carry signal on
    /// their own; for the other organizations an unversioned link is noise.
    pub fn record_unversioned_draft_link(&self, org: Org) -> bool {
        matches!(org, Org::W3c | Org::Iso)
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_truthy(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
