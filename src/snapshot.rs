use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::RunContext;
use crate::fetch::{FetchError, FetchedPage};
use crate::persist::{self, PersistError};

static SAFE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]").unwrap());

/// What one observation of a URL concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    /// No prior snapshot existed; the current content became the baseline.
    Baseline,
    Unchanged,
    Changed,
}

#[derive(Debug)]
pub struct Observed {
    pub status: ChangeStatus,
    /// Lines to extract from: the fresh page on success, the prior snapshot
    /// on fetch failure.
    pub lines: Vec<String>,
    /// The fetched page, absent when the fetch failed.
    pub page: Option<FetchedPage>,
    /// Relative path of the diff artifact written this observation, if any.
    pub diff_file: Option<String>,
}

impl Observed {
    pub fn changed(&self) -> bool {
        matches!(self.status, ChangeStatus::Baseline | ChangeStatus::Changed)
    }
}

/// Persists the last-known normalized text of each tracked URL, one file per
/// URL, and reports whether content changed since the previous observation.
/// The prior snapshot exists only long enough to compute one diff artifact.
pub struct SnapshotStore {
    snapshot_dir: PathBuf,
    diff_dir: PathBuf,
    baseline_diff: bool,
    dry_run: bool,
}

impl SnapshotStore {
    pub fn new(ctx: &RunContext) -> SnapshotStore {
        SnapshotStore {
            snapshot_dir: ctx.snapshot_dir.clone(),
            diff_dir: ctx.diff_dir.clone(),
            baseline_diff: ctx.baseline_diff,
            dry_run: ctx.dry_run,
        }
    }

    /// Record one observation of `url`. The fetch outcome comes in from the
    /// collaborator; a failure degrades to the prior snapshot with
    /// `Unchanged` so the row proceeds on previously known state.
    pub fn observe(
        &self,
        url: &str,
        fetched: Result<FetchedPage, FetchError>,
    ) -> Result<Observed, PersistError> {
        let snapshot_path = self.snapshot_path(url);
        let prev = load_lines(&snapshot_path);

        let page = match fetched {
            Ok(page) => page,
            Err(e) => {
                warn!("fetch failed for {}: {} (using prior snapshot)", url, e);
                return Ok(Observed {
                    status: ChangeStatus::Unchanged,
                    lines: prev.unwrap_or_default(),
                    page: None,
                    diff_file: None,
                });
            }
        };
        let cur = page.lines.clone();

        match prev {
            Some(prev) if prev == cur => {
                debug!("unchanged: {}", url);
                Ok(Observed {
                    status: ChangeStatus::Unchanged,
                    lines: cur,
                    page: Some(page),
                    diff_file: None,
                })
            }
            Some(prev) => {
                info!(
                    "changed: {} ({} -> {} lines)",
                    url,
                    prev.len(),
                    cur.len()
                );
                let diff_file = self.write_diff(url, &prev, &cur)?;
                self.save_snapshot(&snapshot_path, &cur)?;
                Ok(Observed {
                    status: ChangeStatus::Changed,
                    lines: cur,
                    page: Some(page),
                    diff_file,
                })
            }
            None => {
                info!("baseline: {}", url);
                self.save_snapshot(&snapshot_path, &cur)?;
                let diff_file = if self.baseline_diff {
                    self.write_diff(url, &[], &cur)?
                } else {
                    None
                };
                Ok(Observed {
                    status: ChangeStatus::Baseline,
                    lines: cur,
                    page: Some(page),
                    diff_file,
                })
            }
        }
    }

    fn snapshot_path(&self, url: &str) -> PathBuf {
        self.snapshot_dir.join(format!("{}.txt", safe_filename(url)))
    }

    fn save_snapshot(&self, path: &Path, lines: &[String]) -> Result<(), PersistError> {
        if self.dry_run {
            debug!("dry-run: skipping snapshot {}", path.display());
            return Ok(());
        }
        let mut content = lines.join("\n");
        content.push('\n');
        persist::write_atomic(path, &content)
    }

    fn write_diff(
        &self,
        url: &str,
        prev: &[String],
        cur: &[String],
    ) -> Result<Option<String>, PersistError> {
        let diff = unified_diff(prev, cur);
        if diff.is_empty() {
            return Ok(None);
        }
        // No artifact path leaves a dry run: changelog notes would point at
        // files that were never written.
        if self.dry_run {
            debug!("dry-run: skipping diff for {}", url);
            return Ok(None);
        }
        let ts = Utc::now().format("%Y%m%d-%H%M%S");
        let name = format!("{}__{}.diff", safe_filename(url), ts);
        let path = self.diff_dir.join(&name);
        persist::write_atomic(&path, &format!("{}\n", diff))?;
        info!("diff written for {}: {}", url, path.display());
        Ok(Some(path.display().to_string()))
    }
}

/// Filesystem-safe name for a URL: host+path with non-alphanumerics
/// collapsed to `_`, truncated to 200 chars.
pub fn safe_filename(url: &str) -> String {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let stripped = stripped.split(['?', '#']).next().unwrap_or(stripped);
    let safe = SAFE_RE.replace_all(stripped, "_");
    safe.chars().take(200).collect()
}

fn load_lines(path: &Path) -> Option<Vec<String>> {
    let content = std::fs::read_to_string(path).ok()?;
    Some(content.lines().map(str::to_string).collect())
}

/// Unified diff over two line sequences (`---`/`+++`/`@@` hunks, 3 lines of
/// context). Snapshots are small, so a quadratic LCS table is fine.
pub fn unified_diff(prev: &[String], cur: &[String]) -> String {
    if prev == cur {
        return String::new();
    }

    // ops: (tag, prev_index, cur_index), tag in {'=', '-', '+'}
    let ops = diff_ops(prev, cur);

    const CONTEXT: usize = 3;
    let mut out = vec!["--- before".to_string(), "+++ after".to_string()];

    let mut i = 0;
    while i < ops.len() {
        if ops[i].0 == '=' {
            i += 1;
            continue;
        }
        // extend a hunk over nearby changes separated by <= 2*CONTEXT equals
        let start = i;
        let mut end = i;
        let mut j = i;
        while j < ops.len() {
            if ops[j].0 != '=' {
                end = j;
                j += 1;
            } else {
                let run_start = j;
                while j < ops.len() && ops[j].0 == '=' {
                    j += 1;
                }
                if j < ops.len() && j - run_start <= CONTEXT * 2 {
                    continue;
                }
                break;
            }
        }

        let hunk_lo = start.saturating_sub(CONTEXT);
        let hunk_hi = (end + 1 + CONTEXT).min(ops.len());
        let slice = &ops[hunk_lo..hunk_hi];

        let prev_start = slice
            .iter()
            .find_map(|&(t, pi, _)| (t != '+').then_some(pi))
            .unwrap_or(0);
        let cur_start = slice
            .iter()
            .find_map(|&(t, _, ci)| (t != '-').then_some(ci))
            .unwrap_or(0);
        let prev_count = slice.iter().filter(|&&(t, _, _)| t != '+').count();
        let cur_count = slice.iter().filter(|&&(t, _, _)| t != '-').count();

        out.push(format!(
            "@@ -{},{} +{},{} @@",
            prev_start + 1,
            prev_count,
            cur_start + 1,
            cur_count
        ));
        for &(tag, pi, ci) in slice {
            match tag {
                '-' => out.push(format!("-{}", prev[pi])),
                '+' => out.push(format!("+{}", cur[ci])),
                _ => out.push(format!(" {}", prev[pi])),
            }
        }

        i = hunk_hi;
    }

    out.join("\n")
}

fn diff_ops(prev: &[String], cur: &[String]) -> Vec<(char, usize, usize)> {
    let n = prev.len();
    let m = cur.len();
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if prev[i] == cur[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if prev[i] == cur[j] {
            ops.push(('=', i, j));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            ops.push(('-', i, j));
            i += 1;
        } else {
            ops.push(('+', i, j));
            j += 1;
        }
    }
    while i < n {
        ops.push(('-', i, j));
        i += 1;
    }
    while j < m {
        ops.push(('+', i, j));
        j += 1;
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchedPage;

    fn ctx(dir: &Path, baseline_diff: bool) -> RunContext {
        RunContext {
            csv_path: dir.join("standards.csv"),
            readme_path: dir.join("README.md"),
            snapshot_dir: dir.join("snapshots"),
            diff_dir: dir.join("diffs"),
            baseline_diff,
            concurrency: 1,
            dry_run: false,
        }
    }

    fn page(lines: &[&str]) -> FetchedPage {
        FetchedPage {
            final_url: "https://example.org/spec/".to_string(),
            raw: lines.join("\n"),
            lines: lines.iter().map(|s| s.to_string()).collect(),
            last_modified: None,
        }
    }

    #[test]
    fn first_observation_is_baseline_without_diff() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(&ctx(dir.path(), false));

        let obs = store
            .observe("https://example.org/spec/", Ok(page(&["a", "b"])))
            .unwrap();
        assert_eq!(obs.status, ChangeStatus::Baseline);
        assert!(obs.changed());
        assert!(obs.diff_file.is_none());
        assert!(store.snapshot_path("https://example.org/spec/").exists());
    }

    #[test]
    fn baseline_diff_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(&ctx(dir.path(), true));
        let obs = store
            .observe("https://example.org/spec/", Ok(page(&["a"])))
            .unwrap();
        assert_eq!(obs.status, ChangeStatus::Baseline);
        assert!(obs.diff_file.is_some());
    }

    #[test]
    fn identical_content_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(&ctx(dir.path(), false));
        let url = "https://example.org/spec/";

        store.observe(url, Ok(page(&["a", "b"]))).unwrap();
        let obs = store.observe(url, Ok(page(&["a", "b"]))).unwrap();
        assert_eq!(obs.status, ChangeStatus::Unchanged);
        assert!(!obs.changed());
        assert!(obs.diff_file.is_none());
    }

    #[test]
    fn content_difference_writes_diff_and_replaces_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(&ctx(dir.path(), false));
        let url = "https://example.org/spec/";

        store.observe(url, Ok(page(&["a", "b"]))).unwrap();
        let obs = store.observe(url, Ok(page(&["a", "c"]))).unwrap();
        assert_eq!(obs.status, ChangeStatus::Changed);
        let diff_file = obs.diff_file.expect("diff artifact");
        let diff = std::fs::read_to_string(&diff_file).unwrap();
        assert!(diff.contains("-b"));
        assert!(diff.contains("+c"));

        // snapshot now holds the new content
        let obs = store.observe(url, Ok(page(&["a", "c"]))).unwrap();
        assert_eq!(obs.status, ChangeStatus::Unchanged);
    }

    #[test]
    fn dry_run_reports_change_without_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://example.org/spec/";

        let store = SnapshotStore::new(&ctx(dir.path(), false));
        store.observe(url, Ok(page(&["a", "b"]))).unwrap();

        let dry = SnapshotStore::new(&RunContext {
            dry_run: true,
            ..ctx(dir.path(), false)
        });
        let obs = dry.observe(url, Ok(page(&["a", "c"]))).unwrap();
        assert_eq!(obs.status, ChangeStatus::Changed);
        assert!(obs.diff_file.is_none());

        // snapshot untouched: a real run afterwards still sees the change
        let obs = store.observe(url, Ok(page(&["a", "c"]))).unwrap();
        assert_eq!(obs.status, ChangeStatus::Changed);
    }

    #[test]
    fn fetch_failure_degrades_to_prior_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(&ctx(dir.path(), false));
        let url = "https://example.org/spec/";

        store.observe(url, Ok(page(&["a", "b"]))).unwrap();
        let obs = store
            .observe(
                url,
                Err(FetchError::Status {
                    url: url.to_string(),
                    status: 503,
                }),
            )
            .unwrap();
        assert_eq!(obs.status, ChangeStatus::Unchanged);
        assert_eq!(obs.lines, vec!["a".to_string(), "b".to_string()]);
        assert!(obs.page.is_none());
    }

    #[test]
    fn safe_filename_collapses() {
        assert_eq!(
            safe_filename("https://www.w3.org/TR/did-core/"),
            "www_w3_org_TR_did_core_"
        );
        assert_eq!(
            safe_filename("https://example.org/a?b=c"),
            "example_org_a"
        );
    }

    #[test]
    fn unified_diff_shape() {
        let prev: Vec<String> = ["one", "two", "three"].iter().map(|s| s.to_string()).collect();
        let cur: Vec<String> = ["one", "2", "three"].iter().map(|s| s.to_string()).collect();
        let d = unified_diff(&prev, &cur);
        assert!(d.starts_with("--- before\n+++ after\n@@"));
        assert!(d.contains("\n-two\n+2\n"));
        assert!(unified_diff(&prev, &prev).is_empty());
    }
}
