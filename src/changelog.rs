use std::path::Path;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::persist::{self, PersistError};

const HEADING: &str = "## Changelog";

/// One adopted field change: produced only when the merge policy accepted a
/// candidate strictly different from the stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEntry {
    pub org: String,
    pub name: String,
    pub field: String,
    pub old: String,
    pub new: String,
}

/// A page whose content changed (or was baselined) this run, pointing at the
/// diff artifact that was written.
#[derive(Debug, Clone)]
pub struct ContentNote {
    pub org: String,
    pub name: String,
    pub note: String,
}

/// All changes of one run, in input row order, under one run date.
#[derive(Debug)]
pub struct Batch {
    pub date: NaiveDate,
    pub entries: Vec<ChangeEntry>,
    pub notes: Vec<ContentNote>,
}

impl Batch {
    pub fn new(date: NaiveDate) -> Batch {
        Batch {
            date,
            entries: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.notes.is_empty()
    }

    /// The dated markdown section: version updates in the open, content
    /// diffs folded away.
    pub fn render(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut lines = vec![format!("### {}", self.date.format("%Y-%m-%d"))];

        if !self.entries.is_empty() {
            lines.push(String::new());
            lines.push("#### Version updates".to_string());
            for (org, name, group) in group_rows(&self.entries) {
                let joined = group
                    .iter()
                    .map(|e| {
                        format!(
                            "{}: {} → {}",
                            e.field,
                            if e.old.is_empty() { "(empty)" } else { e.old.as_str() },
                            e.new
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                lines.push(format!("- [{}] {}: {}", org, name, joined));
            }
        }

        if !self.notes.is_empty() {
            lines.push(String::new());
            lines.push("<details>".to_string());
            lines.push("<summary>Content diffs (click to expand)</summary>".to_string());
            lines.push(String::new());
            for n in &self.notes {
                lines.push(format!("- [{}] {}: {}", n.org, n.name, n.note));
            }
            lines.push(String::new());
            lines.push("</details>".to_string());
        }

        Some(lines.join("\n") + "\n")
    }

    /// Insert the rendered section right after the `## Changelog` heading so
    /// the newest batch reads first; prior sections are never touched. A
    /// missing README or heading only warns.
    pub fn append_to_readme(&self, path: &Path) -> Result<(), PersistError> {
        let Some(block) = self.render() else {
            return Ok(());
        };
        let Ok(readme) = std::fs::read_to_string(path) else {
            warn!("README not found at {}, skipping changelog", path.display());
            return Ok(());
        };
        let Some(idx) = readme.find(HEADING) else {
            warn!("no {:?} heading in {}, skipping changelog", HEADING, path.display());
            return Ok(());
        };
        let Some(line_end) = readme[idx..].find('\n').map(|p| idx + p + 1) else {
            warn!("malformed README at {}, skipping changelog", path.display());
            return Ok(());
        };

        let updated = format!(
            "{}\n{}\n{}",
            &readme[..line_end],
            block,
            &readme[line_end..]
        );
        persist::write_atomic(path, &updated)?;
        info!(
            "changelog updated: {} entries, {} content notes",
            self.entries.len(),
            self.notes.len()
        );
        Ok(())
    }
}

/// Entries grouped by row, preserving first-seen order.
fn group_rows(entries: &[ChangeEntry]) -> Vec<(String, String, Vec<&ChangeEntry>)> {
    let mut groups: Vec<(String, String, Vec<&ChangeEntry>)> = Vec::new();
    for e in entries {
        match groups
            .iter_mut()
            .find(|(org, name, _)| org == &e.org && name == &e.name)
        {
            Some((_, _, group)) => group.push(e),
            None => groups.push((e.org.clone(), e.name.clone(), vec![e])),
        }
    }
    groups
}
