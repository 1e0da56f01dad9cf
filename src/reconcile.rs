use std::sync::Arc;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::changelog::{Batch, ChangeEntry, ContentNote};
use crate::config::RunContext;
use crate::extract::{self, ExtractInput};
use crate::fetch::{FetchedPage, PageSource};
use crate::merge::{self, Field, LinkPolicy, Tier};
use crate::persist::PersistError;
use crate::record::{Org, StandardRecord};
use crate::snapshot::{ChangeStatus, Observed, SnapshotStore};

pub struct RunResult {
    pub records: Vec<StandardRecord>,
    pub batch: Batch,
    pub csv_changed: bool,
    pub stats: RunStats,
}

#[derive(Debug, Default)]
pub struct RunStats {
    pub rows: usize,
    pub rows_changed: usize,
    pub field_changes: usize,
    pub content_diffs: usize,
}

struct RowOutcome {
    index: usize,
    record: StandardRecord,
    entries: Vec<ChangeEntry>,
    notes: Vec<ContentNote>,
    core_changed: bool,
}

/// Reconcile every record once. Rows run as independent tasks behind a
/// semaphore for the fetch phase; outcomes are buffered by row index and
/// drained in input order, so the record list and the changelog batch keep
/// the input ordering regardless of fetch completion order.
pub async fn run(
    ctx: Arc<RunContext>,
    source: Arc<dyn PageSource>,
    records: Vec<StandardRecord>,
) -> Result<RunResult, PersistError> {
    let store = Arc::new(SnapshotStore::new(&ctx));
    let semaphore = Arc::new(Semaphore::new(ctx.concurrency));
    let total = records.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let (tx, mut rx) = mpsc::channel::<Result<RowOutcome, PersistError>>(ctx.concurrency * 2);

    for (index, record) in records.into_iter().enumerate() {
        let ctx = Arc::clone(&ctx);
        let store = Arc::clone(&store);
        let source = Arc::clone(&source);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let _permit = sem.acquire().await;
            let outcome = reconcile_row(&ctx, &store, source.as_ref(), index, record).await;
            let _ = tx.send(outcome).await;
        });
    }
    drop(tx);

    let mut slots: Vec<Option<RowOutcome>> = Vec::new();
    slots.resize_with(total, || None);
    while let Some(outcome) = rx.recv().await {
        let outcome = outcome?;
        let index = outcome.index;
        slots[index] = Some(outcome);
        pb.inc(1);
    }
    pb.finish_and_clear();

    let mut batch = Batch::new(Utc::now().date_naive());
    let mut out_records = Vec::with_capacity(total);
    let mut stats = RunStats {
        rows: total,
        ..RunStats::default()
    };
    let mut csv_changed = false;

    for slot in slots {
        let outcome = slot.expect("every row reports exactly once");
        if !outcome.entries.is_empty() || outcome.core_changed {
            stats.rows_changed += 1;
            csv_changed = true;
        }
        stats.field_changes += outcome.entries.len();
        stats.content_diffs += outcome.notes.len();
        batch.entries.extend(outcome.entries);
        batch.notes.extend(outcome.notes);
        out_records.push(outcome.record);
    }

    info!(
        "run complete: {} rows, {} changed, {} field updates, {} content diffs",
        stats.rows, stats.rows_changed, stats.field_changes, stats.content_diffs
    );

    Ok(RunResult {
        records: out_records,
        batch,
        csv_changed,
        stats,
    })
}

/// One row's full pipeline: observe both links through the snapshot store,
/// discover a draft link where policy allows, extract candidates, merge,
/// finalize, and describe what changed. A fetch failure degrades its slot
/// only; just persistence failures propagate.
async fn reconcile_row(
    ctx: &RunContext,
    store: &SnapshotStore,
    source: &dyn PageSource,
    index: usize,
    mut record: StandardRecord,
) -> Result<RowOutcome, PersistError> {
    let before = record.clone();
    debug!("row {} [{}] {}", index, record.org, record.name);

    let stable_obs = observe_link(store, source, &record.stable_link, record.has_stable_link()).await?;
    let draft_obs = observe_link(store, source, &record.draft_link, record.has_draft_link()).await?;

    // ISO scans for a successor document every run (its draft link is the
    // AlwaysAdopt field); everywhere else discovery only fills an absent slot.
    let mut discovered: Option<FetchedPage> = None;
    if !record.has_draft_link() || record.org == Org::Iso {
        if let Some(stable_page) = stable_obs.as_ref().and_then(|o| o.page.as_ref()) {
            if let Some(target) = extract::discovery_target(record.org, &record, stable_page) {
                if target != record.draft_link {
                    match source.fetch(&target).await {
                        Ok(page) => {
                            debug!("discovered draft link for {}: {}", record.name, page.final_url);
                            discovered = Some(page);
                        }
                        Err(e) => warn!("discovered link fetch failed for {}: {}", record.name, e),
                    }
                }
            }
        }
    }

    let stable_page = stable_obs.as_ref().and_then(|o| o.page.as_ref());
    // A freshly discovered successor page outranks the stored link's page.
    let draft_page = discovered
        .as_ref()
        .or_else(|| draft_obs.as_ref().and_then(|o| o.page.as_ref()));
    let input = ExtractInput {
        record: &record,
        stable_page,
        draft_page,
    };
    let mut candidates = extract::extract(record.org, &input);

    // A freshly discovered link whose page yielded no usable version is only
    // recorded for the organizations whose links carry signal on their own.
    if discovered.is_some()
        && !ctx.record_unversioned_draft_link(record.org)
        && !candidates
            .iter()
            .any(|c| c.field == Field::DraftVersion && c.tier > Tier::Absent)
    {
        candidates.retain(|c| c.field != Field::DraftLink);
    }

    for cand in &candidates {
        match cand.field {
            Field::StableVersion => {
                record.stable_version = merge::merge_version(&record.stable_version, cand).value;
            }
            Field::DraftVersion => {
                record.draft_version = merge::merge_version(&record.draft_version, cand).value;
            }
            Field::StableLink => {
                record.stable_link =
                    merge::merge_link(&record.stable_link, cand, LinkPolicy::SeedProtected).value;
            }
            Field::DraftLink => {
                record.draft_link =
                    merge::merge_link(&record.draft_link, cand, draft_link_policy(record.org)).value;
            }
        }
    }

    merge::finalize_row(
        &mut record.stable_version,
        &record.stable_link,
        &mut record.draft_version,
        &record.draft_link,
        record.org == Org::Oidf,
    );

    let entries = field_entries(&before, &record);
    let mut core_changed = false;
    if let Some(core) = core_change(&before, &record) {
        core_changed = record.core_changes != core;
        record.core_changes = core;
    }

    let mut notes = Vec::new();
    push_note(&mut notes, &record, "stable", stable_obs.as_ref());
    push_note(&mut notes, &record, "draft", draft_obs.as_ref());

    Ok(RowOutcome {
        index,
        record,
        entries,
        notes,
        core_changed,
    })
}

async fn observe_link(
    store: &SnapshotStore,
    source: &dyn PageSource,
    link: &str,
    present: bool,
) -> Result<Option<Observed>, PersistError> {
    if !present {
        return Ok(None);
    }
    let fetched = source.fetch(link).await;
    store.observe(link, fetched).map(Some)
}

fn draft_link_policy(org: Org) -> LinkPolicy {
    // The one organization-scoped exception: ISO successor documents replace
    // the stored draft link; everywhere else existing links are seeds.
    if org == Org::Iso {
        LinkPolicy::AlwaysAdopt
    } else {
        LinkPolicy::SeedProtected
    }
}

fn field_entries(before: &StandardRecord, after: &StandardRecord) -> Vec<ChangeEntry> {
    let fields = [
        (Field::StableVersion, &before.stable_version, &after.stable_version),
        (Field::StableLink, &before.stable_link, &after.stable_link),
        (Field::DraftVersion, &before.draft_version, &after.draft_version),
        (Field::DraftLink, &before.draft_link, &after.draft_link),
    ];
    fields
        .into_iter()
        .filter(|(_, b, a)| b != a)
        .map(|(field, b, a)| ChangeEntry {
            org: after.org_tag.clone(),
            name: after.name.clone(),
            field: field.label().to_string(),
            old: b.clone(),
            new: a.clone(),
        })
        .collect()
}

/// Core-changes summary, rewritten only when a version field changed.
fn core_change(before: &StandardRecord, after: &StandardRecord) -> Option<String> {
    let mut parts = Vec::new();
    if before.stable_version != after.stable_version {
        parts.push(format!(
            "stable {} -> {}",
            before.stable_version, after.stable_version
        ));
    }
    if before.draft_version != after.draft_version {
        parts.push(format!(
            "draft {} -> {}",
            before.draft_version, after.draft_version
        ));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

fn push_note(notes: &mut Vec<ContentNote>, record: &StandardRecord, slot: &str, obs: Option<&Observed>) {
    let Some(obs) = obs else { return };
    let Some(diff_file) = &obs.diff_file else { return };
    let kind = match obs.status {
        ChangeStatus::Changed => "changed",
        ChangeStatus::Baseline => "baseline",
        ChangeStatus::Unchanged => return,
    };
    notes.push(ContentNote {
        org: record.org_tag.clone(),
        name: record.name.clone(),
        note: format!("{} {}: {}", kind, slot, diff_file),
    });
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::extract::testutil::{page, record};
    use crate::fetch::FetchError;
    use crate::record::NA;

    /// Map-backed collaborator: URLs not in the map fail like a timeout.
    struct FakeSource {
        pages: Mutex<HashMap<String, FetchedPage>>,
    }

    impl FakeSource {
        fn new(pages: Vec<FetchedPage>) -> Arc<FakeSource> {
            let map = pages
                .into_iter()
                .map(|p| (p.final_url.clone(), p))
                .collect();
            Arc::new(FakeSource {
                pages: Mutex::new(map),
            })
        }

        fn insert(&self, url: &str, p: FetchedPage) {
            self.pages.lock().unwrap().insert(url.to_string(), p);
        }
    }

    #[async_trait]
    impl PageSource for FakeSource {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            self.pages
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Status {
                    url: url.to_string(),
                    status: 504,
                })
        }
    }

    fn ctx(dir: &Path) -> Arc<RunContext> {
        Arc::new(RunContext {
            csv_path: dir.join("standards.csv"),
            readme_path: dir.join("README.md"),
            snapshot_dir: dir.join("snapshots"),
            diff_dir: dir.join("diffs"),
            baseline_diff: false,
            concurrency: 2,
            dry_run: false,
        })
    }

    #[tokio::test]
    async fn ietf_draft_revision_adopted() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://datatracker.ietf.org/doc/draft-ietf-oauth-sd-jwt-vc/";
        let source = FakeSource::new(vec![page(
            url,
            "<p>Latest revision: draft-ietf-oauth-sd-jwt-vc-13</p>",
        )]);
        let rec = record(
            Org::Ietf,
            "SD-JWT VC",
            ["", "", "draft-ietf-oauth-sd-jwt-vc-10", url],
        );

        let result = run(ctx(dir.path()), source, vec![rec]).await.unwrap();
        assert_eq!(
            result.records[0].draft_version,
            "draft-ietf-oauth-sd-jwt-vc-13"
        );
        let version_entries: Vec<_> = result
            .batch
            .entries
            .iter()
            .filter(|e| e.field == "Draft Version")
            .collect();
        assert_eq!(version_entries.len(), 1);
        assert_eq!(version_entries[0].old, "draft-ietf-oauth-sd-jwt-vc-10");
        assert!(result.csv_changed);
    }

    #[tokio::test]
    async fn eu_alias_link_preserved_version_pinned() {
        let dir = tempfile::tempdir().unwrap();
        let alias = "https://example.eu/arf/latest/";
        let pinned = page(
            "https://example.eu/arf/2.7.3/",
            "<h1>ARF</h1><p>Change Log v2.7.3</p>",
        );
        // the fetcher followed the alias redirect: the page registered under
        // the alias reports the pinned final URL
        let source = FakeSource::new(vec![]);
        source.insert(alias, pinned);

        let rec = record(Org::Eu, "EUDI Wallet ARF", ["1.10.0", alias, "", ""]);
        let result = run(ctx(dir.path()), source, vec![rec]).await.unwrap();

        assert_eq!(result.records[0].stable_version, "2.7.3");
        assert_eq!(result.records[0].stable_link, alias);
    }

    #[tokio::test]
    async fn w3c_unversioned_discovered_link_recorded_without_version() {
        let dir = tempfile::tempdir().unwrap();
        let tr = "https://www.w3.org/TR/vc-data-model-2.0/";
        let ed = "https://w3c.github.io/vc-data-model/";
        let source = FakeSource::new(vec![
            page(
                tr,
                r#"<h1>VC Data Model</h1><p>Status of This Document</p>
                   <p>W3C Recommendation</p>
                   <a href="https://w3c.github.io/vc-data-model/">Editor's Draft</a>"#,
            ),
            page(ed, "<html><title>VC Data Model</title><p>no markers here</p></html>"),
        ]);
        let rec = record(Org::W3c, "Verifiable Credentials", ["", tr, "", ""]);

        let result = run(ctx(dir.path()), source, vec![rec]).await.unwrap();
        let row = &result.records[0];
        assert_eq!(row.draft_link, ed);
        assert_eq!(row.draft_version, NA);
        assert!(!result
            .batch
            .entries
            .iter()
            .any(|e| e.field == "Draft Version"));
        assert!(result
            .batch
            .entries
            .iter()
            .any(|e| e.field == "Draft Version Link"));
    }

    #[tokio::test]
    async fn iso_fetch_timeout_keeps_fields_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let stable = "https://www.iso.org/standard/69084.html";
        let draft = "https://www.iso.org/standard/91081.html";
        // draft URL missing from the fake: fetch fails like a timeout
        let source = FakeSource::new(vec![page(
            stable,
            "<p>Publication date : 2021-09</p>",
        )]);
        let rec = record(
            Org::Iso,
            "ISO/IEC 18013-5: Mobile driving licence",
            ["", stable, "ISO/IEC DIS 18013-5 (ISO Draft)", draft],
        );

        let result = run(ctx(dir.path()), source, vec![rec]).await.unwrap();
        let row = &result.records[0];
        assert_eq!(row.draft_version, "ISO/IEC DIS 18013-5 (ISO Draft)");
        assert_eq!(row.draft_link, draft);
        assert!(!result
            .batch
            .entries
            .iter()
            .any(|e| e.field.starts_with("Draft")));
    }

    #[tokio::test]
    async fn iso_successor_link_replaces_stored_draft() {
        let dir = tempfile::tempdir().unwrap();
        let stable = "https://www.iso.org/standard/69084.html";
        let old_draft = "https://www.iso.org/standard/11111.html";
        let new_draft = "https://www.iso.org/standard/22222.html";
        let source = FakeSource::new(vec![
            page(
                stable,
                r#"<p>Publication date : 2021-09</p>
                   <a href="/standard/69084.html">this edition</a>
                   <a href="/standard/22222.html">under development</a>"#,
            ),
            page(old_draft, "<p>Withdrawn</p>"),
            page(
                new_draft,
                "<p>ISO/IEC DIS 18013-5</p><p>40.20 2026-01-15</p>",
            ),
        ]);
        let rec = record(
            Org::Iso,
            "ISO/IEC 18013-5: Mobile driving licence",
            ["", stable, "ISO/IEC DIS 18013-5 (ISO Draft)", old_draft],
        );

        let result = run(ctx(dir.path()), source, vec![rec]).await.unwrap();
        let row = &result.records[0];
        assert_eq!(row.draft_link, new_draft);
        assert_eq!(
            row.draft_version,
            "ISO/IEC DIS 18013-5 (DIS ballot initiated: 2026-01-15)"
        );
        assert!(result
            .batch
            .entries
            .iter()
            .any(|e| e.field == "Draft Version Link" && e.new == new_draft));
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://openid.net/specs/openid-4-verifiable-presentations-1_0.html";
        let source = FakeSource::new(vec![page(
            url,
            "<p>Status: Final</p><p>Published: 29 May 2024</p>",
        )]);
        let rec = record(Org::Oidf, "OpenID4VP", ["", url, "", ""]);

        let first = run(ctx(dir.path()), Arc::clone(&source) as Arc<dyn PageSource>, vec![rec])
            .await
            .unwrap();
        assert_eq!(first.records[0].stable_version, "1.0 (Final, 2024-05-29)");
        assert!(first.csv_changed);

        let second = run(ctx(dir.path()), source, first.records).await.unwrap();
        assert!(second.batch.entries.is_empty());
        assert!(!second.csv_changed);
    }

    #[tokio::test]
    async fn outcomes_drain_in_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let urls: Vec<String> = (0..6)
            .map(|i| format!("https://example.org/spec-{}/", i))
            .collect();
        let source = FakeSource::new(
            urls.iter()
                .map(|u| page(u, "<p>RFC 9000</p>"))
                .collect(),
        );
        let records: Vec<_> = urls
            .iter()
            .enumerate()
            .map(|(i, u)| record(Org::Ietf, &format!("Spec {}", i), ["", u, "", ""]))
            .collect();

        let result = run(ctx(dir.path()), source, records).await.unwrap();
        let names: Vec<_> = result.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Spec 0", "Spec 1", "Spec 2", "Spec 3", "Spec 4", "Spec 5"]);
    }
}
