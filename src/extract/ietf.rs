use std::sync::LazyLock;

use regex::Regex;

use super::{first_capture, ExtractInput};
use crate::merge::{Candidate, Field, Tier};

static RFC_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\brfc(\d{3,5})\b").unwrap());
static RFC_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bRFC\s+(\d{3,5})\b").unwrap());
static DRAFT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(draft-[a-z0-9-]+)-(\d{1,2})\b").unwrap());

pub fn extract(input: &ExtractInput) -> Vec<Candidate> {
    let mut out = Vec::new();

    // RFCs are immutable: when the link already names one, the token comes
    // from the URL and is never re-scraped.
    if input.record.has_stable_link() {
        if let Some(num) = first_capture(&RFC_URL_RE, &input.record.stable_link) {
            out.push(Candidate::new(
                Field::StableVersion,
                format!("RFC {}", num),
                Tier::Confirmed,
            ));
        } else if let Some(page) = input.stable_page {
            if let Some(num) = first_capture(&RFC_TEXT_RE, &page.raw) {
                out.push(Candidate::new(
                    Field::StableVersion,
                    format!("RFC {}", num),
                    Tier::Dated,
                ));
            }
        }
    }

    // Conservative draft handling: only an already-tracked draft family is
    // queried for its latest revision; a first draft is never invented.
    if let Some(family) = known_family(input) {
        if let Some(page) = input.draft_page {
            if let Some(latest) = latest_revision(&page.raw, &family) {
                out.push(Candidate::new(Field::DraftVersion, latest, Tier::Dated));
            }
        }
    }

    out
}

fn known_family(input: &ExtractInput) -> Option<String> {
    DRAFT_ID_RE
        .captures(&input.record.draft_version)
        .or_else(|| DRAFT_ID_RE.captures(&input.record.draft_link))
        .map(|c| c[1].to_ascii_lowercase())
}

/// Highest revision of `family` mentioned anywhere on the datatracker page.
fn latest_revision(html: &str, family: &str) -> Option<String> {
    DRAFT_ID_RE
        .captures_iter(html)
        .filter(|c| c[1].eq_ignore_ascii_case(family))
        .filter_map(|c| c[2].parse::<u32>().ok())
        .max()
        .map(|rev| format!("{}-{:02}", family, rev))
}
