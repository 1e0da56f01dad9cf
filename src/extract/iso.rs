use std::sync::LazyLock;

use regex::Regex;

use super::{first_capture, ExtractInput};
use crate::fetch::FetchedPage;
use crate::merge::{Candidate, Field, Tier};
use crate::record::StandardRecord;

static PUB_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Publication date\s*:?\s*([0-9]{4}-[0-9]{2}(?:-[0-9]{2})?)").unwrap()
});
static PUBLISHED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bPublished\s*:?\s*([0-9]{4}-[0-9]{2})\b").unwrap());
static STANDARD_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href=["'](?:https?://www\.iso\.org)?(/standard/(\d+)\.html)"#).unwrap()
});
static STANDARD_URL_NUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/standard/(\d+)\.html").unwrap());
static BALLOT_STAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b40\.20\s+(\d{4}-\d{2}-\d{2})\b").unwrap());
static ANY_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b((?:19|20)\d{2}-\d{2}-\d{2})\b").unwrap());
static DIS_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(ISO/IEC\s+DIS\s+[0-9-]+)\b").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

pub fn extract(input: &ExtractInput) -> Vec<Candidate> {
    let mut out = Vec::new();

    if let Some(page) = input.stable_page {
        let text = page.lines.join("\n");
        if let Some(date) =
            first_capture(&PUB_DATE_RE, &text).or_else(|| first_capture(&PUBLISHED_RE, &text))
        {
            out.push(Candidate::new(
                Field::StableVersion,
                format!("ISO Publication: {}", date),
                Tier::Dated,
            ));
        }
    }

    if let Some(page) = input.draft_page {
        // The ISO draft link is the one AlwaysAdopt field: the most recently
        // observed successor document wins, so propose it every run.
        out.push(Candidate::new(
            Field::DraftLink,
            page.final_url.clone(),
            Tier::Dated,
        ));
        out.push(draft_candidate(page, &input.record.name));
    }

    out
}

/// A same-family successor document on the stable page: a `/standard/N.html`
/// link whose numeric suffix differs from the stable link's own.
pub fn discovery_target(record: &StandardRecord, stable_page: &FetchedPage) -> Option<String> {
    let own = first_capture(&STANDARD_URL_NUM_RE, &record.stable_link);
    for cap in STANDARD_LINK_RE.captures_iter(&stable_page.raw) {
        let num = cap[2].to_string();
        if Some(&num) != own.as_ref() {
            return Some(format!("https://www.iso.org{}", &cap[1]));
        }
    }
    None
}

/// A present ISO draft link never leaves the version empty: fall through
/// ballot stage, any dated DIS reference, an undated one, and finally a DIS
/// identifier built from the standard's own number.
fn draft_candidate(page: &FetchedPage, name: &str) -> Candidate {
    let text = page.lines.join("\n");
    let dis_ref = first_capture(&DIS_REF_RE, &text)
        .map(|r| WS_RE.replace_all(r.trim(), " ").to_string());

    if let Some(date) = first_capture(&BALLOT_STAGE_RE, &text) {
        let ref_id = dis_ref.unwrap_or_else(|| fallback_dis(name));
        return Candidate::new(
            Field::DraftVersion,
            format!("{} (DIS ballot initiated: {})", ref_id, date),
            Tier::Dated,
        );
    }

    if let Some(ref_id) = &dis_ref {
        if let Some(date) = first_capture(&ANY_DATE_RE, &text) {
            return Candidate::new(
                Field::DraftVersion,
                format!("{} ({} ISO Draft)", ref_id, date),
                Tier::Dated,
            );
        }
        return Candidate::new(
            Field::DraftVersion,
            format!("{} (ISO Draft)", ref_id),
            Tier::Bare,
        );
    }

    Candidate::new(
        Field::DraftVersion,
        format!("{} (ISO Draft)", fallback_dis(name)),
        Tier::Bare,
    )
}

/// `ISO/IEC DIS <number>` from a record name like
/// `ISO/IEC 18013-5: Mobile driving licence`.
fn fallback_dis(name: &str) -> String {
    let head = name.split(':').next().unwrap_or(name).trim();
    let number = head
        .rsplit(' ')
        .next()
        .filter(|t| t.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .unwrap_or(head);
    format!("ISO/IEC DIS {}", number)
}
