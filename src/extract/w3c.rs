use std::sync::LazyLock;

use regex::Regex;

use super::{first_capture, ExtractInput};
use crate::fetch::FetchedPage;
use crate::merge::{Candidate, Field, Tier};

static TR_URL_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/[a-z0-9-]+-([0-9]+\.[0-9]+(?:\.[0-9]+)?)/?$").unwrap());
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static H1_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").unwrap());
static V_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bv([0-9]+\.[0-9]+(?:\.[0-9]+)?)\b").unwrap());
static BARE_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([0-9]{1,2}\.[0-9]{1,2}(?:\.[0-9]{1,2})?)\b").unwrap());
static SOTD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)status\s+of\s+this\s+document").unwrap());
// No trailing \b: the date often sits inside an ISO 8601 datetime
// ("2024-03-07T10:00:00Z") where no word boundary follows the day.
static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})").unwrap());
static ED_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a[^>]+href=["']([^"']+)["'][^>]*>[^<]*Editor'?s[^<]*Draft"#).unwrap()
});
static META_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<meta[^>]+(?:name|property)=["'](?:dcterms\.(?:modified|issued)|dc\.(?:date|modified)|last-modified)["'][^>]+content=["']([^"']*\d{4}-\d{2}-\d{2}[^"']*)["']"#).unwrap()
});
static TIME_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<time[^>]+datetime=["']([^"']*\d{4}-\d{2}-\d{2}[^"']*)["']"#).unwrap()
});
static UPDATED_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(This version|Last updated|Updated|Modified)\b").unwrap());

/// Maturity labels in descending specificity; the first one present in the
/// "Status of this document" window wins.
const STATUS_MAP: [(&str, &str); 7] = [
    ("W3C Proposed Recommendation", "Proposed Recommendation"),
    ("W3C Candidate Recommendation Draft", "Candidate Recommendation Draft"),
    ("W3C Candidate Recommendation", "Candidate Recommendation"),
    ("W3C First Public Working Draft", "First Public Working Draft"),
    ("W3C Working Draft", "Working Draft"),
    ("W3C Recommendation", "Recommendation"),
    ("W3C Note", "Note"),
];

pub fn extract(input: &ExtractInput) -> Vec<Candidate> {
    let mut out = Vec::new();

    if let Some(page) = input.stable_page {
        if let Some(c) = stable_candidate(page) {
            out.push(c);
        }
    }

    if let Some(page) = input.draft_page {
        if !input.record.has_draft_link() {
            out.push(Candidate::new(
                Field::DraftLink,
                page.final_url.clone(),
                Tier::Dated,
            ));
        }
        if let Some(c) = draft_candidate(page) {
            out.push(c);
        }
    }

    out
}

/// Target of an "Editor's Draft" reference on the stable page, used when the
/// record has no draft link on file.
pub fn discovery_target(stable_page: &FetchedPage) -> Option<String> {
    first_capture(&ED_LINK_RE, &stable_page.raw)
}

fn stable_candidate(page: &FetchedPage) -> Option<Candidate> {
    let title = first_capture(&TITLE_RE, &page.raw).unwrap_or_default();
    let h1 = first_capture(&H1_RE, &page.raw).unwrap_or_default();

    let from_url = first_capture(&TR_URL_VERSION_RE, &page.final_url);
    let ver = from_url.clone().or_else(|| {
        first_capture(&V_TOKEN_RE, &h1)
            .or_else(|| first_capture(&V_TOKEN_RE, &title))
            .or_else(|| first_capture(&BARE_TOKEN_RE, &h1))
            .or_else(|| first_capture(&BARE_TOKEN_RE, &title))
    })?;

    let window = sotd_window(&page.lines);
    let status = STATUS_MAP
        .iter()
        .find(|(label, _)| window.to_lowercase().contains(&label.to_lowercase()))
        .map(|(_, short)| *short);

    let value = match status {
        Some(status) => format!("v{} ({})", ver, status),
        None => format!("v{} (W3C TR)", ver),
    };
    let tier = if from_url.is_some() {
        Tier::Confirmed
    } else if ISO_DATE_RE.is_match(&window) {
        Tier::Dated
    } else {
        Tier::Bare
    };
    Some(Candidate::new(Field::StableVersion, value, tier))
}

/// Version and/or date from an Editor's Draft page. A page with neither
/// yields no version candidate at all; whether the link alone is recorded
/// is the reconciler's policy, not ours.
fn draft_candidate(page: &FetchedPage) -> Option<Candidate> {
    let title = first_capture(&TITLE_RE, &page.raw).unwrap_or_default();
    let h1 = first_capture(&H1_RE, &page.raw).unwrap_or_default();

    let ver = first_capture(&V_TOKEN_RE, &h1)
        .or_else(|| first_capture(&V_TOKEN_RE, &title))
        .or_else(|| first_capture(&BARE_TOKEN_RE, &h1))
        .or_else(|| first_capture(&BARE_TOKEN_RE, &title));

    let date = draft_date(page);

    let value = match (&ver, &date) {
        (Some(v), Some(d)) => format!("v{} ({} Editor's Draft)", v, d),
        (None, Some(d)) => format!("{} (Editor's Draft)", d),
        (Some(v), None) => format!("v{} (Editor's Draft)", v),
        (None, None) => return None,
    };
    let tier = if date.is_some() { Tier::Dated } else { Tier::Bare };
    Some(Candidate::new(Field::DraftVersion, value, tier))
}

fn draft_date(page: &FetchedPage) -> Option<String> {
    if let Some(content) = first_capture(&META_DATE_RE, &page.raw) {
        if let Some(d) = first_capture(&ISO_DATE_RE, &content) {
            return Some(d);
        }
    }
    if let Some(content) = first_capture(&TIME_DATE_RE, &page.raw) {
        if let Some(d) = first_capture(&ISO_DATE_RE, &content) {
            return Some(d);
        }
    }
    for line in &page.lines {
        if UPDATED_LINE_RE.is_match(line) {
            if let Some(d) = first_capture(&ISO_DATE_RE, line) {
                return Some(d);
            }
        }
    }
    page.last_modified.map(|d| d.format("%Y-%m-%d").to_string())
}

/// Lines from "Status of this document" onward, capped at 250, where the
/// maturity status and revision date live. Falls back to the whole page.
fn sotd_window(lines: &[String]) -> String {
    for (i, line) in lines.iter().enumerate() {
        if SOTD_RE.is_match(line) {
            let end = (i + 250).min(lines.len());
            return lines[i..end].join("\n");
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::testutil::page;

    #[test]
    fn draft_page_without_marker_yields_nothing() {
        let p = page(
            "https://w3c.github.io/example/",
            "<html><title>Example Spec</title><body><p>hello</p></body></html>",
        );
        assert!(draft_candidate(&p).is_none());
    }

    #[test]
    fn draft_date_from_meta() {
        let p = page(
            "https://w3c.github.io/example/",
            r#"<meta name="dcterms.modified" content="2024-03-07T10:00:00Z"><h1>Example v1.1</h1>"#,
        );
        let c = draft_candidate(&p).unwrap();
        assert_eq!(c.value, "v1.1 (2024-03-07 Editor's Draft)");
        assert_eq!(c.tier, Tier::Dated);
    }

    #[test]
    fn draft_date_from_time_element_datetime() {
        let p = page(
            "https://w3c.github.io/example/",
            r#"<h1>Example v1.1</h1><time datetime="2024-03-07T10:00:00Z">7 March 2024</time>"#,
        );
        let c = draft_candidate(&p).unwrap();
        assert_eq!(c.value, "v1.1 (2024-03-07 Editor's Draft)");
        assert_eq!(c.tier, Tier::Dated);
    }

    #[test]
    fn draft_date_from_updated_line() {
        let p = page(
            "https://w3c.github.io/example/",
            "<p>Last updated 2024-06-01</p>",
        );
        let c = draft_candidate(&p).unwrap();
        assert_eq!(c.value, "2024-06-01 (Editor's Draft)");
    }

    #[test]
    fn stable_version_from_pinned_url_is_confirmed() {
        let p = page(
            "https://www.w3.org/TR/did-core-1.0/",
            "<h1>DID Core</h1><p>Status of This Document</p><p>W3C Recommendation 2022-07-19</p>",
        );
        let c = stable_candidate(&p).unwrap();
        assert_eq!(c.value, "v1.0 (Recommendation)");
        assert_eq!(c.tier, Tier::Confirmed);
    }

    #[test]
    fn stable_version_from_title_without_date_is_bare() {
        let p = page(
            "https://www.w3.org/TR/did-core/",
            "<title>DID Core v1.0</title><body><p>no status section</p></body>",
        );
        let c = stable_candidate(&p).unwrap();
        assert_eq!(c.value, "v1.0 (W3C TR)");
        assert_eq!(c.tier, Tier::Bare);
    }
}
