use std::sync::LazyLock;

use regex::Regex;

use super::{first_capture, ExtractInput};
use crate::fetch::FetchedPage;
use crate::merge::{Candidate, Field, Tier};

static URL_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(\d+)_(\d+)\.html").unwrap());
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d+\.\d+)\b").unwrap());
static STATUS_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Status:\s*(.+)$").unwrap());
static PUBLISHED_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Published:\s*([0-9]{1,2})\s+([A-Za-z]+)\s+([0-9]{4})\s*$").unwrap()
});
static DRAFT_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href=["']([^"']*[/-](draft-?\d{1,2})[/.-][^"']*)["']"#).unwrap()
});

const MONTHS: [(&str, u32); 12] = [
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
];

pub fn extract(input: &ExtractInput) -> Vec<Candidate> {
    let mut out = Vec::new();

    if let Some(page) = input.stable_page {
        if let Some(c) = stable_candidate(page) {
            out.push(c);
        }
        // A draft exists only when the stable page links to a path that
        // itself encodes a draft-XX segment; the next number is never guessed.
        if let Some((link, token)) = draft_link(page) {
            out.push(Candidate::new(Field::DraftLink, link, Tier::Bare));
            out.push(Candidate::new(Field::DraftVersion, token, Tier::Bare));
        }
    }

    out
}

/// Explicit draft-XX link on the stable page, if any.
pub fn discovery_target(stable_page: &FetchedPage) -> Option<String> {
    draft_link(stable_page).map(|(link, _)| link)
}

fn draft_link(page: &FetchedPage) -> Option<(String, String)> {
    let caps = DRAFT_LINK_RE.captures(&page.raw)?;
    let href = caps[1].to_string();
    let token = caps[2].to_lowercase();
    let token = if token.starts_with("draft-") {
        token
    } else {
        token.replacen("draft", "draft-", 1)
    };
    let link = if href.starts_with("http") {
        href
    } else {
        resolve_relative(&page.final_url, &href)
    };
    Some((link, token))
}

fn stable_candidate(page: &FetchedPage) -> Option<Candidate> {
    let text = page.lines.join("\n");

    let from_url = URL_VERSION_RE
        .captures(&page.final_url)
        .map(|c| format!("{}.{}", &c[1], &c[2]));
    let ver = from_url
        .clone()
        .or_else(|| top_of_page_token(&page.lines))?;

    let status = STATUS_LINE_RE
        .captures(&text)
        .map(|c| c[1].trim().to_string());
    let published = PUBLISHED_LINE_RE.captures(&text).and_then(|c| {
        let day: u32 = c[1].parse().ok()?;
        let month = MONTHS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&c[2]))
            .map(|(_, n)| *n)?;
        Some(format!("{}-{:02}-{:02}", &c[3], month, day))
    });

    let value = match (&status, &published) {
        (Some(s), Some(d)) => format!("{} ({}, {})", ver, s, d),
        (Some(s), None) => format!("{} ({})", ver, s),
        (None, Some(d)) => format!("{} ({})", ver, d),
        (None, None) => ver.clone(),
    };
    let tier = if from_url.is_some() {
        Tier::Confirmed
    } else if published.is_some() {
        Tier::Dated
    } else {
        Tier::Bare
    };
    Some(Candidate::new(Field::StableVersion, value, tier))
}

/// Version token from the first few rendered lines (title block of the spec).
fn top_of_page_token(lines: &[String]) -> Option<String> {
    lines
        .iter()
        .take(10)
        .find_map(|l| first_capture(&TOKEN_RE, l))
}

fn resolve_relative(base: &str, href: &str) -> String {
    if let Some(i) = base.rfind('/') {
        format!("{}/{}", &base[..i], href.trim_start_matches("./"))
    } else {
        href.to_string()
    }
}
