use std::sync::LazyLock;

use regex::Regex;

use super::{first_capture, ExtractInput};
use crate::merge::{Candidate, Field, Tier};

static SEMVER_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d+\.\d+\.\d+)(?:/|$)").unwrap());
static CHANGELOG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Change\s*Log\s+v(\d+\.\d+\.\d+)").unwrap());
static IN_PLANNING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bin\s+planning\b").unwrap());
static V_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bv?(\d+\.\d+(?:\.\d+)?)\b").unwrap());

pub fn extract(input: &ExtractInput) -> Vec<Candidate> {
    let mut out = Vec::new();

    // Stable: the "latest" alias has already been followed by the fetcher,
    // so the pinned version lives in the final URL; the Change Log marker in
    // the page text is an equally valid source. The alias link itself stays
    // in the record, so no stable-link candidate is ever proposed.
    if let Some(page) = input.stable_page {
        if let Some(ver) = first_capture(&SEMVER_PATH_RE, &page.final_url) {
            out.push(Candidate::new(Field::StableVersion, ver, Tier::Confirmed));
        } else if let Some(ver) = first_capture(&CHANGELOG_RE, &page.lines.join("\n")) {
            out.push(Candidate::new(Field::StableVersion, ver, Tier::Dated));
        }
    }

    // Draft is not tracked unless the page explicitly says so, and even then
    // only at tier 1.
    if let Some(page) = input.draft_page {
        let text = page.lines.join("\n");
        if IN_PLANNING_RE.is_match(&text) {
            if let Some(ver) = first_capture(&V_TOKEN_RE, &text) {
                out.push(Candidate::new(
                    Field::DraftVersion,
                    format!("v{} (in planning)", ver),
                    Tier::Bare,
                ));
            }
        } else if let Some(ver) = first_capture(&SEMVER_PATH_RE, &page.final_url) {
            out.push(Candidate::new(
                Field::DraftVersion,
                format!("v{} (Draft)", ver),
                Tier::Bare,
            ));
        }
    }

    out
}
