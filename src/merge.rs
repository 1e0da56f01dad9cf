use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::record::{is_na, norm_na, NA};

static VERSION_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bv?\d+\.\d+(\.\d+)?\b").unwrap());
static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}-\d{2}(-\d{2})?\b").unwrap());
static DRAFT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bdraft-[a-z0-9-]+-\d{1,2}\b").unwrap());
static BARE_DRAFT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bdraft-?\d{1,2}\b").unwrap());
static RFC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bRFC\s*\d{3,5}\b").unwrap());
static DIS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bISO/IEC\s+DIS\b").unwrap());

/// Confidence of a candidate value, a total order. The merge invariant is a
/// comparison on this enum rather than scattered string checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    /// Absent, `N/A`, or no recognizable identifier.
    Absent = 0,
    /// Bare version token with no date and no sub-identifier.
    Bare = 1,
    /// Version token plus date, or an explicit sub-identifier (draft-NN
    /// revision, RFC number, DIS marker, ISO-style date as revision marker).
    Dated = 2,
    /// Dated-grade content confirmed by a URL pointing at that exact document.
    Confirmed = 3,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

impl Tier {
    /// Classify a value textually. `confirmed_link` is asserted only by an
    /// extractor that derived the value from a version-pinned URL; a stored
    /// value classifies at most `Dated`.
    pub fn of(value: &str, confirmed_link: bool) -> Tier {
        let v = norm_na(value);
        if is_na(&v) || !has_identifier(&v) {
            return Tier::Absent;
        }
        let dated = ISO_DATE_RE.is_match(&v)
            || DRAFT_ID_RE.is_match(&v)
            || RFC_RE.is_match(&v)
            || DIS_RE.is_match(&v);
        match (dated, confirmed_link) {
            (true, true) => Tier::Confirmed,
            (true, false) => Tier::Dated,
            (false, true) => Tier::Confirmed,
            (false, false) => Tier::Bare,
        }
    }
}

/// Does the string carry any identifier worth calling a version: a version
/// token, an ISO date, a draft id, an RFC number, or a DIS marker?
pub fn has_identifier(s: &str) -> bool {
    if is_na(s) {
        return false;
    }
    VERSION_TOKEN_RE.is_match(s)
        || ISO_DATE_RE.is_match(s)
        || DRAFT_ID_RE.is_match(s)
        || RFC_RE.is_match(s)
        || DIS_RE.is_match(s)
}

/// OIDF-only relaxation: a bare `draft-XX` token counts as an identifier
/// even without a date.
pub fn has_identifier_oidf(s: &str) -> bool {
    has_identifier(s) || BARE_DRAFT_RE.is_match(s)
}

/// Which record field a candidate targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    StableVersion,
    StableLink,
    DraftVersion,
    DraftLink,
}

impl Field {
    pub fn label(self) -> &'static str {
        match self {
            Field::StableVersion => "Stable Version",
            Field::StableLink => "Stable Version Link",
            Field::DraftVersion => "Draft Version",
            Field::DraftLink => "Draft Version Link",
        }
    }
}

/// A proposed value for exactly one field, produced by an extractor and
/// consumed within the same row's reconciliation.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub field: Field,
    pub value: String,
    pub tier: Tier,
}

impl Candidate {
    pub fn new(field: Field, value: impl Into<String>, tier: Tier) -> Candidate {
        Candidate {
            field,
            value: norm_na(&value.into()),
            tier,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Merged {
    pub value: String,
    pub adopted: bool,
}

/// Non-regression merge for version fields. Adopt when the candidate outranks
/// the current tier, or when tiers are equal and the text differs (a corrected
/// date or bumped revision). A tier-0 candidate never overwrites a known
/// value, and a known value is never replaced by the sentinel.
pub fn merge_version(current: &str, candidate: &Candidate) -> Merged {
    let cur = norm_na(current);
    let cand = &candidate.value;

    if is_na(cand) || candidate.tier == Tier::Absent {
        return keep(cur);
    }
    if is_na(&cur) {
        return adopt(cand);
    }

    let cur_tier = Tier::of(&cur, false);
    if candidate.tier > cur_tier {
        return adopt(cand);
    }
    if candidate.tier == cur_tier && cand != &cur {
        return adopt(cand);
    }
    if candidate.tier < cur_tier {
        debug!(
            "rejected regression: {:?} tier {} does not beat {:?} tier {}",
            cand, candidate.tier, cur, cur_tier
        );
    }
    keep(cur)
}

/// Link sub-policy: which organization/field pairs may replace a stored link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPolicy {
    /// Default: an existing non-absent link is kept; a candidate only fills
    /// an absent slot.
    SeedProtected,
    /// ISO draft link only: the most recently discovered successor link
    /// always replaces the stored one.
    AlwaysAdopt,
}

pub fn merge_link(current: &str, candidate: &Candidate, policy: LinkPolicy) -> Merged {
    let cur = norm_na(current);
    let cand = &candidate.value;

    if is_na(cand) {
        return keep(cur);
    }
    if is_na(&cur) {
        return adopt(cand);
    }
    match policy {
        LinkPolicy::AlwaysAdopt if cand != &cur => adopt(cand),
        LinkPolicy::AlwaysAdopt => keep(cur),
        LinkPolicy::SeedProtected => {
            if cand != &cur {
                debug!("seed-protected link kept: {:?} over discovered {:?}", cur, cand);
            }
            keep(cur)
        }
    }
}

fn adopt(value: &str) -> Merged {
    Merged {
        value: value.to_string(),
        adopted: true,
    }
}

fn keep(value: String) -> Merged {
    Merged {
        value,
        adopted: false,
    }
}

/// Post-merge finalizer for one row's four fields. A version with no link is
/// meaningless, and a draft version that carries no identifier must not
/// pretend to be a value.
pub fn finalize_row(
    stable_version: &mut String,
    stable_link: &str,
    draft_version: &mut String,
    draft_link: &str,
    oidf: bool,
) {
    if is_na(stable_link) {
        *stable_version = NA.to_string();
    }
    if is_na(draft_link) {
        *draft_version = NA.to_string();
        return;
    }
    let valid = if oidf {
        has_identifier_oidf(draft_version)
    } else {
        has_identifier(draft_version)
    };
    if !valid {
        *draft_version = NA.to_string();
    }
}
