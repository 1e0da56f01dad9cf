pub mod eu;
pub mod hl;
pub mod ietf;
pub mod iso;
pub mod oidf;
pub mod w3c;

use regex::Regex;

use crate::fetch::FetchedPage;
use crate::merge::Candidate;
use crate::record::{Org, StandardRecord};

/// Everything an extractor may look at. Extractors are pure: they never
/// fetch and never mutate the record.
pub struct ExtractInput<'a> {
    pub record: &'a StandardRecord,
    pub stable_page: Option<&'a FetchedPage>,
    /// The page behind the record's draft link, or behind a link discovered
    /// this run when no draft link was on file.
    pub draft_page: Option<&'a FetchedPage>,
}

/// Dispatch on the closed organization set. Adding an organization means
/// adding a module and an arm here.
pub fn extract(org: Org, input: &ExtractInput) -> Vec<Candidate> {
    match org {
        Org::W3c => w3c::extract(input),
        Org::Iso => iso::extract(input),
        Org::Ietf => ietf::extract(input),
        Org::Oidf => oidf::extract(input),
        Org::Eu => eu::extract(input),
        Org::Hl | Org::Other => hl::extract(input),
    }
}

/// When a row has no draft link, the organizations that support discovery
/// can propose one from the stable page. The reconciler fetches it and hands
/// the page back in as `draft_page`.
pub fn discovery_target(org: Org, record: &StandardRecord, stable_page: &FetchedPage) -> Option<String> {
    match org {
        Org::W3c => w3c::discovery_target(stable_page),
        Org::Iso => iso::discovery_target(record, stable_page),
        Org::Oidf => oidf::discovery_target(stable_page),
        Org::Ietf | Org::Eu | Org::Hl | Org::Other => None,
    }
}

pub(crate) fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).map(|c| c[1].to_string())
}
