use super::ExtractInput;
use crate::merge::{Candidate, Field, Tier};

/// HL and untagged organizations get no draft discovery and no version
/// re-derivation. The sole candidate restates the stable link in its
/// redirect-resolved form; the page is only fetched when that link is on
/// file and seed protection keeps the stored value, so the merge leaves
/// the row untouched. Untagged rows still flow through the same candidate
/// path as every other organization.
pub fn extract(input: &ExtractInput) -> Vec<Candidate> {
    let Some(page) = input.stable_page else {
        return Vec::new();
    };
    vec![Candidate::new(
        Field::StableLink,
        page.final_url.clone(),
        Tier::Confirmed,
    )]
}
