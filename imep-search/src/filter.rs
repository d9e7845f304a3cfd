//! Minimum-length eligibility filter for corpus entries.
//!
//! Entries shorter than the threshold are fragments or placeholders rather
//! than genuine incipits/explicits. They never become candidates in either
//! stage, and the model store holds no models for them.

use crate::types::BOUNDARY_TOKEN;

/// HTML-style entities used in the corpus for archaic letters.
const ARCHAIC_ENTITIES: [(&str, &str); 5] = [
    ("&thorn;", "þ"),
    ("&eth;", "ð"),
    ("&wynn;", "ƿ"),
    ("&yogh;", "ȝ"),
    ("&aelig;", "æ"),
];

/// Replaces the archaic-letter entities with their literal characters.
pub fn decode_entities(text: &str) -> String {
    ARCHAIC_ENTITIES
        .iter()
        .fold(text.to_owned(), |acc, (entity, letter)| {
            acc.replace(entity, letter)
        })
}

/// Number of characters left once entities are decoded and whitespace and
/// boundary tokens are removed.
pub fn significant_chars(line: &str) -> usize {
    decode_entities(line)
        .replace(BOUNDARY_TOKEN, "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .count()
}

/// Decides which corpus lines can be candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateFilter {
    min_chars: usize,
}

impl CandidateFilter {
    /// Creates a filter rejecting entries with fewer than `min_chars`
    /// significant characters.
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }

    /// Returns `true` if `line` is long enough to be scored.
    pub fn is_eligible(&self, line: &str) -> bool {
        significant_chars(line) >= self.min_chars
    }
}
