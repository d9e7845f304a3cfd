//! Query normalization into the character/boundary encoding the scorer
//! is trained on.
//!
//! A raw query such as `"Here begynneth"` becomes
//! `"<w/> H e r e <w/> b e g y n n e t h <w/>"`: characters are separated
//! by single spaces and word boundaries are marked by [`BOUNDARY_TOKEN`].
//! Noise phrases for the search mode are then replaced by a boundary token
//! and any run of adjacent boundary tokens is collapsed into one.

use regex::{Regex, RegexBuilder};
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::{Result, SearchError};
use crate::types::{SearchMode, BOUNDARY_TOKEN};

/// Matches two or more boundary tokens separated only by whitespace.
fn boundary_run() -> &'static Regex {
    static RUN: OnceLock<Regex> = OnceLock::new();
    RUN.get_or_init(|| {
        // The pattern is a compile-time constant; failure is impossible.
        Regex::new(r"<w/>(?:\s*<w/>)+").unwrap_or_else(|_| unreachable!("valid regex"))
    })
}

/// Phrases that carry no distinguishing information for one corpus
/// (formulaic openings such as "here begynneth").
#[derive(Debug, Clone)]
pub struct NoisePhraseSet {
    phrases: Vec<String>,
    patterns: Vec<Regex>,
}

impl NoisePhraseSet {
    /// Builds a set from phrases, ignoring blank entries. Phrases are
    /// matched literally and case-insensitively, in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if a phrase cannot be compiled.
    pub fn new<I, S>(phrases: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut kept = Vec::new();
        let mut patterns = Vec::new();
        for phrase in phrases {
            let phrase = phrase.as_ref().trim_end();
            if phrase.trim().is_empty() {
                continue;
            }
            let pattern = RegexBuilder::new(&regex::escape(phrase))
                .case_insensitive(true)
                .build()
                .map_err(|e| SearchError::Config(format!("bad noise phrase '{phrase}': {e}")))?;
            kept.push(phrase.to_owned());
            patterns.push(pattern);
        }
        Ok(Self {
            phrases: kept,
            patterns,
        })
    }

    /// A set with no phrases.
    pub fn empty() -> Self {
        Self {
            phrases: Vec::new(),
            patterns: Vec::new(),
        }
    }

    /// Loads one phrase per line from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SearchError::Config(format!("cannot read noise file {}: {e}", path.display()))
        })?;
        Self::new(content.lines())
    }

    /// The phrases in matching order.
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Number of phrases in the set.
    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    /// Returns `true` if the set has no phrases.
    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Replaces every occurrence of every phrase by a boundary token.
    /// Each replacement sees the output of the previous one.
    fn strip(&self, text: String) -> String {
        self.patterns.iter().fold(text, |acc, pattern| {
            pattern.replace_all(&acc, BOUNDARY_TOKEN).into_owned()
        })
    }
}

/// A query in scorer encoding. Never contains two adjacent boundary tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery(String);

impl NormalizedQuery {
    /// The encoded text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the query, returning the encoded text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encodes the raw query words without removing any noise.
///
/// Returns `None` if the query contains no words.
pub fn encode_words(raw: &str) -> Option<String> {
    let words: Vec<String> = raw
        .split_whitespace()
        .map(|word| {
            word.chars()
                .map(String::from)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();
    if words.is_empty() {
        return None;
    }
    let separator = format!(" {BOUNDARY_TOKEN} ");
    Some(format!(
        "{BOUNDARY_TOKEN} {} {BOUNDARY_TOKEN}",
        words.join(&separator)
    ))
}

/// Collapses runs of boundary tokens into a single token.
pub fn collapse_boundaries(text: &str) -> String {
    boundary_run().replace_all(text, BOUNDARY_TOKEN).into_owned()
}

/// Converts raw queries into [`NormalizedQuery`] values using the noise
/// phrases of each search mode.
#[derive(Debug, Clone)]
pub struct QueryNormalizer {
    incipit_noise: NoisePhraseSet,
    explicit_noise: NoisePhraseSet,
}

impl QueryNormalizer {
    /// Creates a normalizer from the per-mode noise phrase sets.
    pub fn new(incipit_noise: NoisePhraseSet, explicit_noise: NoisePhraseSet) -> Self {
        Self {
            incipit_noise,
            explicit_noise,
        }
    }

    /// The noise phrases used for `mode`.
    pub fn noise(&self, mode: SearchMode) -> &NoisePhraseSet {
        match mode {
            SearchMode::Incipit => &self.incipit_noise,
            SearchMode::Explicit => &self.explicit_noise,
        }
    }

    /// Normalizes `raw` for searching in `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidQuery`] if `raw` contains no words.
    pub fn normalize(&self, raw: &str, mode: SearchMode) -> Result<NormalizedQuery> {
        let encoded = encode_words(raw)
            .ok_or_else(|| SearchError::InvalidQuery("query contains no words".into()))?;
        let stripped = self.noise(mode).strip(encoded);
        Ok(NormalizedQuery(collapse_boundaries(&stripped)))
    }
}
