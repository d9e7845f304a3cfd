//! Core types shared by both cascade stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::SearchError;

/// Reserved token marking a word boundary in normalized text.
pub const BOUNDARY_TOKEN: &str = "<w/>";

/// 1-based ordinal of a corpus line, offset for explicits so that both
/// corpora share one model-store numbering space.
pub type EntryNumber = u32;

/// N-gram orders making up a mixture, highest first. The first order is the
/// main model; the rest are mixed in.
pub const MIXTURE_ORDERS: [u8; 5] = [5, 4, 3, 2, 1];

/// Which corpus a search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Opening lines of texts.
    Incipit,
    /// Closing lines of texts.
    Explicit,
}

impl SearchMode {
    /// Returns the lowercase name used on the wire and in file names.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Incipit => "incipit",
            Self::Explicit => "explicit",
        }
    }

    /// Returns both modes, incipits first.
    pub fn all() -> &'static [SearchMode] {
        &[Self::Incipit, Self::Explicit]
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SearchMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "incipit" => Ok(Self::Incipit),
            "explicit" => Ok(Self::Explicit),
            other => Err(SearchError::InvalidQuery(format!(
                "unknown search type '{other}'"
            ))),
        }
    }
}

/// A perplexity value as reported by the scorer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Perplexity {
    /// A finite or infinite non-negative perplexity.
    Value(f64),
    /// The text could not be scored against the model (e.g. zero
    /// probability path).
    Undefined,
}

impl Perplexity {
    /// Resolves this perplexity to a sortable score, substituting
    /// `sentinel` for undefined values.
    pub fn or_sentinel(self, sentinel: f64) -> f64 {
        match self {
            Self::Value(v) => v,
            Self::Undefined => sentinel,
        }
    }
}

impl FromStr for Perplexity {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("undefined") {
            return Ok(Self::Undefined);
        }
        let value: f64 = s
            .parse()
            .map_err(|_| SearchError::ScorerUnavailable(format!("unparseable perplexity '{s}'")))?;
        if value.is_nan() {
            return Ok(Self::Undefined);
        }
        if value < 0.0 {
            return Err(SearchError::ScorerUnavailable(format!(
                "negative perplexity '{s}'"
            )));
        }
        Ok(Self::Value(value))
    }
}

/// A corpus entry together with its perplexity score (lower is closer).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    /// Entry number (relative to its corpus in the coarse stage, absolute
    /// after reranking).
    pub entry: EntryNumber,
    /// Perplexity with undefined values already replaced by the sentinel.
    pub score: f64,
    /// Whether `score` is the sentinel standing in for an undefined value.
    pub undefined: bool,
}

impl ScoredCandidate {
    /// Creates a candidate, resolving `perplexity` against `sentinel`.
    pub fn new(entry: EntryNumber, perplexity: Perplexity, sentinel: f64) -> Self {
        Self {
            entry,
            score: perplexity.or_sentinel(sentinel),
            undefined: perplexity == Perplexity::Undefined,
        }
    }
}

/// Orders two candidates by score, placing an undefined score after a
/// defined one of equal value.
pub fn compare_scores(a: &ScoredCandidate, b: &ScoredCandidate) -> std::cmp::Ordering {
    a.score
        .total_cmp(&b.score)
        .then(a.undefined.cmp(&b.undefined))
}

/// Sorts candidates ascending by score. The sort is stable, so otherwise
/// equal candidates keep their incoming order.
pub fn sort_ascending(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(compare_scores);
}

/// Interpolation weights for the five orders of a mixture model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixtureWeights {
    /// Weight of the 5-gram model (the main model).
    pub order5: f64,
    /// Weight of the 4-gram model.
    pub order4: f64,
    /// Weight of the trigram model.
    pub order3: f64,
    /// Weight of the bigram model.
    pub order2: f64,
    /// Weight of the unigram model.
    pub order1: f64,
}

impl Default for MixtureWeights {
    fn default() -> Self {
        Self {
            order5: 0.60,
            order4: 0.45,
            order3: 0.20,
            order2: 0.04,
            order1: 0.01,
        }
    }
}

impl MixtureWeights {
    /// Returns the weight for `order`, or `None` outside 1..=5.
    pub fn for_order(&self, order: u8) -> Option<f64> {
        match order {
            5 => Some(self.order5),
            4 => Some(self.order4),
            3 => Some(self.order3),
            2 => Some(self.order2),
            1 => Some(self.order1),
            _ => None,
        }
    }

    /// Checks that every weight is finite and strictly positive.
    pub fn validate(&self) -> Result<(), SearchError> {
        for order in MIXTURE_ORDERS {
            let weight = self.for_order(order).unwrap_or(0.0);
            if !weight.is_finite() || weight <= 0.0 {
                return Err(SearchError::Config(format!(
                    "mixture weight for order {order} must be a positive number"
                )));
            }
        }
        Ok(())
    }
}

/// The five per-order model files of one text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixtureModelSet {
    /// Model paths indexed by `order - 1`.
    paths: [PathBuf; 5],
}

impl MixtureModelSet {
    /// Model set whose files are `{stem}_{order}.lm`.
    pub fn from_stem(stem: &Path) -> Self {
        Self {
            paths: [1u8, 2, 3, 4, 5].map(|order| {
                let mut path = stem.as_os_str().to_os_string();
                path.push(format!("_{order}.lm"));
                PathBuf::from(path)
            }),
        }
    }

    /// Path of the model of the given order (clamped to 1..=5).
    pub fn path(&self, order: u8) -> &Path {
        let index = usize::from(order.clamp(1, 5)) - 1;
        &self.paths[index]
    }

    /// All model paths, highest order first.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        MIXTURE_ORDERS.into_iter().map(|order| self.path(order))
    }

    /// Returns `true` if all five model files exist.
    pub async fn all_present(&self) -> bool {
        for path in self.paths() {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return false;
            }
        }
        true
    }
}
