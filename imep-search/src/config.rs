//! Search configuration with sensible defaults.
//!
//! [`SearchConfig`] carries every tuning parameter of the cascade: how many
//! coarse candidates survive into reranking, how many results are returned,
//! the eligibility threshold, the undefined-score sentinel, and the mixture
//! weights. The defaults match the deployed incipit/explicit service.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::SearchError;
use crate::types::MixtureWeights;

/// Configuration for one search pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of coarse candidates passed to the reranker.
    pub max_candidates: usize,
    /// Number of entries returned after reranking.
    pub max_selections: usize,
    /// Minimum decoded character count for a corpus entry to be a candidate.
    pub min_entry_chars: usize,
    /// Score substituted for undefined perplexities so they sort last.
    pub undefined_sentinel: f64,
    /// Interpolation weights for the five-order mixture.
    pub weights: MixtureWeights,
    /// Maximum number of reranking scorer invocations in flight at once.
    /// Set to 1 to rerank sequentially.
    pub rerank_concurrency: usize,
    /// Maximum number of entries trained at once when building the model
    /// store. Each entry runs five `ngram-count` invocations in sequence.
    pub build_concurrency: usize,
    /// Directory holding per-request temporary artifacts.
    pub scratch_dir: PathBuf,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_candidates: 200,
            max_selections: 20,
            min_entry_chars: 15,
            undefined_sentinel: 10_000.0,
            weights: MixtureWeights::default(),
            rerank_concurrency: 4,
            build_concurrency: 4,
            scratch_dir: std::env::temp_dir(),
        }
    }
}

impl SearchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `max_candidates`, `max_selections` and both concurrency limits must be greater than 0
    /// - `undefined_sentinel` must be finite and non-negative
    /// - every mixture weight must be positive
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.max_candidates == 0 {
            return Err(SearchError::Config(
                "max_candidates must be greater than 0".into(),
            ));
        }
        if self.max_selections == 0 {
            return Err(SearchError::Config(
                "max_selections must be greater than 0".into(),
            ));
        }
        if self.rerank_concurrency == 0 {
            return Err(SearchError::Config(
                "rerank_concurrency must be greater than 0".into(),
            ));
        }
        if self.build_concurrency == 0 {
            return Err(SearchError::Config(
                "build_concurrency must be greater than 0".into(),
            ));
        }
        if !self.undefined_sentinel.is_finite() || self.undefined_sentinel < 0.0 {
            return Err(SearchError::Config(
                "undefined_sentinel must be a finite, non-negative number".into(),
            ));
        }
        self.weights.validate()
    }
}
