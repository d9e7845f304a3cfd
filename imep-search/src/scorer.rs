//! Trait definition for pluggable language-model scorers.
//!
//! The cascade only needs two capabilities: train an n-gram model of a given
//! order from a text file, and compute perplexities of a text file against a
//! weighted mixture of models. [`crate::srilm::SrilmScorer`] provides them by
//! running the SRILM binaries; tests substitute an in-process fake.

use std::future::Future;
use std::path::Path;

use crate::error::SearchError;
use crate::types::{MixtureModelSet, MixtureWeights, Perplexity};

/// Perplexities produced by one scoring call.
#[derive(Debug, Clone, PartialEq)]
pub struct PerplexityReport {
    /// One perplexity per line of the scored text, in line order.
    pub lines: Vec<Perplexity>,
    /// Perplexity of the whole text.
    pub overall: Perplexity,
}

/// A language-model training and perplexity engine.
///
/// Models are trained without implicit sentence boundaries, so the
/// boundary tokens written by the normalizer are the only word markers.
/// All implementations must be `Send + Sync` so that reranking can run
/// several scoring calls at once.
pub trait LanguageModelScorer: Send + Sync {
    /// Train a smoothed n-gram model of `order` from `text` and write it to
    /// `model`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::ScorerUnavailable`] if the engine cannot be
    /// run, fails, or exceeds its time limit.
    fn train(
        &self,
        text: &Path,
        order: u8,
        model: &Path,
    ) -> impl Future<Output = Result<(), SearchError>> + Send;

    /// Score every line of `text` against the mixture of `models`
    /// interpolated with `weights`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::ScorerUnavailable`] if the engine cannot be
    /// run, fails, exceeds its time limit, or its report cannot be parsed.
    fn score(
        &self,
        text: &Path,
        models: &MixtureModelSet,
        weights: &MixtureWeights,
    ) -> impl Future<Output = Result<PerplexityReport, SearchError>> + Send;
}

/// Train all five orders of a mixture from `text` into `models`.
///
/// # Errors
///
/// Propagates the first training failure.
pub async fn train_mixture<S: LanguageModelScorer>(
    scorer: &S,
    text: &Path,
    models: &MixtureModelSet,
) -> Result<(), SearchError> {
    for order in crate::types::MIXTURE_ORDERS {
        scorer.train(text, order, models.path(order)).await?;
    }
    Ok(())
}
