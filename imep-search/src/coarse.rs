//! Coarse stage: the whole corpus against one model built from the query.
//!
//! The scorer can run many texts against one model in a single invocation,
//! but not one text against many models. So this stage trains a mixture
//! from the query, scores the entire corpus file against it in one call,
//! and keeps the lowest-perplexity entries as candidates for reranking.

use std::path::Path;
use std::time::Instant;

use crate::corpus::Corpus;
use crate::error::{Result, SearchError};
use crate::filter::CandidateFilter;
use crate::scorer::{train_mixture, LanguageModelScorer};
use crate::types::{
    sort_ascending, EntryNumber, MixtureModelSet, MixtureWeights, Perplexity, ScoredCandidate,
};

/// Ranks corpus entries against a model trained from the query.
pub struct CoarseRetriever<'a, S> {
    scorer: &'a S,
    filter: CandidateFilter,
    weights: MixtureWeights,
    sentinel: f64,
}

impl<'a, S: LanguageModelScorer> CoarseRetriever<'a, S> {
    /// Creates a retriever using `scorer`.
    pub fn new(
        scorer: &'a S,
        filter: CandidateFilter,
        weights: MixtureWeights,
        sentinel: f64,
    ) -> Self {
        Self {
            scorer,
            filter,
            weights,
            sentinel,
        }
    }

    /// Train `query_models` from the normalized query at `query_text`, score
    /// `corpus` against them and return at most `max_candidates` eligible
    /// entries, best first. Entry numbers are corpus-relative.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::ScorerUnavailable`] if training or scoring
    /// fails, or if the report does not have one perplexity per entry.
    pub async fn retrieve_candidates(
        &self,
        query_text: &Path,
        query_models: &MixtureModelSet,
        corpus: &Corpus,
        max_candidates: usize,
    ) -> Result<Vec<ScoredCandidate>> {
        let start = Instant::now();
        train_mixture(self.scorer, query_text, query_models).await?;
        let report = self
            .scorer
            .score(corpus.path(), query_models, &self.weights)
            .await?;

        let candidates = rank_report(
            &report.lines,
            corpus.entries(),
            &self.filter,
            self.sentinel,
            max_candidates,
        )?;
        tracing::debug!(
            scored = report.lines.len(),
            candidates = candidates.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "coarse stage finished"
        );
        Ok(candidates)
    }
}

/// Pair each corpus entry with its perplexity, drop ineligible entries,
/// sort ascending and keep the first `max_candidates`.
///
/// # Errors
///
/// Returns [`SearchError::ScorerUnavailable`] if `perplexities` and
/// `entries` differ in length.
pub fn rank_report(
    perplexities: &[Perplexity],
    entries: &[String],
    filter: &CandidateFilter,
    sentinel: f64,
    max_candidates: usize,
) -> Result<Vec<ScoredCandidate>> {
    if perplexities.len() != entries.len() {
        return Err(SearchError::ScorerUnavailable(format!(
            "scorer reported {} perplexities for {} corpus entries",
            perplexities.len(),
            entries.len()
        )));
    }

    let mut candidates: Vec<ScoredCandidate> = perplexities
        .iter()
        .zip(entries)
        .zip(1..)
        .filter(|((_, line), _)| filter.is_eligible(line))
        .map(|((perplexity, _), entry): ((&Perplexity, &String), EntryNumber)| {
            ScoredCandidate::new(entry, *perplexity, sentinel)
        })
        .collect();

    sort_ascending(&mut candidates);
    candidates.truncate(max_candidates);
    Ok(candidates)
}
