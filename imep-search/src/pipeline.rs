//! The two-stage search cascade and its per-request artifacts.
//!
//! ```text
//! Normalizing → CoarseScoring → Reranking → Done
//!      ↓              ↓             ↓
//!    Failed         Failed        Failed
//! ```
//!
//! Each request gets a fresh UUID from which every temporary file path is
//! derived, so concurrent requests never share artifacts. The artifacts are
//! removed when the request's [`ScopedArtifacts`] guard drops, on success
//! and on every failure path.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

use crate::coarse::CoarseRetriever;
use crate::config::SearchConfig;
use crate::corpus::{CorpusStore, ModelStore};
use crate::error::Result;
use crate::filter::CandidateFilter;
use crate::normalize::QueryNormalizer;
use crate::rerank::FineReranker;
use crate::scorer::LanguageModelScorer;
use crate::types::{EntryNumber, MixtureModelSet, ScoredCandidate, SearchMode};

/// Stages of one search request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Converting the raw query into scorer encoding.
    Normalizing,
    /// Training the query models and scoring the whole corpus.
    CoarseScoring,
    /// Scoring the query against each candidate's own models.
    Reranking,
    /// Results are ready.
    Done,
    /// The request was aborted.
    Failed,
}

impl PipelineState {
    /// Returns `true` if the request has finished.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns `true` if a transition from `self` to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Normalizing, Self::CoarseScoring)
                | (Self::CoarseScoring, Self::Reranking)
                | (Self::Reranking, Self::Done)
                | (Self::Normalizing, Self::Failed)
                | (Self::CoarseScoring, Self::Failed)
                | (Self::Reranking, Self::Failed)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Normalizing => "normalizing",
            Self::CoarseScoring => "coarse-scoring",
            Self::Reranking => "reranking",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Tracks the state of one request and logs each transition.
struct StateTracker {
    request_id: Uuid,
    state: PipelineState,
}

impl StateTracker {
    fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            state: PipelineState::Normalizing,
        }
    }

    fn advance(&mut self, target: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(target),
            "invalid pipeline transition {} -> {}",
            self.state,
            target
        );
        tracing::debug!(
            request_id = %self.request_id,
            from = %self.state,
            to = %target,
            "pipeline transition"
        );
        self.state = target;
    }
}

/// Temporary files owned by one request: the normalized query text and the
/// five query models. Files that exist are deleted on drop.
#[derive(Debug)]
pub struct ScopedArtifacts {
    request_id: Uuid,
    query_text: PathBuf,
    query_models: MixtureModelSet,
}

impl ScopedArtifacts {
    /// Derives artifact paths in `scratch_dir` from a fresh request id.
    /// No file is created.
    pub fn new(scratch_dir: &Path) -> Self {
        let request_id = Uuid::new_v4();
        let stem = scratch_dir.join(format!("imep_query_{request_id}"));
        Self {
            request_id,
            query_text: scratch_dir.join(format!("imep_query_{request_id}.txt")),
            query_models: MixtureModelSet::from_stem(&stem),
        }
    }

    /// The request identifier.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Path of the normalized query text.
    pub fn query_text(&self) -> &Path {
        &self.query_text
    }

    /// Paths of the query's mixture models.
    pub fn query_models(&self) -> &MixtureModelSet {
        &self.query_models
    }

    /// Every path this request may create.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.query_text.as_path()).chain(self.query_models.paths())
    }
}

impl Drop for ScopedArtifacts {
    fn drop(&mut self) {
        for path in self.paths() {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    request_id = %self.request_id,
                    path = %path.display(),
                    error = %e,
                    "failed to remove request artifact"
                ),
            }
        }
    }
}

/// Result of one search request.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    /// Identifier of the request that produced this outcome.
    pub request_id: Uuid,
    /// Coarse candidates, corpus-relative, best first.
    pub coarse: Vec<ScoredCandidate>,
    /// Reranked results with absolute entry numbers, best first.
    pub results: Vec<ScoredCandidate>,
}

impl SearchOutcome {
    /// Absolute entry numbers of the results, best first.
    pub fn entry_numbers(&self) -> Vec<EntryNumber> {
        self.results.iter().map(|c| c.entry).collect()
    }

    /// Entry numbers joined by commas, as returned to clients.
    pub fn to_response_text(&self) -> String {
        self.results
            .iter()
            .map(|c| c.entry.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// The cascade: normalization, coarse retrieval, fine reranking.
///
/// Holds only read-only shared state, so one pipeline serves any number
/// of concurrent requests.
pub struct SearchPipeline<S> {
    scorer: S,
    normalizer: QueryNormalizer,
    corpora: CorpusStore,
    models: ModelStore,
    config: SearchConfig,
}

impl<S: LanguageModelScorer> SearchPipeline<S> {
    /// Assembles a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SearchError::Config`] if `config` is invalid.
    pub fn new(
        scorer: S,
        normalizer: QueryNormalizer,
        corpora: CorpusStore,
        models: ModelStore,
        config: SearchConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            scorer,
            normalizer,
            corpora,
            models,
            config,
        })
    }

    /// The scorer used by both stages.
    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    /// The loaded corpora.
    pub fn corpora(&self) -> &CorpusStore {
        &self.corpora
    }

    /// The precomputed model store.
    pub fn models(&self) -> &ModelStore {
        &self.models
    }

    /// The pipeline configuration.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Search the `mode` corpus for entries closest to `raw_query`.
    ///
    /// # Errors
    ///
    /// - [`crate::SearchError::InvalidQuery`] if the query has no words; no
    ///   artifact is written and the scorer is never invoked.
    /// - [`crate::SearchError::ScorerUnavailable`] if any scorer invocation
    ///   fails or times out.
    /// - [`crate::SearchError::Io`] if the query file cannot be written.
    pub async fn search(&self, raw_query: &str, mode: SearchMode) -> Result<SearchOutcome> {
        let start = Instant::now();
        let artifacts = ScopedArtifacts::new(&self.config.scratch_dir);
        let mut tracker = StateTracker::new(artifacts.request_id());
        tracing::trace!(request_id = %artifacts.request_id(), query = raw_query, %mode, "search request");

        let outcome = self.run(&artifacts, &mut tracker, raw_query, mode).await;
        match outcome {
            Ok(ref outcome) => {
                tracker.advance(PipelineState::Done);
                tracing::info!(
                    request_id = %artifacts.request_id(),
                    %mode,
                    candidates = outcome.coarse.len(),
                    results = outcome.results.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "search finished"
                );
            }
            Err(ref err) => {
                tracker.advance(PipelineState::Failed);
                if err.is_user_error() {
                    tracing::debug!(request_id = %artifacts.request_id(), error = %err, "search rejected");
                } else {
                    tracing::warn!(request_id = %artifacts.request_id(), %mode, error = %err, "search failed");
                }
            }
        }
        drop(artifacts);
        outcome
    }

    async fn run(
        &self,
        artifacts: &ScopedArtifacts,
        tracker: &mut StateTracker,
        raw_query: &str,
        mode: SearchMode,
    ) -> Result<SearchOutcome> {
        let query = self.normalizer.normalize(raw_query, mode)?;
        tokio::fs::write(artifacts.query_text(), format!("{query}\n")).await?;

        tracker.advance(PipelineState::CoarseScoring);
        let filter = CandidateFilter::new(self.config.min_entry_chars);
        let coarse = CoarseRetriever::new(
            &self.scorer,
            filter,
            self.config.weights,
            self.config.undefined_sentinel,
        )
        .retrieve_candidates(
            artifacts.query_text(),
            artifacts.query_models(),
            self.corpora.corpus(mode),
            self.config.max_candidates,
        )
        .await?;

        tracker.advance(PipelineState::Reranking);
        let results = FineReranker::new(
            &self.scorer,
            &self.models,
            self.config.weights,
            self.config.undefined_sentinel,
            self.config.rerank_concurrency,
        )
        .rerank(
            artifacts.query_text(),
            &coarse,
            self.corpora.entry_offset(mode),
            self.config.max_selections,
        )
        .await?;

        Ok(SearchOutcome {
            request_id: artifacts.request_id(),
            coarse,
            results,
        })
    }
}
