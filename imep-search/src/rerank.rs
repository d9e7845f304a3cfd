//! Fine stage: rescore each coarse candidate against its own mixture model.
//!
//! Every candidate has five precomputed models in the [`ModelStore`],
//! trained from that entry alone. Scoring the query against them is much
//! more accurate than the coarse pass and replaces its ranking entirely.
//! Candidates without a complete model set are skipped.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::Path;
use std::time::Instant;

use crate::corpus::ModelStore;
use crate::error::{Result, SearchError};
use crate::scorer::LanguageModelScorer;
use crate::types::{compare_scores, EntryNumber, MixtureWeights, ScoredCandidate};

/// Rescores coarse candidates against their precomputed models.
pub struct FineReranker<'a, S> {
    scorer: &'a S,
    store: &'a ModelStore,
    weights: MixtureWeights,
    sentinel: f64,
    concurrency: usize,
}

impl<'a, S: LanguageModelScorer> FineReranker<'a, S> {
    /// Creates a reranker reading models from `store`. At most
    /// `concurrency` scorer invocations run at once.
    pub fn new(
        scorer: &'a S,
        store: &'a ModelStore,
        weights: MixtureWeights,
        sentinel: f64,
        concurrency: usize,
    ) -> Self {
        Self {
            scorer,
            store,
            weights,
            sentinel,
            concurrency: concurrency.max(1),
        }
    }

    /// Rescore `candidates` (corpus-relative, best first) and return at most
    /// `max_selections` of them with absolute entry numbers, best first.
    ///
    /// Ties in the fine score keep the coarse order, whatever order the
    /// scorer calls complete in.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::ScorerUnavailable`] if any scorer invocation
    /// fails.
    pub async fn rerank(
        &self,
        query_text: &Path,
        candidates: &[ScoredCandidate],
        entry_offset: EntryNumber,
        max_selections: usize,
    ) -> Result<Vec<ScoredCandidate>> {
        let start = Instant::now();
        let pending: Vec<_> = candidates
            .iter()
            .enumerate()
            .map(|(rank, candidate)| {
                self.score_candidate(query_text, rank, candidate, entry_offset)
            })
            .collect();
        let scored: Vec<Option<(usize, ScoredCandidate)>> = stream::iter(pending)
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;
        let mut rescored: Vec<(usize, ScoredCandidate)> = scored.into_iter().flatten().collect();

        let skipped = candidates.len() - rescored.len();
        rescored
            .sort_by(|(rank_a, a), (rank_b, b)| compare_scores(a, b).then(rank_a.cmp(rank_b)));
        rescored.truncate(max_selections);

        tracing::debug!(
            candidates = candidates.len(),
            skipped,
            selected = rescored.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "fine stage finished"
        );
        Ok(rescored.into_iter().map(|(_, c)| c).collect())
    }

    /// Score one candidate, or return `None` if its models are missing.
    /// The coarse `rank` is carried through for tie-breaking.
    async fn score_candidate(
        &self,
        query_text: &Path,
        rank: usize,
        candidate: &ScoredCandidate,
        entry_offset: EntryNumber,
    ) -> Result<Option<(usize, ScoredCandidate)>> {
        let entry = candidate.entry.checked_add(entry_offset).ok_or_else(|| {
            SearchError::Config(format!(
                "entry {} with offset {entry_offset} overflows",
                candidate.entry
            ))
        })?;
        let models = self.store.models(entry);
        if !models.all_present().await {
            tracing::trace!(entry, "no precomputed models, skipping candidate");
            return Ok(None);
        }
        let report = self.scorer.score(query_text, &models, &self.weights).await?;
        Ok(Some((rank, ScoredCandidate::new(entry, report.overall, self.sentinel))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::PerplexityReport;
    use crate::types::{MixtureModelSet, Perplexity};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Returns a fixed perplexity per absolute entry, read from the model
    /// file stem, and records which entries were scored.
    struct StemScorer {
        scores: HashMap<EntryNumber, Perplexity>,
        scored: Mutex<Vec<EntryNumber>>,
    }

    impl StemScorer {
        fn new(scores: &[(EntryNumber, Perplexity)]) -> Self {
            Self {
                scores: scores.iter().copied().collect(),
                scored: Mutex::new(Vec::new()),
            }
        }
    }

    fn entry_of(models: &MixtureModelSet) -> EntryNumber {
        let name = models
            .path(1)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.trim_end_matches("_1.lm").parse().unwrap_or(0)
    }

    impl LanguageModelScorer for StemScorer {
        async fn train(&self, _text: &Path, _order: u8, _model: &Path) -> Result<()> {
            Ok(())
        }

        async fn score(
            &self,
            _text: &Path,
            models: &MixtureModelSet,
            _weights: &MixtureWeights,
        ) -> Result<PerplexityReport> {
            let entry = entry_of(models);
            self.scored.lock().expect("lock").push(entry);
            let overall = self
                .scores
                .get(&entry)
                .copied()
                .ok_or_else(|| SearchError::ScorerUnavailable(format!("no model {entry}")))?;
            Ok(PerplexityReport {
                lines: vec![overall],
                overall,
            })
        }
    }

    fn write_models(store: &ModelStore, entry: EntryNumber) {
        for order in 1..=5u8 {
            std::fs::write(store.models(entry).path(order), "lm").expect("write model");
        }
    }

    fn coarse(entries: &[EntryNumber]) -> Vec<ScoredCandidate> {
        entries
            .iter()
            .enumerate()
            .map(|(i, e)| ScoredCandidate::new(*e, Perplexity::Value(i as f64), 10_000.0))
            .collect()
    }

    #[tokio::test]
    async fn fine_scores_replace_coarse_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ModelStore::new(dir.path());
        for entry in [1, 2, 3] {
            write_models(&store, entry);
        }
        let scorer = StemScorer::new(&[
            (1, Perplexity::Value(90.0)),
            (2, Perplexity::Value(10.0)),
            (3, Perplexity::Value(50.0)),
        ]);
        let reranker = FineReranker::new(&scorer, &store, MixtureWeights::default(), 10_000.0, 2);
        let ranked = reranker
            .rerank(Path::new("/tmp/q.txt"), &coarse(&[1, 2, 3]), 0, 20)
            .await
            .expect("rerank");
        let order: Vec<EntryNumber> = ranked.iter().map(|c| c.entry).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn candidates_without_models_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ModelStore::new(dir.path());
        write_models(&store, 4);
        let scorer = StemScorer::new(&[(4, Perplexity::Value(3.0))]);
        let reranker = FineReranker::new(&scorer, &store, MixtureWeights::default(), 10_000.0, 1);
        let ranked = reranker
            .rerank(Path::new("/tmp/q.txt"), &coarse(&[5, 4, 6]), 0, 20)
            .await
            .expect("rerank");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].entry, 4);
        assert_eq!(*scorer.scored.lock().expect("lock"), vec![4]);
    }

    #[tokio::test]
    async fn offset_maps_to_absolute_numbers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ModelStore::new(dir.path());
        write_models(&store, 102);
        let scorer = StemScorer::new(&[(102, Perplexity::Value(8.0))]);
        let reranker = FineReranker::new(&scorer, &store, MixtureWeights::default(), 10_000.0, 4);
        let ranked = reranker
            .rerank(Path::new("/tmp/q.txt"), &coarse(&[2]), 100, 20)
            .await
            .expect("rerank");
        assert_eq!(ranked[0].entry, 102);
    }

    #[tokio::test]
    async fn ties_keep_coarse_rank_under_concurrency() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ModelStore::new(dir.path());
        let entries: Vec<EntryNumber> = (1..=8).rev().collect();
        for entry in &entries {
            write_models(&store, *entry);
        }
        let scores: Vec<(EntryNumber, Perplexity)> =
            entries.iter().map(|e| (*e, Perplexity::Value(5.0))).collect();
        let scorer = StemScorer::new(&scores);
        let reranker = FineReranker::new(&scorer, &store, MixtureWeights::default(), 10_000.0, 8);
        let ranked = reranker
            .rerank(Path::new("/tmp/q.txt"), &coarse(&entries), 0, 20)
            .await
            .expect("rerank");
        let order: Vec<EntryNumber> = ranked.iter().map(|c| c.entry).collect();
        assert_eq!(order, entries);
    }

    #[tokio::test]
    async fn undefined_fine_score_ranks_last_and_selection_truncates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ModelStore::new(dir.path());
        for entry in [1, 2, 3] {
            write_models(&store, entry);
        }
        let scorer = StemScorer::new(&[
            (1, Perplexity::Undefined),
            (2, Perplexity::Value(10_000.0)),
            (3, Perplexity::Value(1.0)),
        ]);
        let reranker = FineReranker::new(&scorer, &store, MixtureWeights::default(), 10_000.0, 1);
        let ranked = reranker
            .rerank(Path::new("/tmp/q.txt"), &coarse(&[1, 2, 3]), 0, 20)
            .await
            .expect("rerank");
        let order: Vec<EntryNumber> = ranked.iter().map(|c| c.entry).collect();
        assert_eq!(order, vec![3, 2, 1]);

        let top = reranker
            .rerank(Path::new("/tmp/q.txt"), &coarse(&[1, 2, 3]), 0, 1)
            .await
            .expect("rerank");
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].entry, 3);
    }

    #[tokio::test]
    async fn scorer_failure_aborts_reranking() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ModelStore::new(dir.path());
        write_models(&store, 1);
        let scorer = StemScorer::new(&[]);
        let reranker = FineReranker::new(&scorer, &store, MixtureWeights::default(), 10_000.0, 1);
        let err = reranker
            .rerank(Path::new("/tmp/q.txt"), &coarse(&[1]), 0, 20)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::ScorerUnavailable(_)));
    }
}
