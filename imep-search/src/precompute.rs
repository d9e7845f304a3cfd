//! Offline construction of the per-entry model store.
//!
//! Every eligible corpus entry gets five models trained from its own text,
//! stored under its absolute entry number. Ineligible entries get none,
//! which is what makes the fine stage skip them.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

use crate::corpus::{CorpusStore, ModelStore};
use crate::error::{Result, SearchError};
use crate::filter::CandidateFilter;
use crate::scorer::{train_mixture, LanguageModelScorer};
use crate::types::{EntryNumber, SearchMode};

/// Counts reported by [`ModelBuilder::build`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Entries whose models were trained.
    pub trained: usize,
    /// Entries whose complete model set already existed.
    pub kept: usize,
    /// Entries too short to be candidates.
    pub ineligible: usize,
}

enum EntryOutcome {
    Trained,
    Kept,
}

/// Trains per-entry models into a [`ModelStore`].
pub struct ModelBuilder<'a, S> {
    scorer: &'a S,
    store: &'a ModelStore,
    filter: CandidateFilter,
    scratch_dir: PathBuf,
    concurrency: usize,
}

impl<'a, S: LanguageModelScorer> ModelBuilder<'a, S> {
    /// Creates a builder writing into `store`, with entry scratch files in
    /// `scratch_dir`.
    pub fn new(
        scorer: &'a S,
        store: &'a ModelStore,
        filter: CandidateFilter,
        scratch_dir: impl Into<PathBuf>,
        concurrency: usize,
    ) -> Self {
        Self {
            scorer,
            store,
            filter,
            scratch_dir: scratch_dir.into(),
            concurrency: concurrency.max(1),
        }
    }

    /// Train models for every eligible entry of the `mode` corpus. Complete
    /// model sets are left alone unless `force` is set.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Io`] if the model directory cannot be created
    /// or an entry cannot be written, and propagates the first training
    /// failure.
    pub async fn build(
        &self,
        corpora: &CorpusStore,
        mode: SearchMode,
        force: bool,
    ) -> Result<BuildSummary> {
        let start = Instant::now();
        tokio::fs::create_dir_all(self.store.dir()).await?;

        let corpus = corpora.corpus(mode);
        let offset = corpora.entry_offset(mode);
        let eligible: Vec<EntryNumber> = corpus.eligible_entries(&self.filter).collect();
        let ineligible = corpus.len() - eligible.len();

        let pending: Vec<_> = eligible
            .into_iter()
            .map(|entry| {
                let text = corpus.entry(entry).unwrap_or_default();
                self.build_entry(text, entry, offset, force)
            })
            .collect();
        let outcomes: Vec<EntryOutcome> = stream::iter(pending)
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        let trained = outcomes
            .iter()
            .filter(|o| matches!(o, EntryOutcome::Trained))
            .count();
        let summary = BuildSummary {
            trained,
            kept: outcomes.len() - trained,
            ineligible,
        };
        tracing::info!(
            %mode,
            trained = summary.trained,
            kept = summary.kept,
            ineligible = summary.ineligible,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "model store built"
        );
        Ok(summary)
    }

    async fn build_entry(
        &self,
        text: &str,
        entry: EntryNumber,
        offset: EntryNumber,
        force: bool,
    ) -> Result<EntryOutcome> {
        let absolute = entry.checked_add(offset).ok_or_else(|| {
            SearchError::Config(format!("entry {entry} with offset {offset} overflows"))
        })?;
        if !force && self.store.has_models(absolute).await {
            return Ok(EntryOutcome::Kept);
        }

        let scratch = EntryScratch::new(&self.scratch_dir);
        tokio::fs::write(scratch.path(), format!("{text}\n")).await?;
        train_mixture(self.scorer, scratch.path(), &self.store.models(absolute)).await?;
        tracing::trace!(entry = absolute, "entry models trained");
        Ok(EntryOutcome::Trained)
    }
}

/// Scratch copy of one entry's text, removed on drop.
struct EntryScratch {
    path: PathBuf,
}

impl EntryScratch {
    fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(format!("imep_entry_{}.txt", Uuid::new_v4())),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EntryScratch {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to remove entry scratch file"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;
    use crate::scorer::PerplexityReport;
    use crate::types::{MixtureModelSet, MixtureWeights, Perplexity};

    const LONG: &str = "<w/> a t r e t i s <w/> o f <w/> t h e <w/> m a k y n g e <w/>";
    const SHORT: &str = "<w/> a m e n <w/>";

    /// Writes the training text into the model file.
    struct CopyScorer;

    impl LanguageModelScorer for CopyScorer {
        async fn train(&self, text: &Path, _order: u8, model: &Path) -> Result<()> {
            tokio::fs::copy(text, model).await?;
            Ok(())
        }

        async fn score(
            &self,
            _text: &Path,
            _models: &MixtureModelSet,
            _weights: &MixtureWeights,
        ) -> Result<PerplexityReport> {
            Ok(PerplexityReport {
                lines: Vec::new(),
                overall: Perplexity::Value(1.0),
            })
        }
    }

    fn corpus(lines: &[&str]) -> Corpus {
        Corpus::new(
            PathBuf::from("/data/corpus.text"),
            lines.iter().map(|s| (*s).to_owned()).collect(),
        )
        .expect("corpus")
    }

    #[tokio::test]
    async fn trains_only_eligible_entries_at_absolute_numbers() {
        let models = tempfile::tempdir().expect("tempdir");
        let scratch = tempfile::tempdir().expect("tempdir");
        let store = ModelStore::new(models.path().join("store"));
        let corpora = CorpusStore::new(corpus(&[LONG, LONG]), corpus(&[SHORT, LONG]));
        let builder =
            ModelBuilder::new(&CopyScorer, &store, CandidateFilter::new(15), scratch.path(), 2);

        let summary = builder
            .build(&corpora, SearchMode::Explicit, false)
            .await
            .expect("build");
        assert_eq!(
            summary,
            BuildSummary {
                trained: 1,
                kept: 0,
                ineligible: 1
            }
        );
        assert!(!store.has_models(3).await);
        assert!(store.has_models(4).await);
        let model = std::fs::read_to_string(store.models(4).path(5)).expect("read");
        assert_eq!(model.trim_end(), LONG);
        assert_eq!(std::fs::read_dir(scratch.path()).expect("read_dir").count(), 0);
    }

    #[tokio::test]
    async fn existing_models_kept_unless_forced() {
        let models = tempfile::tempdir().expect("tempdir");
        let scratch = tempfile::tempdir().expect("tempdir");
        let store = ModelStore::new(models.path());
        let corpora = CorpusStore::new(corpus(&[LONG]), corpus(&[LONG]));
        for order in 1..=5u8 {
            std::fs::write(store.models(1).path(order), "old").expect("write");
        }
        let builder =
            ModelBuilder::new(&CopyScorer, &store, CandidateFilter::new(15), scratch.path(), 1);

        let summary = builder
            .build(&corpora, SearchMode::Incipit, false)
            .await
            .expect("build");
        assert_eq!(summary.kept, 1);
        assert_eq!(
            std::fs::read_to_string(store.models(1).path(1)).expect("read"),
            "old"
        );

        let summary = builder
            .build(&corpora, SearchMode::Incipit, true)
            .await
            .expect("build");
        assert_eq!(summary.trained, 1);
        assert_ne!(
            std::fs::read_to_string(store.models(1).path(1)).expect("read"),
            "old"
        );
    }
}
