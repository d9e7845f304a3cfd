//! Read-only corpus and model-store access.
//!
//! Corpora are loaded once at startup. Entry numbers are 1-based line
//! positions; explicit entries are offset by the incipit count so that both
//! corpora address one model store.

use std::path::{Path, PathBuf};

use crate::error::{Result, SearchError};
use crate::filter::CandidateFilter;
use crate::types::{EntryNumber, MixtureModelSet, SearchMode};

/// One corpus file held in memory, one entry per line.
#[derive(Debug, Clone)]
pub struct Corpus {
    path: PathBuf,
    entries: Vec<String>,
}

impl Corpus {
    /// Builds a corpus from in-memory entries backed by `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if any entry is blank, since a blank
    /// line would shift every following entry number away from the model
    /// store.
    pub fn new(path: PathBuf, entries: Vec<String>) -> Result<Self> {
        if let Some(index) = entries.iter().position(|e| e.trim().is_empty()) {
            return Err(SearchError::Config(format!(
                "blank line {} in corpus {}",
                index + 1,
                path.display()
            )));
        }
        Ok(Self { path, entries })
    }

    /// Reads a corpus file.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the file cannot be read or
    /// contains a blank line.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SearchError::Config(format!("cannot read corpus {}: {e}", path.display()))
        })?;
        let entries = content.lines().map(str::to_owned).collect();
        Self::new(path.to_path_buf(), entries)
    }

    /// Path of the corpus file handed to the scorer.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries in file order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// The entry with 1-based number `entry`.
    pub fn entry(&self, entry: EntryNumber) -> Option<&str> {
        let index = usize::try_from(entry).ok()?.checked_sub(1)?;
        self.entries.get(index).map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the corpus has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry numbers (1-based) of the entries `filter` accepts.
    pub fn eligible_entries<'a>(
        &'a self,
        filter: &'a CandidateFilter,
    ) -> impl Iterator<Item = EntryNumber> + 'a {
        self.entries
            .iter()
            .zip(1..)
            .filter(move |(line, _)| filter.is_eligible(line))
            .map(|(_, entry)| entry)
    }
}

/// The incipit and explicit corpora.
#[derive(Debug, Clone)]
pub struct CorpusStore {
    incipits: Corpus,
    explicits: Corpus,
}

impl CorpusStore {
    /// Creates a store from already loaded corpora.
    pub fn new(incipits: Corpus, explicits: Corpus) -> Self {
        Self {
            incipits,
            explicits,
        }
    }

    /// Loads both corpus files.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if either file is unusable.
    pub fn load(incipits: &Path, explicits: &Path) -> Result<Self> {
        let store = Self::new(Corpus::load(incipits)?, Corpus::load(explicits)?);
        tracing::info!(
            incipits = store.incipits.len(),
            explicits = store.explicits.len(),
            "corpora loaded"
        );
        Ok(store)
    }

    /// The corpus searched in `mode`.
    pub fn corpus(&self, mode: SearchMode) -> &Corpus {
        match mode {
            SearchMode::Incipit => &self.incipits,
            SearchMode::Explicit => &self.explicits,
        }
    }

    /// Offset added to a corpus-relative entry number to get its
    /// model-store number: zero for incipits, the incipit count for
    /// explicits.
    pub fn entry_offset(&self, mode: SearchMode) -> EntryNumber {
        match mode {
            SearchMode::Incipit => 0,
            SearchMode::Explicit => {
                EntryNumber::try_from(self.incipits.len()).unwrap_or(EntryNumber::MAX)
            }
        }
    }
}

/// Directory of precomputed per-entry mixture models, keyed by absolute
/// entry number: `<dir>/<n>_<order>.lm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    /// A model store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory of the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The model set of the entry with absolute number `entry`.
    pub fn models(&self, entry: EntryNumber) -> MixtureModelSet {
        MixtureModelSet::from_stem(&self.dir.join(entry.to_string()))
    }

    /// Returns `true` if all five models of `entry` are present.
    pub async fn has_models(&self, entry: EntryNumber) -> bool {
        self.models(entry).all_present().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(lines: &[&str]) -> Corpus {
        Corpus::new(
            PathBuf::from("/data/incipits.text"),
            lines.iter().map(|s| (*s).to_owned()).collect(),
        )
        .expect("corpus")
    }

    #[test]
    fn entries_are_one_based() {
        let c = corpus(&["first", "second"]);
        assert_eq!(c.entry(1), Some("first"));
        assert_eq!(c.entry(2), Some("second"));
        assert_eq!(c.entry(0), None);
        assert_eq!(c.entry(3), None);
    }

    #[test]
    fn blank_line_is_config_error() {
        let err = Corpus::new(
            PathBuf::from("/data/incipits.text"),
            vec!["a".into(), "  ".into(), "b".into()],
        )
        .unwrap_err();
        assert!(matches!(err, SearchError::Config(_)));
        assert!(err.to_string().contains("blank line 2"));
    }

    #[test]
    fn eligible_entries_keep_file_positions() {
        let c = corpus(&["too short", "A tretis of the makynge", "also short"]);
        let filter = CandidateFilter::new(15);
        let eligible: Vec<EntryNumber> = c.eligible_entries(&filter).collect();
        assert_eq!(eligible, vec![2]);
    }

    #[test]
    fn explicit_offset_is_incipit_count() {
        let store = CorpusStore::new(corpus(&["a", "b", "c"]), corpus(&["x"]));
        assert_eq!(store.entry_offset(SearchMode::Incipit), 0);
        assert_eq!(store.entry_offset(SearchMode::Explicit), 3);
        assert_eq!(store.corpus(SearchMode::Explicit).len(), 1);
    }

    #[test]
    fn load_reads_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("incipits.text");
        std::fs::write(&path, "one line\nanother line\n").expect("write");
        let c = Corpus::load(&path).expect("load");
        assert_eq!(c.len(), 2);
        assert_eq!(c.path(), path.as_path());
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = Corpus::load(Path::new("/nonexistent/incipits.text")).unwrap_err();
        assert!(matches!(err, SearchError::Config(_)));
    }

    #[test]
    fn model_store_paths_use_absolute_number() {
        let store = ModelStore::new("/models/without_short");
        let set = store.models(1203);
        assert_eq!(set.path(3), Path::new("/models/without_short/1203_3.lm"));
    }

    #[tokio::test]
    async fn has_models_requires_every_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ModelStore::new(dir.path());
        assert!(!store.has_models(7).await);
        for order in 1..=5u8 {
            std::fs::write(store.models(7).path(order), "lm").expect("write");
        }
        assert!(store.has_models(7).await);
        assert!(!store.has_models(8).await);
    }
}
