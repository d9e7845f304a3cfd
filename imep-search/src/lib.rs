//! # imep-search
//!
//! Fuzzy search over the incipits and explicits of Middle English prose
//! manuscripts, ranked by language-model perplexity.
//!
//! Transcriptions of medieval text vary wildly in spelling, so exact or
//! edit-distance matching finds little. Instead every corpus entry is
//! encoded as space-separated characters with explicit word boundaries, and
//! a query is ranked by how well character n-gram models explain it.
//!
//! ## Design
//!
//! - [`QueryNormalizer`] strips formulaic noise phrases and encodes the query
//! - [`CoarseRetriever`] trains a mixture model from the query and scores the
//!   whole corpus against it in one scorer call
//! - [`FineReranker`] scores the query against each candidate's own
//!   precomputed models, concurrently
//! - [`SearchPipeline`] runs both stages with per-request temporary files
//!   that are removed on every exit path
//! - [`LanguageModelScorer`] is the seam to the n-gram engine;
//!   [`SrilmScorer`] runs the SRILM binaries
//!
//! ## Security
//!
//! - Queries are logged only at trace level
//! - Every request writes to paths derived from its own UUID

pub mod coarse;
pub mod config;
pub mod corpus;
pub mod error;
pub mod filter;
pub mod normalize;
pub mod pipeline;
pub mod precompute;
pub mod rerank;
pub mod scorer;
pub mod srilm;
pub mod types;

pub use coarse::CoarseRetriever;
pub use config::SearchConfig;
pub use corpus::{Corpus, CorpusStore, ModelStore};
pub use error::{Result, SearchError};
pub use filter::CandidateFilter;
pub use normalize::{NoisePhraseSet, NormalizedQuery, QueryNormalizer};
pub use pipeline::{PipelineState, SearchOutcome, SearchPipeline};
pub use precompute::{BuildSummary, ModelBuilder};
pub use rerank::FineReranker;
pub use scorer::{LanguageModelScorer, PerplexityReport};
pub use srilm::{SrilmConfig, SrilmScorer};
pub use types::{
    EntryNumber, MixtureModelSet, MixtureWeights, Perplexity, ScoredCandidate, SearchMode,
};
