//! Startup wiring: load every resource named by a [`ServiceConfig`] once.

use imep_search::{
    CorpusStore, LanguageModelScorer, ModelStore, NoisePhraseSet, QueryNormalizer,
    SearchPipeline,
};

use crate::config::{DataConfig, ServiceConfig};
use crate::error::Result;

/// Load both noise phrase files into a normalizer.
///
/// # Errors
///
/// Returns an error if either file cannot be read.
pub fn load_normalizer(data: &DataConfig) -> Result<QueryNormalizer> {
    let incipit_noise = NoisePhraseSet::load(&data.incipit_noise_path())?;
    let explicit_noise = NoisePhraseSet::load(&data.explicit_noise_path())?;
    tracing::info!(
        incipit_phrases = incipit_noise.len(),
        explicit_phrases = explicit_noise.len(),
        "noise phrases loaded"
    );
    Ok(QueryNormalizer::new(incipit_noise, explicit_noise))
}

/// Load both corpora.
///
/// # Errors
///
/// Returns an error if either corpus is unreadable or has a blank line.
pub fn load_corpora(data: &DataConfig) -> Result<CorpusStore> {
    Ok(CorpusStore::load(&data.incipits_path(), &data.explicits_path())?)
}

/// Assemble a search pipeline around `scorer` from `config`.
///
/// # Errors
///
/// Returns an error if any data file is unusable or the search settings
/// are invalid.
pub fn build_pipeline<S: LanguageModelScorer>(
    config: &ServiceConfig,
    scorer: S,
) -> Result<SearchPipeline<S>> {
    let normalizer = load_normalizer(&config.data)?;
    let corpora = load_corpora(&config.data)?;
    let models = ModelStore::new(config.data.model_dir_path());
    if !models.dir().is_dir() {
        tracing::warn!(
            dir = %models.dir().display(),
            "model store directory missing, every search will return no results"
        );
    }
    Ok(SearchPipeline::new(
        scorer,
        normalizer,
        corpora,
        models,
        config.search.clone(),
    )?)
}
