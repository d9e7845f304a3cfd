//! HTTP tests of the search server against an in-process scorer.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use imep::config::{DataConfig, ServerConfig, ServiceConfig};
use imep::server::MISSING_QUERY;
use imep::{SearchServer, service};
use imep_search::{
    LanguageModelScorer, MixtureModelSet, MixtureWeights, ModelStore, Perplexity,
    PerplexityReport, SearchError,
};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;

/// Scores each line by its length; the whole text always scores 1.
#[derive(Default)]
struct LengthScorer {
    fail: AtomicBool,
}

impl LanguageModelScorer for LengthScorer {
    async fn train(&self, text: &Path, _order: u8, model: &Path) -> imep_search::Result<()> {
        tokio::fs::copy(text, model).await?;
        Ok(())
    }

    async fn score(
        &self,
        text: &Path,
        _models: &MixtureModelSet,
        _weights: &MixtureWeights,
    ) -> imep_search::Result<PerplexityReport> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SearchError::ScorerUnavailable("ngram timed out after 30s".into()));
        }
        let text = tokio::fs::read_to_string(text).await?;
        let lines = text
            .lines()
            .map(|l| Perplexity::Value(l.len() as f64))
            .collect();
        Ok(PerplexityReport {
            lines,
            overall: Perplexity::Value(1.0),
        })
    }
}

const INCIPITS: &str = "\
<w/> s h o r t l i n e s <w/>
<w/> A <w/> t r e t i s <w/> o f <w/> t h e <w/> m a k y n g e <w/>
<w/> h e r e <w/> b e g y n n e t h <w/> t h e <w/> b o k e <w/> o f <w/> l o v e <w/>
";
const EXPLICITS: &str = "\
<w/> h e r e <w/> e n d i t h <w/> t h e <w/> t r e t i s <w/>
";

struct Harness {
    _data: TempDir,
    _scratch: TempDir,
    server: SearchServer,
    pipeline: Arc<imep_search::SearchPipeline<LengthScorer>>,
}

async fn start(with_models: &[u32]) -> Harness {
    let data = tempfile::tempdir().expect("tempdir");
    let scratch = tempfile::tempdir().expect("tempdir");
    std::fs::write(data.path().join("incipits.text"), INCIPITS).expect("write");
    std::fs::write(data.path().join("explicits.text"), EXPLICITS).expect("write");
    std::fs::write(data.path().join("nonevents_incipits.text"), "").expect("write");
    std::fs::write(data.path().join("nonevents_explicits.text"), "").expect("write");
    std::fs::create_dir_all(data.path().join("models")).expect("models");

    let mut config = ServiceConfig {
        data: DataConfig {
            dir: data.path().to_path_buf(),
            ..DataConfig::default()
        },
        server: ServerConfig {
            host: "127.0.0.1".to_owned(),
            port: 0,
        },
        ..ServiceConfig::default()
    };
    config.search.scratch_dir = scratch.path().to_path_buf();

    let store = ModelStore::new(config.data.model_dir_path());
    for entry in with_models {
        for order in 1..=5u8 {
            std::fs::write(store.models(*entry).path(order), "lm").expect("write model");
        }
    }

    let pipeline = Arc::new(
        service::build_pipeline(&config, LengthScorer::default()).expect("pipeline"),
    );
    let server = SearchServer::start(Arc::clone(&pipeline), &config.server)
        .await
        .expect("server");
    Harness {
        _data: data,
        _scratch: scratch,
        server,
        pipeline,
    }
}

async fn get(harness: &Harness, query: &str) -> (u16, String) {
    let url = format!("http://127.0.0.1:{}{query}", harness.server.port());
    let response = reqwest::get(&url).await.expect("request");
    let status = response.status().as_u16();
    let body = response.text().await.expect("body");
    (status, body)
}

#[tokio::test]
async fn search_returns_comma_joined_entries() {
    let harness = start(&[2, 3]).await;
    let (status, body) = get(&harness, "/search?query=the+tretis&type=incipit").await;
    assert_eq!(status, 200);
    // Fine scores tie, so the coarse order (shorter line first) decides.
    assert_eq!(body, "2,3");
}

#[tokio::test]
async fn explicit_search_returns_offset_numbers() {
    let harness = start(&[4]).await;
    let (status, body) = get(&harness, "/search?query=endith&type=explicit").await;
    assert_eq!(status, 200);
    assert_eq!(body, "4");
}

#[tokio::test]
async fn no_models_gives_empty_body() {
    let harness = start(&[]).await;
    let (status, body) = get(&harness, "/search?query=tretis&type=incipit").await;
    assert_eq!(status, 200);
    assert_eq!(body, "");
}

#[tokio::test]
async fn missing_or_blank_query_is_rejected() {
    let harness = start(&[2]).await;
    for path in [
        "/search?type=incipit",
        "/search?query=&type=incipit",
        "/search?query=+++&type=incipit",
        "/search?query=tretis",
    ] {
        let (status, body) = get(&harness, path).await;
        assert_eq!(status, 500, "{path}");
        assert_eq!(body, MISSING_QUERY, "{path}");
    }
}

#[tokio::test]
async fn unknown_type_is_bad_request() {
    let harness = start(&[2]).await;
    let (status, body) = get(&harness, "/search?query=tretis&type=colophon").await;
    assert_eq!(status, 400);
    assert!(body.contains("colophon"));
}

#[tokio::test]
async fn scorer_failure_is_server_error() {
    let harness = start(&[2]).await;
    harness.pipeline.scorer().fail.store(true, Ordering::SeqCst);
    let (status, body) = get(&harness, "/search?query=tretis&type=incipit").await;
    assert_eq!(status, 500);
    assert!(body.contains("scorer unavailable"));
}

#[tokio::test]
async fn health_endpoint_answers_ok() {
    let harness = start(&[]).await;
    let (status, body) = get(&harness, "/health").await;
    assert_eq!(status, 200);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn shutdown_stops_accepting_requests() {
    let mut harness = start(&[]).await;
    let url = format!("http://127.0.0.1:{}/health", harness.server.port());
    harness.server.shutdown();
    harness.server.wait().await.expect("wait");
    assert!(reqwest::get(&url).await.is_err());
}
