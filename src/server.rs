//! HTTP front end for the search pipeline.
//!
//! ## Endpoints
//!
//! - `GET /search?query=<q>&type=<incipit|explicit>`: comma-joined entry
//!   numbers as `text/plain`, best match first
//! - `GET /health`: liveness probe

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use imep_search::{LanguageModelScorer, SearchError, SearchMode, SearchPipeline};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{Result, ServiceError};

/// Body returned when the query parameter is missing or empty.
pub const MISSING_QUERY: &str = "Missing query!";

/// Query-string parameters of `GET /search`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    /// Free-text query.
    pub query: Option<String>,
    /// Search mode name.
    #[serde(rename = "type")]
    pub mode: Option<String>,
}

/// Shared state for axum handlers.
struct AppState<S> {
    pipeline: Arc<SearchPipeline<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
        }
    }
}

/// The search HTTP server, running in a background task.
pub struct SearchServer {
    /// The address the server is listening on.
    addr: SocketAddr,
    /// Handle to the background server task.
    handle: JoinHandle<()>,
}

impl SearchServer {
    /// Start serving `pipeline`.
    ///
    /// Binds to `{config.host}:{config.port}` (use port `0` for auto-assign)
    /// and begins serving in a background tokio task.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot bind.
    pub async fn start<S>(pipeline: Arc<SearchPipeline<S>>, config: &ServerConfig) -> Result<Self>
    where
        S: LanguageModelScorer + 'static,
    {
        let app = router(pipeline);

        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ServiceError::Server(format!("bind to {bind_addr} failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ServiceError::Server(format!("failed to get local addr: {e}")))?;

        info!("search server listening on http://{addr}");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("search server error: {e}");
            }
        });

        Ok(Self { addr, handle })
    }

    /// Returns the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Wait until the server task ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the server task panicked.
    pub async fn wait(&mut self) -> Result<()> {
        match (&mut self.handle).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(ServiceError::Server(format!("server task failed: {e}"))),
        }
    }

    /// Abort the server task.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for SearchServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Build the router serving `pipeline`.
pub fn router<S>(pipeline: Arc<SearchPipeline<S>>) -> Router
where
    S: LanguageModelScorer + 'static,
{
    Router::new()
        .route("/search", get(handle_search::<S>))
        .route("/health", get(handle_health))
        .with_state(AppState { pipeline })
}

fn text(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

/// `GET /health`
async fn handle_health() -> Response {
    text(StatusCode::OK, "ok".to_owned())
}

/// `GET /search`
async fn handle_search<S>(
    State(state): State<AppState<S>>,
    Query(params): Query<SearchParams>,
) -> Response
where
    S: LanguageModelScorer + 'static,
{
    let Some(query) = params.query.filter(|q| !q.trim().is_empty()) else {
        return text(StatusCode::INTERNAL_SERVER_ERROR, MISSING_QUERY.to_owned());
    };
    let Some(mode) = params.mode else {
        return text(StatusCode::INTERNAL_SERVER_ERROR, MISSING_QUERY.to_owned());
    };
    let mode: SearchMode = match mode.parse() {
        Ok(mode) => mode,
        Err(e) => return text(StatusCode::BAD_REQUEST, format!("{e}")),
    };

    match state.pipeline.search(&query, mode).await {
        Ok(outcome) => text(StatusCode::OK, outcome.to_response_text()),
        Err(SearchError::InvalidQuery(_)) => {
            text(StatusCode::INTERNAL_SERVER_ERROR, MISSING_QUERY.to_owned())
        }
        Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, format!("search failed: {e}")),
    }
}
