//! imep: perplexity-ranked incipit and explicit search for the Index of
//! Middle English Prose.
//!
//! This crate wraps the [`imep_search`] cascade in a service:
//! TOML configuration → resource loading → HTTP server
//!
//! # Architecture
//!
//! - **Config**: [`ServiceConfig`] names the corpora, noise phrases, model
//!   store, SRILM binaries and cascade settings
//! - **Service**: loads every resource once and builds a shared pipeline
//! - **Server**: `axum` front end answering `GET /search`

pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod service;

pub use config::ServiceConfig;
pub use error::{Result, ServiceError};
pub use server::SearchServer;
