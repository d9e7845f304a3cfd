//! CLI binary for imep.

use clap::{Parser, Subcommand};
use imep::config::CONFIG_ENV;
use imep::{SearchServer, ServiceConfig};
use imep_search::{CandidateFilter, ModelBuilder, ModelStore, SearchMode, SrilmScorer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// imep: perplexity-ranked incipit and explicit search.
#[derive(Parser)]
#[command(name = "imep", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Serve searches over HTTP.
    Serve {
        /// Override the configured port.
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run one search and print the matching entry numbers.
    Search {
        /// Free-text query.
        query: String,

        /// Corpus to search.
        #[arg(long, default_value = "incipit")]
        mode: SearchMode,

        /// Print coarse candidates and scores as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Precompute the per-entry model store for one corpus.
    BuildModels {
        /// Corpus whose entries get models.
        #[arg(long)]
        mode: SearchMode,

        /// Retrain entries that already have a complete model set.
        #[arg(long)]
        force: bool,
    },

    /// Write the default configuration to a file.
    InitConfig {
        /// Destination (defaults to the standard config path).
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Command::InitConfig { path } = &cli.command {
        let path = path.clone().unwrap_or_else(ServiceConfig::default_config_path);
        ServiceConfig::default().save_to_file(&path)?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    let config = ServiceConfig::resolve(cli.config.as_deref())?;
    let _log_guard = imep::logging::init(&config.logging)?;

    match cli.command {
        Command::Serve { port } => run_serve(config, port).await,
        Command::Search { query, mode, json } => run_search(config, &query, mode, json).await,
        Command::BuildModels { mode, force } => run_build_models(config, mode, force).await,
        Command::InitConfig { .. } => Ok(()),
    }
}

async fn run_serve(mut config: ServiceConfig, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    let scorer = SrilmScorer::new(&config.scorer)?;
    let pipeline = Arc::new(imep::service::build_pipeline(&config, scorer)?);
    let mut server = SearchServer::start(pipeline, &config.server).await?;

    tokio::select! {
        result = server.wait() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down...");
        }
    }
    Ok(())
}

async fn run_search(
    config: ServiceConfig,
    query: &str,
    mode: SearchMode,
    json: bool,
) -> anyhow::Result<()> {
    let scorer = SrilmScorer::new(&config.scorer)?;
    let pipeline = imep::service::build_pipeline(&config, scorer)?;
    let outcome = pipeline.search(query, mode).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.to_response_text());
    }
    Ok(())
}

async fn run_build_models(
    config: ServiceConfig,
    mode: SearchMode,
    force: bool,
) -> anyhow::Result<()> {
    let scorer = SrilmScorer::new(&config.scorer)?;
    let corpora = imep::service::load_corpora(&config.data)?;
    let store = ModelStore::new(config.data.model_dir_path());
    let summary = ModelBuilder::new(
        &scorer,
        &store,
        CandidateFilter::new(config.search.min_entry_chars),
        config.search.scratch_dir.clone(),
        config.search.build_concurrency,
    )
    .build(&corpora, mode, force)
    .await?;
    println!(
        "{mode}: trained {}, kept {}, ineligible {}",
        summary.trained, summary.kept, summary.ineligible
    );
    Ok(())
}
