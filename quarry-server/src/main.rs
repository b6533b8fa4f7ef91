use anyhow::{Context, Result};
use axum::routing::get;
use clap::Parser;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use quarry::config::{Config, LoggingConfig, ObservabilityConfig};
use quarry::registry::InMemoryRegistry;
use quarry::QueryEngine;

#[derive(Parser, Debug)]
#[command(name = "quarry-server")]
#[command(about = "Quarry data source server for LLM tool calling")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "QUARRY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to, overrides server.bind_addr
    #[arg(short, long)]
    bind: Option<String>,

    /// Sources file, overrides registry.sources_file
    #[arg(short, long)]
    sources: Option<PathBuf>,
}

fn init_tracing(observability: &ObservabilityConfig, logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&observability.log_level))
        .context("Invalid log filter")?;

    let json = observability.log_format.eq_ignore_ascii_case("json");
    let pretty_layer = (!json).then(tracing_subscriber::fmt::layer);
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json());

    let file_layer = match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {:?}", path))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty_layer)
        .with(json_layer)
        .with(file_layer)
        .init();
    Ok(())
}

fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;
    config.ensure_dirs()?;

    init_tracing(&config.observability, &config.logging)?;
    tracing::info!("Config file: {:?}", config_path);

    let metrics_handle = if config.observability.metrics_enabled {
        Some(init_metrics()?)
    } else {
        None
    };

    if let Some(sources) = args.sources {
        config.registry.sources_file = Some(sources);
    }
    let registry = match &config.registry.sources_file {
        Some(path) => InMemoryRegistry::load_from_file(path)
            .with_context(|| format!("Failed to load sources from {:?}", path))?,
        None => {
            tracing::warn!("No sources file configured, starting with an empty registry");
            InMemoryRegistry::new()
        }
    };
    metrics::gauge!("quarry_sources_loaded").set(registry.len() as f64);

    let engine = Arc::new(QueryEngine::from_config(&config, Arc::new(registry))?);
    let server = quarry::api::ApiServer::with_cors(engine, config.server.cors.clone());

    let mut router = server.router();
    if let Some(handle) = metrics_handle {
        router = router.route("/metrics", get(move || std::future::ready(handle.render())));
        tracing::info!("Metrics exposed at /metrics");
    }

    let addr = args.bind.unwrap_or(config.server.bind_addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Cannot bind {}", addr))?;
    tracing::info!("Starting Quarry server on {}", addr);
    axum::serve(listener, router).await?;

    Ok(())
}
