use anyhow::{Context, Result};
use quarry::registry::InMemoryRegistry;
use quarry::{Config, QueryEngine, RequestContext, ResponseEnvelope};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Run one `query_data_source` call against a local sources file
pub async fn execute_query(
    config: &Config,
    sources: &Path,
    categories: Vec<String>,
    args: &str,
) -> Result<ResponseEnvelope> {
    let args: Value = serde_json::from_str(args).context("--args must be a JSON object")?;
    let registry = InMemoryRegistry::load_from_file(sources)
        .with_context(|| format!("Failed to load sources from {:?}", sources))?;
    let engine = QueryEngine::from_config(config, Arc::new(registry))?;
    let ctx = RequestContext::new(categories);
    Ok(engine.execute(&args, &ctx).await)
}

pub async fn run_query(config: &Config, sources: &Path, categories: Vec<String>, args: &str) -> Result<()> {
    let envelope = execute_query(config, sources, categories, args).await?;
    println!("{}", serde_json::to_string_pretty(&envelope.to_json())?);
    if !envelope.success {
        anyhow::bail!("Query failed");
    }
    Ok(())
}
