use anyhow::{Context, Result};
use quarry::registry::InMemoryRegistry;
use quarry::DataSource;
use quarry_importer::{load_document, parse_document, parse_operation};
use std::path::Path;

pub struct ImportArgs<'a> {
    pub document: &'a Path,
    pub name: &'a str,
    pub categories: Vec<String>,
    pub path: Option<&'a str>,
    pub method: &'a str,
}

/// Build one API source from an OpenAPI or Swagger document
pub fn import_source(args: &ImportArgs<'_>) -> Result<DataSource> {
    let text = std::fs::read_to_string(args.document)
        .with_context(|| format!("Failed to read {:?}", args.document))?;
    let doc = load_document(&text)?;
    let endpoint = match args.path {
        Some(path) => parse_operation(&doc, path, args.method)?,
        None => parse_document(&doc)?,
    };

    for warning in &endpoint.warnings {
        eprintln!("  ⚠ {}", warning);
    }
    tracing::info!(
        "Imported {} {} from '{}'",
        endpoint.operation.method,
        endpoint.operation.path,
        endpoint.title
    );
    Ok(endpoint.into_source(args.name, args.categories.clone()))
}

/// Run import-openapi; the source is appended to `output` or printed as JSON
pub fn run_import_openapi(args: &ImportArgs<'_>, output: Option<&Path>) -> Result<()> {
    let source = import_source(args)?;

    let Some(output) = output else {
        println!("{}", serde_json::to_string_pretty(&source)?);
        return Ok(());
    };

    let registry = if output.exists() {
        InMemoryRegistry::load_from_file(output)?
    } else {
        InMemoryRegistry::new()
    };
    let id = source.id.clone();
    registry.insert(source)?;
    registry.save_to_file(output)?;
    println!("Added source {} to {} ({} sources)", id, output.display(), registry.len());
    Ok(())
}
