mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use quarry::tabular::ParseOptions;
use quarry::Config;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(about = "Quarry CLI - data source tools")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Infer the column schema of a delimited file
    Inspect {
        /// File to inspect
        file: PathBuf,

        /// Field delimiter
        #[arg(short, long, default_value = ",")]
        delimiter: char,

        /// Treat the first row as data
        #[arg(long)]
        no_header: bool,

        /// Lines to skip before the header
        #[arg(long, default_value = "0")]
        skip_rows: usize,
    },

    /// Build an API source from an OpenAPI or Swagger document
    ImportOpenapi {
        /// JSON or YAML description document
        document: PathBuf,

        /// Display name of the new source
        #[arg(short, long)]
        name: String,

        /// Categories allowed to query the source (comma-separated)
        #[arg(short, long)]
        categories: String,

        /// Operation path to import instead of the first one
        #[arg(long)]
        path: Option<String>,

        /// Operation method, used with --path
        #[arg(long, default_value = "get")]
        method: String,

        /// Sources file to append to; prints JSON when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run one query_data_source call locally
    Query {
        /// JSON or YAML sources file
        #[arg(short, long)]
        sources: PathBuf,

        /// Caller categories (comma-separated)
        #[arg(short, long)]
        categories: String,

        /// Tool arguments as JSON
        #[arg(short, long)]
        args: String,

        /// Configuration file path
        #[arg(long, env = "QUARRY_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Clear a SQLite response cache
    CacheClear {
        /// Path to cache database
        #[arg(short, long)]
        path: PathBuf,

        /// Only remove expired entries
        #[arg(long)]
        expired_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect {
            file,
            delimiter,
            no_header,
            skip_rows,
        } => {
            let options = ParseOptions {
                delimiter,
                has_header: !no_header,
                skip_rows,
                ..ParseOptions::default()
            };
            commands::run_inspect(&file, &options)?;
        }
        Commands::ImportOpenapi {
            document,
            name,
            categories,
            path,
            method,
            output,
        } => {
            let args = commands::import_openapi::ImportArgs {
                document: &document,
                name: &name,
                categories: commands::split_categories(&categories),
                path: path.as_deref(),
                method: &method,
            };
            commands::run_import_openapi(&args, output.as_deref())?;
        }
        Commands::Query {
            sources,
            categories,
            args,
            config,
        } => {
            let config = match config {
                Some(path) => Config::load_or_create(&path)?,
                None => Config::default(),
            };
            commands::run_query(&config, &sources, commands::split_categories(&categories), &args)
                .await?;
        }
        Commands::CacheClear { path, expired_only } => {
            commands::run_cache_clear(&path, expired_only).await?;
        }
    }

    Ok(())
}
