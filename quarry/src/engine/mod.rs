//! Query orchestrator
//!
//! Entry point for one tool invocation: resolve the named source, check the
//! caller's categories, dispatch to the tabular or remote path, run the
//! in-memory stages and wrap everything in a [`ResponseEnvelope`].

mod envelope;
mod pipeline;
mod request;

pub use envelope::{ErrorBody, ResponseEnvelope, ResponseMetadata};
pub use pipeline::{fields_from_rows, into_row, run as run_pipeline, PageLimits, PipelineOutput};
pub use request::QueryRequest;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::cache::build_cache;
use crate::config::Config;
use crate::registry::SourceRegistry;
use crate::remote::RemoteCaller;
use crate::source::{ApiSource, DataSource, SourceKind, SourceStatus, TabularSource};
use crate::tabular::parse_buffer;
use crate::{Error, Result, Row};

/// Per-request context supplied by the transport layer
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Ambient categories, used when the call names none
    pub category_ids: Vec<String>,
    pub request_id: String,
}

impl RequestContext {
    pub fn new(category_ids: Vec<String>) -> Self {
        Self {
            category_ids,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// Short description of a queryable source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceSummary {
    pub name: String,
    pub description: String,
    pub source_type: String,
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSummary {
    pub name: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
}

/// Result of a connection test
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub success: bool,
    pub message: String,
    pub record_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<Value>,
    pub fields: Vec<String>,
}

/// Rows pulled from a backend, before the in-memory stages
struct Fetched {
    rows: Vec<Row>,
    fields: Vec<String>,
    total: Option<u64>,
    cached: bool,
    fetched_at: Option<DateTime<Utc>>,
}

pub struct QueryEngine {
    registry: Arc<dyn SourceRegistry>,
    remote: RemoteCaller,
    limits: PageLimits,
}

impl QueryEngine {
    pub fn new(registry: Arc<dyn SourceRegistry>, remote: RemoteCaller, limits: PageLimits) -> Self {
        Self {
            registry,
            remote,
            limits,
        }
    }

    /// Build an engine from config: cache backend, credential provider and
    /// page limits.
    pub fn from_config(config: &Config, registry: Arc<dyn SourceRegistry>) -> anyhow::Result<Self> {
        let cache = build_cache(&config.cache)?;
        let credentials = config.credentials.provider()?;
        let remote = RemoteCaller::new(cache, credentials, config.engine.remote_defaults())?;
        Ok(Self::new(registry, remote, config.engine.page_limits()))
    }

    pub fn registry(&self) -> &Arc<dyn SourceRegistry> {
        &self.registry
    }

    pub fn remote(&self) -> &RemoteCaller {
        &self.remote
    }

    pub fn limits(&self) -> &PageLimits {
        &self.limits
    }

    /// Run one tool call from raw JSON arguments.
    #[instrument(skip(self, args, ctx), fields(request_id = %ctx.request_id))]
    pub async fn execute(&self, args: &Value, ctx: &RequestContext) -> ResponseEnvelope {
        match QueryRequest::from_args(args) {
            Ok(request) => self.execute_request(&request, ctx).await,
            Err(e) => {
                debug!("Rejected tool arguments: {}", e);
                record_outcome("unknown", &e, Instant::now());
                ResponseEnvelope::failure(&e)
            }
        }
    }

    /// Run one already-parsed tool call.
    pub async fn execute_request(
        &self,
        request: &QueryRequest,
        ctx: &RequestContext,
    ) -> ResponseEnvelope {
        let start = Instant::now();
        let mut source_type = "unknown";

        let result = async {
            let source = self.resolve(request, ctx).await?;
            source_type = source.kind.type_name();
            self.query_source(&source, request, start).await
        }
        .await;

        match result {
            Ok(envelope) => {
                metrics::counter!(
                    "quarry_queries_total",
                    "source_type" => source_type,
                    "outcome" => "success"
                )
                .increment(1);
                metrics::histogram!("quarry_query_duration_seconds")
                    .record(start.elapsed().as_secs_f64());
                envelope
            }
            Err(e) => {
                if matches!(e, Error::Http { .. } | Error::Timeout(_) | Error::Request(_)) {
                    tracing::error!("Query of '{}' failed upstream: {}", request.source_name, e);
                } else {
                    info!("Query of '{}' failed: {}", request.source_name, e);
                }
                record_outcome(source_type, &e, start);
                ResponseEnvelope::failure(&e)
            }
        }
    }

    /// Resolve the source and check access, in a fixed order: categories,
    /// lookup, authorization, status.
    async fn resolve(&self, request: &QueryRequest, ctx: &RequestContext) -> Result<DataSource> {
        let categories: &[String] = request
            .explicit_categories()
            .unwrap_or(ctx.category_ids.as_slice());
        if categories.is_empty() {
            return Err(Error::NoCategories);
        }

        let Some(source) = self.registry.get_source_by_name(&request.source_name).await? else {
            let available = self
                .registry
                .get_sources_for_categories(categories)
                .await?
                .into_iter()
                .filter(|s| s.status != SourceStatus::Inactive)
                .map(|s| s.name)
                .collect();
            return Err(Error::SourceNotFound {
                name: request.source_name.clone(),
                available,
            });
        };

        if !source.is_queryable_by(categories) {
            warn!("Access denied to '{}' for categories {:?}", source.name, categories);
            return Err(Error::AccessDenied(source.name));
        }
        if source.status == SourceStatus::Inactive {
            return Err(Error::SourceInactive(source.name));
        }
        Ok(source)
    }

    async fn query_source(
        &self,
        source: &DataSource,
        request: &QueryRequest,
        start: Instant,
    ) -> Result<ResponseEnvelope> {
        let empty = Map::new();
        let params = request.parameters.as_ref().unwrap_or(&empty);

        let fetched = match &source.kind {
            SourceKind::Csv(tabular) => read_tabular(tabular).await?,
            SourceKind::Api(api) => self.fetch_api(&source.id, api, params).await?,
        };

        let output = run_pipeline(
            fetched.rows,
            fetched.fields,
            fetched.total,
            request,
            &self.limits,
        )?;

        let execution_time_ms = start.elapsed().as_millis() as u64;
        info!(
            "Queried '{}' ({}): {} rows in {}ms{}",
            source.name,
            source.kind.type_name(),
            output.rows.len(),
            execution_time_ms,
            if fetched.cached { " (cached)" } else { "" }
        );

        let metadata = ResponseMetadata {
            source: source.name.clone(),
            source_type: source.kind.type_name().to_string(),
            record_count: output.rows.len(),
            total_records: output.total_records,
            fields: output.fields,
            execution_time_ms,
            cached: fetched.cached,
            fetched_at: fetched.fetched_at,
        };
        let data = output.rows.into_iter().map(Value::Object).collect();
        Ok(ResponseEnvelope::success(metadata, data, output.hint))
    }

    async fn fetch_api(
        &self,
        source_id: &str,
        api: &ApiSource,
        params: &Map<String, Value>,
    ) -> Result<Fetched> {
        let result = self.remote.fetch(source_id, api, params).await?;
        Ok(Fetched {
            rows: result.data.into_iter().map(into_row).collect(),
            fields: api
                .response_structure
                .fields
                .iter()
                .map(|f| f.name.clone())
                .collect(),
            total: result.total,
            cached: result.cached,
            fetched_at: Some(result.fetched_at),
        })
    }

    /// Sources visible to the context's categories. Inactive sources are
    /// left out.
    pub async fn list_sources(&self, ctx: &RequestContext) -> Result<Vec<SourceSummary>> {
        if ctx.category_ids.is_empty() {
            return Err(Error::NoCategories);
        }
        let sources = self
            .registry
            .get_sources_for_categories(&ctx.category_ids)
            .await?;
        Ok(sources
            .into_iter()
            .filter(|s| s.status != SourceStatus::Inactive)
            .map(summarize)
            .collect())
    }

    /// Exercise a source once and record the outcome in the registry.
    ///
    /// API sources are called with each parameter's default or example value,
    /// bypassing the cache. Tabular sources have their stored file parsed.
    #[instrument(skip(self, source), fields(source = %source.name))]
    pub async fn test_source(&self, source: &DataSource) -> Result<TestOutcome> {
        let attempt = match &source.kind {
            SourceKind::Api(api) => {
                let params = test_parameters(api);
                self.remote
                    .fetch_uncached(api, &params)
                    .await
                    .map(|result| {
                        let rows: Vec<Row> = result.data.into_iter().map(into_row).collect();
                        let fields = if api.response_structure.fields.is_empty() {
                            fields_from_rows(&rows)
                        } else {
                            source.field_names()
                        };
                        (rows, fields)
                    })
            }
            SourceKind::Csv(tabular) => read_tabular(tabular).await.and_then(|fetched| {
                if fetched.fields.is_empty() {
                    Err(Error::Query("File contains no columns".to_string()))
                } else {
                    Ok((fetched.rows, fetched.fields))
                }
            }),
        };

        let outcome = match attempt {
            Ok((rows, fields)) => TestOutcome {
                success: true,
                message: format!("Connection successful, {} records returned", rows.len()),
                record_count: rows.len(),
                sample: rows.into_iter().next().map(Value::Object),
                fields,
            },
            Err(e) => TestOutcome {
                success: false,
                message: e.to_string(),
                record_count: 0,
                sample: None,
                fields: Vec::new(),
            },
        };

        let error = (!outcome.success).then(|| outcome.message.clone());
        self.registry.record_test_result(&source.id, error).await?;
        info!("Tested '{}': success={}", source.name, outcome.success);
        Ok(outcome)
    }
}

fn record_outcome(source_type: &'static str, error: &Error, start: Instant) {
    metrics::counter!(
        "quarry_queries_total",
        "source_type" => source_type,
        "outcome" => error.code().to_string()
    )
    .increment(1);
    metrics::histogram!("quarry_query_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// Read and parse a stored file. A missing file is `FILE_NOT_FOUND`; a
/// buffer with no columns is an empty result.
async fn read_tabular(tabular: &TabularSource) -> Result<Fetched> {
    let buffer = match tokio::fs::read(&tabular.file_path).await {
        Ok(buffer) => buffer,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::FileNotFound(tabular.original_filename.clone()));
        }
        Err(e) => {
            return Err(Error::Query(format!(
                "Failed to read {}: {}",
                tabular.original_filename, e
            )))
        }
    };

    let table = parse_buffer(&buffer, &tabular.options);
    if table.is_empty() {
        debug!("'{}' parsed to zero columns", tabular.original_filename);
    }
    Ok(Fetched {
        fields: table.column_names(),
        total: None,
        rows: table.rows,
        cached: false,
        fetched_at: None,
    })
}

fn test_parameters(api: &ApiSource) -> Map<String, Value> {
    api.parameters
        .iter()
        .filter_map(|p| {
            p.default
                .clone()
                .or_else(|| p.example.clone())
                .map(|v| (p.name.clone(), v))
        })
        .collect()
}

fn summarize(source: DataSource) -> SourceSummary {
    let fields = source.field_names();
    let source_type = source.kind.type_name().to_string();
    let parameters = match &source.kind {
        SourceKind::Api(api) => api
            .parameters
            .iter()
            .map(|p| ParameterSummary {
                name: p.name.clone(),
                required: p.required,
                description: p.description.clone(),
                allowed_values: p.allowed_values.clone(),
            })
            .collect(),
        SourceKind::Csv(_) => Vec::new(),
    };
    SourceSummary {
        name: source.name,
        description: source.description,
        source_type,
        fields,
        parameters,
    }
}
