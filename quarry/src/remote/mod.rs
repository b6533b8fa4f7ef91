//! Remote endpoint caller
//!
//! One parameterized HTTP call against a described API source: cache first,
//! then request building, auth, a hard deadline, payload extraction and a
//! best-effort cache write.

pub mod jsonpath;
pub mod request;

pub use jsonpath::{extract, parse_path, Segment};
pub use request::{prepare_request, PreparedRequest};

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheKey, CachedResponse, QueryCache};
use crate::credentials::CredentialProvider;
use crate::query::coerce_number;
use crate::source::{
    ApiSource, HttpMethod, ResponseFormat, DEFAULT_CACHE_TTL_SECS, DEFAULT_TIMEOUT_SECS,
};
use crate::tabular::{parse_buffer, ParseOptions};
use crate::{Error, Result};

/// Upstream error bodies are truncated to this many characters
pub const ERROR_BODY_LIMIT: usize = 500;

/// Extracted records from one call
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub data: Vec<Value>,
    /// Upstream-reported total, when a total path is configured
    pub total: Option<u64>,
    pub cached: bool,
    pub fetched_at: DateTime<Utc>,
    pub execution_time_ms: u64,
}

/// Caller defaults applied when a source sets none
#[derive(Debug, Clone, Copy)]
pub struct RemoteDefaults {
    pub timeout: Duration,
    pub cache_ttl: Duration,
}

impl Default for RemoteDefaults {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }
}

pub struct RemoteCaller {
    client: Client,
    cache: Arc<dyn QueryCache>,
    credentials: Arc<dyn CredentialProvider>,
    defaults: RemoteDefaults,
}

impl RemoteCaller {
    pub fn new(
        cache: Arc<dyn QueryCache>,
        credentials: Arc<dyn CredentialProvider>,
        defaults: RemoteDefaults,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("quarry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Request(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            cache,
            credentials,
            defaults,
        })
    }

    pub fn cache(&self) -> &Arc<dyn QueryCache> {
        &self.cache
    }

    /// Fetch records for `source_id`, serving from cache when possible.
    #[instrument(skip(self, api, params), fields(endpoint = %api.endpoint))]
    pub async fn fetch(
        &self,
        source_id: &str,
        api: &ApiSource,
        params: &Map<String, Value>,
    ) -> Result<FetchResult> {
        let start = Instant::now();
        let key = CacheKey::new(source_id, &Value::Object(params.clone()));

        match self.cache.get(&key).await {
            Ok(Some(hit)) => {
                debug!("Cache hit for {}", key);
                return Ok(FetchResult {
                    data: hit.data,
                    total: hit.total,
                    cached: true,
                    fetched_at: hit.fetched_at,
                    execution_time_ms: start.elapsed().as_millis() as u64,
                });
            }
            Ok(None) => {}
            Err(e) => warn!("Cache read failed, treating as miss: {}", e),
        }

        let outcome = self.call(api, params).await;
        metrics::counter!(
            "quarry_remote_requests_total",
            "outcome" => if outcome.is_ok() { "ok" } else { "error" }
        )
        .increment(1);
        let (data, total) = outcome?;

        let fetched_at = Utc::now();
        let ttl = api
            .cache_ttl_secs
            .map(Duration::from_secs)
            .unwrap_or(self.defaults.cache_ttl);
        if !ttl.is_zero() {
            let entry = CachedResponse {
                data: data.clone(),
                total,
                fetched_at,
            };
            if let Err(e) = self.cache.set(&key, &entry, ttl).await {
                warn!("Cache write failed for {}: {}", key, e);
            }
        }

        let execution_time_ms = start.elapsed().as_millis() as u64;
        info!("Fetched {} records in {}ms", data.len(), execution_time_ms);
        Ok(FetchResult {
            data,
            total,
            cached: false,
            fetched_at,
            execution_time_ms,
        })
    }

    /// Call the endpoint, bypassing the cache in both directions.
    pub async fn fetch_uncached(
        &self,
        api: &ApiSource,
        params: &Map<String, Value>,
    ) -> Result<FetchResult> {
        let start = Instant::now();
        let (data, total) = self.call(api, params).await?;
        Ok(FetchResult {
            data,
            total,
            cached: false,
            fetched_at: Utc::now(),
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn call(
        &self,
        api: &ApiSource,
        params: &Map<String, Value>,
    ) -> Result<(Vec<Value>, Option<u64>)> {
        let prepared = prepare_request(api, params, self.credentials.as_ref())?;
        debug!("Prepared request: {:?}", prepared);

        let timeout = api
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.defaults.timeout);
        let timeout_secs = timeout.as_secs().max(1);

        let (body, content_type) = tokio::time::timeout(timeout, self.send(prepared))
            .await
            .map_err(|_| Error::Timeout(timeout_secs))?
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(timeout_secs)
                } else {
                    Error::Request(e.to_string())
                }
            })??;

        parse_payload(api, &body, content_type.as_deref())
    }

    /// Send the request; a non-2xx status is an `Ok(Err(Http))`.
    async fn send(
        &self,
        prepared: PreparedRequest,
    ) -> std::result::Result<Result<(Vec<u8>, Option<String>)>, reqwest::Error> {
        let mut builder = match prepared.method {
            HttpMethod::Get => self.client.get(prepared.url.clone()),
            HttpMethod::Post => self.client.post(prepared.url.clone()),
        };
        for (name, value) in &prepared.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &prepared.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body: String = text.chars().take(ERROR_BODY_LIMIT).collect();
            warn!("Upstream returned {}", status.as_u16());
            return Ok(Err(Error::Http {
                status: status.as_u16(),
                body,
            }));
        }

        let bytes = response.bytes().await?;
        Ok(Ok((bytes.to_vec(), content_type)))
    }
}

/// Parse a successful body and extract the record array and total.
pub fn parse_payload(
    api: &ApiSource,
    body: &[u8],
    content_type: Option<&str>,
) -> Result<(Vec<Value>, Option<u64>)> {
    let is_csv = api.response_format == ResponseFormat::Csv
        || content_type.is_some_and(|ct| ct.contains("text/csv"));

    if is_csv {
        let table = parse_buffer(body, &ParseOptions::default());
        let data = table.rows.into_iter().map(Value::Object).collect();
        return Ok((data, None));
    }

    let document: Value = serde_json::from_slice(body)
        .map_err(|e| Error::Request(format!("Invalid JSON response: {}", e)))?;

    let structure = &api.response_structure;
    let data = match extract(&document, &structure.data_path)? {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    };

    let total = match &structure.total_path {
        Some(path) => extract(&document, path)?
            .and_then(coerce_number)
            .filter(|n| *n >= 0.0)
            .map(|n| n as u64),
        None => None,
    };

    Ok((data, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ResponseStructure;
    use serde_json::json;

    fn api_with_path(data_path: &str) -> ApiSource {
        let mut api = ApiSource::new("https://api.test/x");
        api.response_structure = ResponseStructure {
            data_path: data_path.to_string(),
            ..Default::default()
        };
        api
    }

    #[test]
    fn test_extract_array() {
        let api = api_with_path("$.data.items");
        let body = br#"{"data": {"items": [{"id": 1}, {"id": 2}]}}"#;
        let (data, total) = parse_payload(&api, body, Some("application/json")).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(total, None);
    }

    #[test]
    fn test_single_object_wrapped() {
        let api = api_with_path("$.result");
        let (data, _) = parse_payload(&api, br#"{"result": {"id": 7}}"#, None).unwrap();
        assert_eq!(data, vec![json!({"id": 7})]);
    }

    #[test]
    fn test_missing_or_null_is_empty() {
        let api = api_with_path("$.items");
        let (data, _) = parse_payload(&api, br#"{"other": 1}"#, None).unwrap();
        assert!(data.is_empty());
        let (data, _) = parse_payload(&api, br#"{"items": null}"#, None).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn test_total_path() {
        let mut api = api_with_path("$.results");
        api.response_structure.total_path = Some("$.meta.total".to_string());
        let body = br#"{"results": [{"a": 1}], "meta": {"total": 250}}"#;
        let (_, total) = parse_payload(&api, body, None).unwrap();
        assert_eq!(total, Some(250));
    }

    #[test]
    fn test_csv_by_content_type() {
        let api = api_with_path("$");
        let (data, _) = parse_payload(&api, b"a,b\n1,x\n", Some("text/csv; charset=utf-8")).unwrap();
        assert_eq!(data, vec![json!({"a": 1, "b": "x"})]);
    }

    #[test]
    fn test_invalid_json_is_request_error() {
        let api = api_with_path("$");
        let err = parse_payload(&api, b"<html>", None).unwrap_err();
        assert!(matches!(err, Error::Request(_)));
    }

    #[test]
    fn test_bad_data_path_rejected() {
        let api = api_with_path("$..items");
        let err = parse_payload(&api, b"{}", None).unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
    }
}
