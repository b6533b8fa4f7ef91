use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::CorsConfig;
use crate::engine::{QueryEngine, RequestContext, ResponseEnvelope};
use crate::mcp::{register_data_tools, JsonRpcRequest, JsonRpcResponse, McpHandler, ToolRegistry};
use crate::Result;

/// Header carrying the caller's comma-separated category ids
pub const CATEGORY_HEADER: &str = "x-category-ids";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueryEngine>,
    pub mcp_handler: Arc<McpHandler>,
}

pub struct ApiServer {
    engine: Arc<QueryEngine>,
    mcp_handler: Arc<McpHandler>,
    cors_config: CorsConfig,
}

impl ApiServer {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self::with_cors(engine, CorsConfig::default())
    }

    pub fn with_cors(engine: Arc<QueryEngine>, cors_config: CorsConfig) -> Self {
        let mut tool_registry = ToolRegistry::new();
        register_data_tools(&mut tool_registry);
        let mcp_handler = Arc::new(McpHandler::new(Arc::new(tool_registry), engine.clone()));

        Self {
            engine,
            mcp_handler,
            cors_config,
        }
    }

    /// POST /mcp - JSON-RPC requests
    async fn mcp_handler(
        State(state): State<AppState>,
        headers: HeaderMap,
        Json(req): Json<JsonRpcRequest>,
    ) -> Json<JsonRpcResponse> {
        let ctx = request_context(&headers);
        Json(state.mcp_handler.handle(req, ctx).await)
    }

    /// POST /query - one tool call, answered with the bare envelope
    async fn query_handler(
        State(state): State<AppState>,
        headers: HeaderMap,
        Json(args): Json<Value>,
    ) -> Json<ResponseEnvelope> {
        let ctx = request_context(&headers);
        Json(state.engine.execute(&args, &ctx).await)
    }

    /// GET /sources - sources visible to the caller
    async fn sources_handler(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
        let ctx = request_context(&headers);
        match state.engine.list_sources(&ctx).await {
            Ok(sources) => (StatusCode::OK, Json(serde_json::json!({ "sources": sources }))),
            Err(e) => (StatusCode::FORBIDDEN, Json(ResponseEnvelope::failure(&e).to_json())),
        }
    }

    async fn health() -> StatusCode {
        StatusCode::OK
    }

    /// Build CORS layer from configuration
    fn build_cors_layer(&self) -> CorsLayer {
        if !self.cors_config.enabled {
            return CorsLayer::new();
        }

        let origins: Vec<HeaderValue> = self
            .cors_config
            .origins
            .iter()
            .filter(|o| o.as_str() != "*")
            .filter_map(|o| o.parse().ok())
            .collect();
        let has_wildcard = self.cors_config.origins.iter().any(|o| o == "*");

        let cors = if has_wildcard {
            CorsLayer::new().allow_origin(tower_http::cors::Any)
        } else if origins.is_empty() {
            CorsLayer::new()
        } else {
            CorsLayer::new().allow_origin(origins)
        };

        cors.allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(tower_http::cors::Any)
    }

    pub fn router(&self) -> Router {
        let app_state = AppState {
            engine: self.engine.clone(),
            mcp_handler: self.mcp_handler.clone(),
        };

        Router::new()
            .route("/mcp", post(Self::mcp_handler))
            .route("/query", post(Self::query_handler))
            .route("/sources", get(Self::sources_handler))
            .route("/health", get(Self::health))
            .with_state(app_state)
            .layer(self.build_cors_layer())
            .layer(TraceLayer::new_for_http())
    }

    pub async fn serve(self, addr: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", addr);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// Ambient request context from transport headers
pub fn request_context(headers: &HeaderMap) -> RequestContext {
    let categories = headers
        .get(CATEGORY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(parse_categories)
        .unwrap_or_default();
    let ctx = RequestContext::new(categories);
    match headers.get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok()) {
        Some(id) => ctx.with_request_id(id),
        None => ctx,
    }
}

/// Split a comma-separated category list, dropping blanks
pub fn parse_categories(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}
