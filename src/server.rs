use crate::config::ProxyConfig;
use crate::error::Result;
use crate::logging::{LogEntry, LogLevel, SharedLogger};
use crate::proxy::{self, ProxyContext, Upstream};
use crate::translate::RequestPipeline;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub client: reqwest::Client,
    pub logger: SharedLogger,
    pub pipeline: RequestPipeline,
    pub upstream: Upstream,
}

impl AppState {
    /// Validate `config` and build the per-process routing state from it.
    pub fn new(config: ProxyConfig, client: reqwest::Client, logger: SharedLogger) -> Result<Self> {
        config.validate()?;
        let pipeline = RequestPipeline::from_config(&config);
        let upstream = Upstream::from_config(&config)?;
        Ok(Self {
            config,
            client,
            logger,
            pipeline,
            upstream,
        })
    }

    fn context(&self, request_id: Uuid) -> ProxyContext<'_> {
        ProxyContext {
            client: &self.client,
            upstream: &self.upstream,
            pipeline: &self.pipeline,
            logger: &self.logger,
            max_body_bytes: self.config.max_body_bytes,
            request_id,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    Router::new()
        .route("/", get(handle_dashboard))
        .route("/dashboard.html", get(handle_dashboard))
        .route("/health", get(handle_health))
        .route("/proxy/logs", get(handle_logs))
        .fallback(handle_proxy)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Everything that is not served locally goes upstream.
async fn handle_proxy(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    // Preflights are answered by the CORS layer; any other OPTIONS stays local too.
    if method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }

    let request_id = Uuid::new_v4();
    let ctx = state.context(request_id);
    let path = uri.path();

    let result = if method == Method::POST && path.contains("/chat/completions") {
        proxy::forward_chat_completion(&ctx, &uri, &headers, body).await
    } else if method == Method::GET && path.contains("/models") {
        proxy::forward_models(&ctx, &uri, &headers).await
    } else {
        proxy::forward_raw(&ctx, method.clone(), &uri, &headers, body).await
    };

    match result {
        Ok(resp) => resp,
        Err(e) => {
            tracing::error!(%request_id, %method, path, error = %e, "Proxy error");
            state.logger.request(
                request_id,
                LogLevel::Error,
                "server",
                format!("Proxy error on {} {}: {}", method, path, e),
                None,
            );
            e.into_response()
        }
    }
}

async fn handle_dashboard(State(state): State<Arc<AppState>>) -> Response {
    match tokio::fs::read_to_string(&state.config.dashboard).await {
        Ok(page) => Html(page).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "Dashboard not found.").into_response(),
    }
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

async fn handle_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Json<Vec<LogEntry>> {
    Json(state.logger.recent(query.limit.unwrap_or(100)))
}
