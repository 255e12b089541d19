//! Axum web layer: the single-page form plus the JSON generation endpoint,
//! with health and metrics on the side.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::Config;
use crate::llm::{CopyGenerationError, CopyProvider};
use crate::logging::{record_generation, GenerationRecord};
use crate::prompt::CopyBrief;

const INDEX_HTML: &str = include_str!("../assets/index.html");
const LATENCY_WINDOW: usize = 256;

/// Shared state for the web layer.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<RwLock<CopyProvider>>,
    pub metrics: Arc<Mutex<ServerMetrics>>,
}

impl AppState {
    pub fn new(provider: CopyProvider) -> Self {
        Self {
            provider: Arc::new(RwLock::new(provider)),
            metrics: Arc::new(Mutex::new(ServerMetrics::new())),
        }
    }
}

/// Counters for the generation endpoint.
#[derive(Debug, Clone)]
pub struct ServerMetrics {
    pub total_requests: u64,
    pub last_request_unix: u64,
    pub errors_total: u64,
    pub latencies: Vec<f64>, // ring buffer for p95
}

impl ServerMetrics {
    fn new() -> Self {
        Self {
            total_requests: 0,
            last_request_unix: UNIX_EPOCH.elapsed().unwrap_or_default().as_secs(),
            errors_total: 0,
            latencies: Vec::with_capacity(LATENCY_WINDOW),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let metrics = state.metrics.clone();
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/generate", post(generate_handler))
        .layer(middleware::from_fn_with_state(metrics, track_requests))
        .with_state(state)
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health_handler() -> impl IntoResponse {
    "ok"
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = state.metrics.lock().await.clone();

    let (avg_latency_ms, p95_latency_ms) = if metrics.latencies.is_empty() {
        (None, None)
    } else {
        let sum: f64 = metrics.latencies.iter().sum();
        let avg = sum / metrics.latencies.len() as f64;
        let mut sorted = metrics.latencies.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let p95_idx = (sorted.len() as f64 * 0.95) as usize;
        let p95 = sorted.get(p95_idx).copied();
        (Some(avg), p95)
    };

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        json!({
            "metrics_version": "1",
            "total_requests": metrics.total_requests,
            "last_request_unix": metrics.last_request_unix,
            "errors_total": metrics.errors_total,
            "avg_latency_ms": avg_latency_ms,
            "p95_latency_ms": p95_latency_ms,
        })
        .to_string(),
    )
}

async fn generate_handler(
    State(state): State<AppState>,
    Json(brief): Json<CopyBrief>,
) -> Response {
    if let Err(err) = brief.validate() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response();
    }

    let provider = state.provider.read().await;
    match provider.generate(&brief).await {
        Ok(copy) => {
            record_generation(GenerationRecord::new(
                copy.provider.as_str(),
                brief.rapport.clone(),
                brief.reasons.clone(),
                brief.results.clone(),
                copy.text.clone(),
            ));
            (
                StatusCode::OK,
                Json(json!({
                    "copy": copy.text,
                    "provider": copy.provider.as_str(),
                })),
            )
                .into_response()
        }
        Err(err @ CopyGenerationError::ProviderNotConfigured) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
        Err(err) => {
            warn!("Copy generation failed: {}", err);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": format!("Failed to generate The 3 R's copy: {}", err)
                })),
            )
                .into_response()
        }
    }
}

/// Records request counts and latency for the API routes only; the static
/// page and probes stay out of the numbers.
async fn track_requests(
    State(metrics): State<Arc<Mutex<ServerMetrics>>>,
    req: axum::http::Request<Body>,
    next: axum::middleware::Next,
) -> Response {
    let is_api = req.uri().path().starts_with("/api/");
    let start = if is_api { Some(Instant::now()) } else { None };
    let resp = next.run(req).await;
    if let Some(start_time) = start {
        let latency_ms = start_time.elapsed().as_millis() as f64;
        let mut m = metrics.lock().await;
        if latency_ms > 0.0 {
            m.latencies.push(latency_ms);
            if m.latencies.len() > LATENCY_WINDOW {
                m.latencies.remove(0);
            }
        }
        if !resp.status().is_success() {
            m.errors_total = m.errors_total.saturating_add(1);
        }
        m.total_requests = m.total_requests.saturating_add(1);
        m.last_request_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
    }
    resp
}

pub async fn serve(config: &Config, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", config.bind))?;

    info!("Serving the 3 R's copy form on http://{}", config.bind);

    axum::serve(listener, router(state))
        .await
        .context("HTTP server error")?;

    Ok(())
}
