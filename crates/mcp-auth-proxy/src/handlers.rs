//! HTTP handlers for the forwarding proxy.
//!
//! Implements:
//! - ANY <health path> - Liveness probe, answered locally
//! - ANY /* - Forwarded to the upstream MCP server with the bearer token

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::response::Response;
use axum::routing::any;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::ProxySettings;
use crate::error::ProxyError;
use crate::upstream::{SharedUpstream, Upstream};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<ProxySettings>,
    pub upstream: SharedUpstream,
}

impl AppState {
    pub fn new(settings: ProxySettings) -> anyhow::Result<Self> {
        let settings = Arc::new(settings);
        let upstream = Arc::new(Upstream::new(settings.clone())?);
        Ok(Self { settings, upstream })
    }
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Health check endpoint. Never touches upstream.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Catch-all forwarding endpoint.
pub async fn proxy_handler(
    State(state): State<AppState>,
    req: Request,
) -> std::result::Result<Response, ProxyError> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    state.upstream.forward(req).await.inspect_err(|e| {
        warn!("{} {} -> {}: {}", method, path, e.status().as_u16(), e);
    })
}

/// Build the router: health probe, catch-all forwarder, tracing and optional CORS.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route(&state.settings.health_path, any(health_handler))
        .fallback(proxy_handler)
        .layer(TraceLayer::new_for_http());

    if state.settings.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router = router.layer(cors);
    }

    router.with_state(state)
}
