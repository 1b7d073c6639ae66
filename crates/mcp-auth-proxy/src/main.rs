//! Bearer-token forwarding proxy for a remote MCP server.
//!
//! This proxy:
//! - Answers a local health probe
//! - Forwards every other request to the configured MCP server
//! - Replaces any caller `Authorization` with the configured bearer token
//! - Streams request and response bodies without buffering

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod handlers;
mod headers;
mod upstream;

use config::{Config, ProxySettings};
use handlers::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    let settings = ProxySettings::from_config(&config)?;

    info!("Starting mcp-auth-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("  Host: {}", config.host);
    info!("  Port: {}", config.port);
    info!("  Upstream: {}", settings.upstream_base_url);
    info!("  Token: sha256:{}...", settings.token_fingerprint());
    info!(
        "  Upstream timeout: {}s (connect: {}s)",
        settings.upstream_timeout.as_secs(),
        settings.connect_timeout.as_secs()
    );
    info!("  Health path: {}", settings.health_path);
    if settings.follow_redirects {
        info!("  Following upstream redirects");
    }
    if !settings.extra_forward_headers.is_empty() {
        info!("  Extra forwarded headers: {:?}", settings.extra_forward_headers);
    }
    if settings.enable_cors {
        info!("  CORS: enabled");
    }

    let state = AppState::new(settings)?;
    let app = build_router(state);

    // Bind and serve
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received Ctrl+C, initiating shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
        info!("Received SIGTERM, initiating shutdown");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
