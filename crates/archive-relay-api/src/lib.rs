//! # Archive Relay HTTP Service
//!
//! HTTP front end for the archive relay.
//!
//! This service provides:
//! - The Bitbucket webhook endpoint (`POST /webhook` by default)
//! - A liveness endpoint (`GET /health`)

pub mod config;
pub mod errors;

pub use config::{
    LoggingConfig, RelayConfig, ServerConfig, ServiceConfig, StorageBackend, StorageConfig,
    WebhookConfig,
};
pub use errors::{ConfigError, ServiceError, WebhookHandlerError};

use archive_relay_core::{ArchiveRelay, WebhookOutcome, WebhookRequest};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::{
    future::{Future, IntoFuture},
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: ServiceConfig,

    /// Relay that handles webhook deliveries
    pub relay: Arc<ArchiveRelay>,
}

impl AppState {
    pub fn new(config: ServiceConfig, relay: Arc<ArchiveRelay>) -> Self {
        Self { config, relay }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let max_body_size = state.config.server.max_body_size;

    Router::new()
        .route(&state.config.webhook.endpoint_path, post(handle_webhook))
        .route("/health", get(handle_health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(max_body_size))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server
pub async fn start_server(
    config: ServiceConfig,
    relay: Arc<ArchiveRelay>,
) -> Result<(), ServiceError> {
    let address = format!("{}:{}", config.server.host, config.server.port);
    let addr: SocketAddr = address.parse().map_err(|e| ServiceError::BindFailed {
        address: address.clone(),
        message: format!("invalid address: {}", e),
    })?;

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    let app = create_router(AppState::new(config, relay));

    let listener =
        tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServiceError::BindFailed {
                address: addr.to_string(),
                message: e.to_string(),
            })?;

    info!("Starting HTTP server on {}", addr);

    serve_until_shutdown(listener, app, shutdown_signal(shutdown_timeout), shutdown_timeout).await?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Serve `app` until `signal` resolves, then drain in-flight requests.
///
/// New connections are refused as soon as the signal arrives. Requests still
/// running `shutdown_timeout` after the signal are abandoned.
pub async fn serve_until_shutdown<S>(
    listener: tokio::net::TcpListener,
    app: Router,
    signal: S,
    shutdown_timeout: Duration,
) -> Result<(), ServiceError>
where
    S: Future<Output = ()> + Send + 'static,
{
    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let signal = async move {
        signal.await;
        let _ = signalled_tx.send(());
    };

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .into_future();
    tokio::pin!(server);

    let drain_deadline = async move {
        match signalled_rx.await {
            Ok(()) => tokio::time::sleep(shutdown_timeout).await,
            // The server finished without a signal.
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = &mut server => result.map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        }),
        _ = drain_deadline => {
            warn!(
                timeout_seconds = shutdown_timeout.as_secs(),
                "Graceful shutdown timed out; abandoning in-flight requests"
            );
            Ok(())
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
///
/// If a handler cannot be installed the corresponding branch never resolves,
/// so the server keeps running instead of shutting down immediately.
async fn shutdown_signal(shutdown_timeout: Duration) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
        },
    }
}

// ============================================================================
// Request Handlers
// ============================================================================

/// Handle a Bitbucket webhook delivery
///
/// Returns `204 No Content` both for acknowledged pings and for processed
/// push events, including pushes that carry no branch changes.
#[instrument(skip(state, headers, body), fields(body_size = body.len()))]
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, WebhookHandlerError> {
    info!("Received webhook request");

    // Headers whose values are not visible ASCII are treated as absent.
    let request = WebhookRequest::new(
        headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
        body,
    );

    match state.relay.handle(&request).await? {
        WebhookOutcome::PingAcknowledged => {}
        WebhookOutcome::Processed { archives } => {
            info!(archives = archives.len(), "Processed push event");
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Liveness check
async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
