//! # Server Configuration
//!
//! Router, shared state and the HTTP server lifecycle.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, middleware, routing::get};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::alerting::AlertBoard;
use crate::config::AppConfig;
use crate::feeds::TelemetrySource;
use crate::handlers;
use crate::telemetry;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    /// Alert list refreshed by the poller
    pub board: AlertBoard,
    /// Feed client used for device status
    pub source: Arc<dyn TelemetrySource>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/alerts", get(handlers::alerts::list_alerts))
        .route("/devices/status", get(handlers::devices::device_statuses))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(telemetry::trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serves the API until `shutdown` is cancelled.
pub async fn run_server(state: AppState, shutdown: CancellationToken) -> Result<()> {
    let addr = state
        .config
        .bind_addr()
        .with_context(|| format!("Invalid server address: {}", state.config.api_bind_addr))?;
    let profile = state.config.profile.clone();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, %profile, "Server listening");

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::alerts::list_alerts,
        crate::handlers::devices::device_statuses,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::alerts::AlertListResponse,
            crate::handlers::devices::DeviceStatusResponse,
            crate::alerting::AlertView,
            crate::alerting::TriggerKind,
            crate::status::DeviceStatus,
            crate::status::Readings,
            crate::error::ApiError,
        )
    ),
    tags(
        (name = "root", description = "Service information and health"),
        (name = "alerts", description = "Fire alert log"),
        (name = "devices", description = "Device status"),
    ),
    info(
        title = "Firewatch API",
        description = "Read API over fire-detection alerts and device status",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
