//! # Device Status API Handlers

use std::sync::Arc;

use axum::{extract::State, response::Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::repositories::DeviceRepository;
use crate::server::AppState;
use crate::status::{DeviceStatus, collect_statuses};

/// Status of every registered device
#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceStatusResponse {
    pub devices: Vec<DeviceStatus>,
    /// Age after which a device counts as offline
    #[schema(example = 90)]
    pub offline_threshold_seconds: u64,
    pub generated_at: DateTime<Utc>,
}

/// Report online state and latest readings of each device
#[utoipa::path(
    get,
    path = "/devices/status",
    responses(
        (status = 200, description = "Device status, ordered by device id", body = DeviceStatusResponse),
        (status = 500, description = "Internal server error", body = ApiError),
        (status = 503, description = "Database unavailable", body = ApiError)
    ),
    tag = "devices"
)]
pub async fn device_statuses(
    State(state): State<AppState>,
) -> Result<Json<DeviceStatusResponse>, ApiError> {
    let repo = DeviceRepository::new(Arc::new(state.db.clone()));
    let devices = repo.find_all().await?;

    let statuses = collect_statuses(
        Arc::clone(&state.source),
        devices,
        &state.config.status,
        state.config.poller.fetch_concurrency,
    )
    .await;

    Ok(Json(DeviceStatusResponse {
        devices: statuses,
        offline_threshold_seconds: state.config.status.offline_threshold_seconds,
        generated_at: Utc::now(),
    }))
}
