//! # Alerts API Handlers

use axum::{
    extract::{Query, State, rejection::QueryRejection},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

use crate::alerting::AlertView;
use crate::error::{ApiError, validation_error};
use crate::server::AppState;

/// Largest page the alert listing returns.
pub const MAX_ALERT_LIMIT: u32 = 500;

/// Query parameters for the alert listing
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListAlertsQuery {
    /// Maximum number of alerts to return (1-500, default: all)
    pub limit: Option<u32>,
}

/// Alert board contents, newest first
#[derive(Debug, Serialize, ToSchema)]
pub struct AlertListResponse {
    pub alerts: Vec<AlertView>,
    /// Number of alerts on the board before `limit` was applied
    pub total: usize,
    /// When the board was last reloaded from the store
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// List alerts from the board, one per sample timestamp
#[utoipa::path(
    get,
    path = "/alerts",
    params(ListAlertsQuery),
    responses(
        (status = 200, description = "Alerts, newest first", body = AlertListResponse),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "alerts"
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    query: Result<Query<ListAlertsQuery>, QueryRejection>,
) -> Result<Json<AlertListResponse>, ApiError> {
    let Query(query) = query?;

    if let Some(limit) = query.limit
        && !(1..=MAX_ALERT_LIMIT).contains(&limit)
    {
        return Err(validation_error(
            "Invalid limit",
            json!({ "limit": format!("must be between 1 and {MAX_ALERT_LIMIT}") }),
        ));
    }

    let snapshot = state.board.snapshot().await;
    let total = snapshot.alerts.len();
    let take = query.limit.map_or(total, |limit| limit as usize);

    Ok(Json(AlertListResponse {
        alerts: snapshot.alerts.iter().take(take).cloned().collect(),
        total,
        refreshed_at: snapshot.refreshed_at,
    }))
}
