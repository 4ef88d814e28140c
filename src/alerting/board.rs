//! Read-side alert list shared between the poller and the HTTP handlers.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::error::RepositoryError;
use crate::models::alert;
use crate::repositories::AlertStore;

/// Alert as exposed to dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AlertView {
    #[schema(example = 42)]
    pub id: i32,
    pub entry_id: Option<i64>,
    #[schema(example = "Device-01")]
    pub device_id: String,
    #[schema(example = "SmokeSensor1")]
    pub trigger_type: String,
    pub smoke1: f64,
    pub smoke2: f64,
    pub flame1: f64,
    pub flame2: f64,
    pub threshold: f64,
    pub sampled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<alert::Model> for AlertView {
    fn from(model: alert::Model) -> Self {
        Self {
            id: model.id,
            entry_id: model.entry_id,
            device_id: model.device_id,
            trigger_type: model.trigger_type,
            smoke1: model.smoke1,
            smoke2: model.smoke2,
            flame1: model.flame1,
            flame2: model.flame2,
            threshold: model.threshold,
            sampled_at: model.sampled_at.with_timezone(&Utc),
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

/// Keeps the first record of every run sharing an exact `sampled_at`.
///
/// Input is expected newest first, so the newest insert wins.
pub fn collapse_same_timestamp(records: Vec<alert::Model>) -> Vec<alert::Model> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.sampled_at.with_timezone(&Utc)))
        .collect()
}

#[derive(Debug, Default)]
struct BoardState {
    alerts: Arc<Vec<AlertView>>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Point-in-time copy of the board.
#[derive(Debug, Clone)]
pub struct AlertSnapshot {
    pub alerts: Arc<Vec<AlertView>>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Handle to the latest alert list; cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct AlertBoard {
    state: Arc<RwLock<BoardState>>,
}

impl AlertBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reloads the full alert log from the store. Returns the number of alerts kept.
    pub async fn refresh(&self, store: &dyn AlertStore) -> Result<usize, RepositoryError> {
        let records = store.list_alerts().await?;
        let alerts: Vec<AlertView> = collapse_same_timestamp(records)
            .into_iter()
            .map(AlertView::from)
            .collect();
        let count = alerts.len();

        let mut state = self.state.write().await;
        state.alerts = Arc::new(alerts);
        state.refreshed_at = Some(Utc::now());
        Ok(count)
    }

    pub async fn snapshot(&self) -> AlertSnapshot {
        let state = self.state.read().await;
        AlertSnapshot {
            alerts: state.alerts.clone(),
            refreshed_at: state.refreshed_at,
        }
    }
}
