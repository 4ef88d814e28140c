//! # Alert Repository
//!
//! Writes and reads the `alerts` table. The table carries a unique index on
//! (device_id, trigger_type, sampled_at); an insert rejected by it is
//! reported as [`InsertOutcome::Duplicate`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveValue::NotSet, DatabaseConnection, EntityTrait, QueryOrder, QuerySelect, Set,
};
use tracing::{debug, warn};

use super::{AlertStore, InsertOutcome, NewAlert, to_db_time};
use crate::alerting::{AlertKey, TriggerKind};
use crate::error::{RepositoryError, is_unique_violation};
use crate::models::alert::{self, Entity as Alert};

/// Repository for alert log operations
#[derive(Debug, Clone)]
pub struct AlertRepository {
    db: Arc<DatabaseConnection>,
}

impl AlertRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Most recent alerts, newest first.
    pub async fn list_recent(&self, limit: u64) -> Result<Vec<alert::Model>, RepositoryError> {
        Alert::find()
            .order_by_desc(alert::Column::SampledAt)
            .order_by_desc(alert::Column::Id)
            .limit(limit)
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}

#[async_trait]
impl AlertStore for AlertRepository {
    async fn recent_alert_keys(&self, limit: u64) -> Result<Vec<AlertKey>, RepositoryError> {
        let records = self.list_recent(limit).await?;

        let keys = records
            .into_iter()
            .filter_map(|record| match record.trigger_type.parse::<TriggerKind>() {
                Ok(trigger) => Some(AlertKey::new(
                    record.device_id,
                    trigger,
                    record.sampled_at.with_timezone(&Utc),
                )),
                Err(err) => {
                    warn!(alert_id = record.id, error = %err, "skipping alert with unknown trigger type");
                    None
                }
            })
            .collect();

        Ok(keys)
    }

    async fn insert_alert(&self, new_alert: NewAlert) -> Result<InsertOutcome, RepositoryError> {
        let model = alert::ActiveModel {
            id: NotSet,
            entry_id: Set(new_alert.entry_id),
            device_id: Set(new_alert.device_id.clone()),
            trigger_type: Set(new_alert.trigger.as_str().to_string()),
            smoke1: Set(new_alert.smoke1),
            smoke2: Set(new_alert.smoke2),
            flame1: Set(new_alert.flame1),
            flame2: Set(new_alert.flame2),
            threshold: Set(new_alert.threshold),
            sampled_at: Set(to_db_time(new_alert.sampled_at)),
            created_at: Set(to_db_time(Utc::now())),
        };

        match Alert::insert(model).exec(&*self.db).await {
            Ok(result) => Ok(InsertOutcome::Inserted(result.last_insert_id)),
            Err(err) if is_unique_violation(&err) => {
                debug!(
                    device_id = %new_alert.device_id,
                    trigger = %new_alert.trigger,
                    sampled_at = %new_alert.sampled_at,
                    "alert already stored"
                );
                Ok(InsertOutcome::Duplicate)
            }
            Err(err) => Err(RepositoryError::database_error(err)),
        }
    }

    async fn list_alerts(&self) -> Result<Vec<alert::Model>, RepositoryError> {
        Alert::find()
            .order_by_desc(alert::Column::SampledAt)
            .order_by_desc(alert::Column::Id)
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}
