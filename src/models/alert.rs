//! Alert entity model
//!
//! Append-only alert log written by the ingestion cycle. One row per
//! (device, trigger type, sample timestamp).

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Persisted alert record
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "alerts")]
pub struct Model {
    /// Server-assigned identifier, increasing with insertion order
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Entry id of the originating telemetry sample, when the feed provided one
    pub entry_id: Option<i64>,

    /// Device the alert is recorded against (source device or a mirror)
    pub device_id: String,

    /// Trigger label, see [`crate::alerting::TriggerKind`]
    pub trigger_type: String,

    pub smoke1: f64,
    pub smoke2: f64,
    pub flame1: f64,
    pub flame2: f64,

    /// Threshold in effect for the batch the sample was evaluated in
    pub threshold: f64,

    /// Timestamp of the originating sample
    pub sampled_at: DateTimeWithTimeZone,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
