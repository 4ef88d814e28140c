//! Device entity model
//!
//! Registry entry for one fire-detection unit and the telemetry channel it
//! reports to.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Registered device with its channel reference and read credential
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "devices")]
pub struct Model {
    /// Stable device identifier (primary key), e.g. `Device-01`
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Human readable name
    pub name: String,

    /// External telemetry channel identifier
    pub channel_id: String,

    /// Read credential for the telemetry channel
    pub read_api_key: String,

    /// Optional installation location
    pub location: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
