//! Test utilities for database testing.
//!
//! In-memory SQLite databases with migrations applied, plus device fixtures.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use firewatch::config::DeviceConfig;
use firewatch::repositories::DeviceRepository;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Same as [`setup_test_db`], wrapped for the repositories.
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    Ok(Arc::new(setup_test_db().await?))
}

pub fn device(id: &str, channel_id: &str) -> DeviceConfig {
    DeviceConfig {
        id: id.to_string(),
        channel_id: channel_id.to_string(),
        read_api_key: format!("KEY-{channel_id}"),
        location: None,
    }
}

/// Registers `Device-01`..`Device-03` on channels 1001..1003.
pub async fn register_default_devices(db: &Arc<DatabaseConnection>) -> Result<Vec<DeviceConfig>> {
    let repo = DeviceRepository::new(db.clone());
    let devices = vec![
        device("Device-01", "1001"),
        device("Device-02", "1002"),
        device("Device-03", "1003"),
    ];
    for entry in &devices {
        repo.upsert(entry).await?;
    }
    Ok(devices)
}
