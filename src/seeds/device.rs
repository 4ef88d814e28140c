//! Device registry seeding
//!
//! Upserts every device listed in `FIREWATCH_DEVICES`. Rows not listed are
//! left untouched.

use anyhow::{Context, Result};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::DeviceConfig;
use crate::repositories::DeviceRepository;

/// Seeds the devices table from configuration.
///
/// Returns the number of devices written.
pub async fn seed_devices(db: &DatabaseConnection, devices: &[DeviceConfig]) -> Result<usize> {
    if devices.is_empty() {
        log::info!("No devices configured for seeding");
        return Ok(0);
    }

    let repo = DeviceRepository::new(Arc::new(db.clone()));

    for entry in devices {
        let (_, created) = repo
            .upsert(entry)
            .await
            .with_context(|| format!("failed to seed device '{}'", entry.id))?;

        if created {
            log::info!("Created device '{}' (channel {})", entry.id, entry.channel_id);
        } else {
            log::info!("Updated device '{}' (channel {})", entry.id, entry.channel_id);
        }
    }

    log::info!("Device registry seeding completed ({} devices)", devices.len());
    Ok(devices.len())
}
