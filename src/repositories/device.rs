//! Device repository for the registry table.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};

use super::{DeviceRegistry, to_db_time};
use crate::config::DeviceConfig;
use crate::error::RepositoryError;
use crate::feeds::DeviceChannel;
use crate::models::device::{self, Entity as Device};

/// Repository for device registry operations
#[derive(Debug, Clone)]
pub struct DeviceRepository {
    db: Arc<DatabaseConnection>,
}

impl DeviceRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// All devices ordered by id.
    pub async fn find_all(&self) -> Result<Vec<device::Model>, RepositoryError> {
        Device::find()
            .order_by_asc(device::Column::Id)
            .all(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<device::Model>, RepositoryError> {
        Device::find_by_id(id.to_string())
            .one(&*self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Inserts the device, or updates channel, credential and location of an
    /// existing row with the same id. Returns the stored row and whether it
    /// was created.
    pub async fn upsert(
        &self,
        entry: &DeviceConfig,
    ) -> Result<(device::Model, bool), RepositoryError> {
        let now = to_db_time(Utc::now());

        let existing = self.find_by_id(&entry.id).await?;
        let created = existing.is_none();

        let stored = match existing {
            Some(existing) => {
                let mut active: device::ActiveModel = existing.into();
                active.channel_id = Set(entry.channel_id.clone());
                active.read_api_key = Set(entry.read_api_key.clone());
                active.location = Set(entry.location.clone());
                active.updated_at = Set(now);
                active.update(&*self.db).await
            }
            None => {
                device::ActiveModel {
                    id: Set(entry.id.clone()),
                    name: Set(entry.id.clone()),
                    channel_id: Set(entry.channel_id.clone()),
                    read_api_key: Set(entry.read_api_key.clone()),
                    location: Set(entry.location.clone()),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await
            }
        };

        stored
            .map(|model| (model, created))
            .map_err(RepositoryError::database_error)
    }
}

impl From<device::Model> for DeviceChannel {
    fn from(model: device::Model) -> Self {
        Self {
            device_id: model.id,
            channel_id: model.channel_id,
            read_api_key: model.read_api_key,
        }
    }
}

#[async_trait]
impl DeviceRegistry for DeviceRepository {
    async fn list_devices(&self) -> Result<Vec<DeviceChannel>, RepositoryError> {
        let devices = self.find_all().await?;
        Ok(devices.into_iter().map(DeviceChannel::from).collect())
    }
}
