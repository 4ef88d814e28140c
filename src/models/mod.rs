//! # Data Models
//!
//! SeaORM entities for the device registry and the alert log, plus small
//! response types shared by the HTTP handlers.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod alert;
pub mod device;

pub use alert::Entity as Alert;
pub use device::Entity as Device;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "firewatch".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
