//! Database migrations for the Firewatch service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_10_01_000001_create_devices;
mod m2025_10_01_000002_create_alerts;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_10_01_000001_create_devices::Migration),
            Box::new(m2025_10_01_000002_create_alerts::Migration),
        ]
    }
}
