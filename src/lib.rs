//! # Firewatch
//!
//! Fire-detection alert ingestion: polls device telemetry, records alerts for
//! smoke and flame triggers, and serves the alert log and device status.

pub mod alerting;
pub mod config;
pub mod db;
pub mod error;
pub mod feeds;
pub mod handlers;
pub mod models;
pub mod poller;
pub mod repositories;
pub mod seeds;
pub mod server;
pub mod status;
pub mod telemetry;
pub use migration;
