//! Configuration loading for the Firewatch service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `FIREWATCH_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::alerting::{DEFAULT_DEDUPE_WINDOW, DEFAULT_THRESHOLD_MARGIN, MirrorMap};

const ENV_PREFIX: &str = "FIREWATCH_";
const REDACTED: &str = "[REDACTED]";

/// Application configuration derived from `FIREWATCH_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub telemetry_api: TelemetryApiConfig,
    /// Devices upserted into the registry at startup
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceConfig>,
    /// Source → mirror links for alert propagation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alert_mirrors: Vec<MirrorLink>,
}

/// Alert ingestion cycle parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PollerConfig {
    /// Seconds between cycle starts (default: 10, range: 10-3600)
    ///
    /// Environment variable: `FIREWATCH_POLL_TICK_INTERVAL_SECONDS`
    #[serde(default = "default_poll_tick_interval_seconds")]
    pub tick_interval_seconds: u64,

    /// Samples requested per device and cycle (default: 5)
    ///
    /// Environment variable: `FIREWATCH_POLL_SAMPLE_LIMIT`
    #[serde(default = "default_poll_sample_limit")]
    pub sample_limit: u32,

    /// Recent alerts loaded for duplicate suppression (default: 20)
    ///
    /// Environment variable: `FIREWATCH_POLL_DEDUPE_WINDOW`
    #[serde(default = "default_poll_dedupe_window")]
    pub dedupe_window: u64,

    /// Added to the rounded smoke baseline (default: 40)
    ///
    /// Environment variable: `FIREWATCH_POLL_THRESHOLD_MARGIN`
    #[serde(default = "default_poll_threshold_margin")]
    pub threshold_margin: f64,

    /// Maximum concurrent feed requests (default: 4)
    ///
    /// Environment variable: `FIREWATCH_POLL_FETCH_CONCURRENCY`
    #[serde(default = "default_poll_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

/// Device status reporting parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct StatusConfig {
    /// Samples fetched per device for the status view (default: 20)
    ///
    /// Environment variable: `FIREWATCH_STATUS_SAMPLE_LIMIT`
    #[serde(default = "default_status_sample_limit")]
    pub sample_limit: u32,

    /// A device whose newest sample is older than this is offline (default: 90)
    ///
    /// Environment variable: `FIREWATCH_STATUS_OFFLINE_THRESHOLD_SECONDS`
    #[serde(default = "default_status_offline_threshold_seconds")]
    pub offline_threshold_seconds: u64,
}

/// Telemetry API client parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TelemetryApiConfig {
    /// Environment variable: `FIREWATCH_TELEMETRY_API_BASE`
    #[serde(default = "default_telemetry_api_base")]
    pub api_base: String,

    /// Environment variable: `FIREWATCH_TELEMETRY_REQUEST_TIMEOUT_MS`
    #[serde(default = "default_telemetry_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Registry entry parsed from `FIREWATCH_DEVICES`.
///
/// Format: `id=channel_id:read_api_key[@location]`, comma separated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    pub channel_id: String,
    pub read_api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Propagation link parsed from `FIREWATCH_ALERT_MIRRORS` (`source=mirror`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorLink {
    pub source: String,
    pub mirror: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            poller: PollerConfig::default(),
            status: StatusConfig::default(),
            telemetry_api: TelemetryApiConfig::default(),
            devices: Vec::new(),
            alert_mirrors: Vec::new(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: default_poll_tick_interval_seconds(),
            sample_limit: default_poll_sample_limit(),
            dedupe_window: default_poll_dedupe_window(),
            threshold_margin: default_poll_threshold_margin(),
            fetch_concurrency: default_poll_fetch_concurrency(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            sample_limit: default_status_sample_limit(),
            offline_threshold_seconds: default_status_offline_threshold_seconds(),
        }
    }
}

impl Default for TelemetryApiConfig {
    fn default() -> Self {
        Self {
            api_base: default_telemetry_api_base(),
            request_timeout_ms: default_telemetry_request_timeout_ms(),
        }
    }
}

impl PollerConfig {
    /// Validate poller configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(10..=3600).contains(&self.tick_interval_seconds) {
            return Err(ConfigError::InvalidPollTickInterval {
                value: self.tick_interval_seconds,
            });
        }

        if !(1..=MAX_FEED_RESULTS).contains(&self.sample_limit) {
            return Err(ConfigError::InvalidSampleLimit {
                field: "POLL_SAMPLE_LIMIT",
                value: self.sample_limit,
            });
        }

        if self.dedupe_window == 0 || self.dedupe_window > 10_000 {
            return Err(ConfigError::InvalidDedupeWindow {
                value: self.dedupe_window,
            });
        }

        if !self.threshold_margin.is_finite() {
            return Err(ConfigError::InvalidThresholdMargin {
                value: self.threshold_margin,
            });
        }

        if !(1..=32).contains(&self.fetch_concurrency) {
            return Err(ConfigError::InvalidFetchConcurrency {
                value: self.fetch_concurrency,
            });
        }

        Ok(())
    }
}

impl StatusConfig {
    /// Validate status configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_FEED_RESULTS).contains(&self.sample_limit) {
            return Err(ConfigError::InvalidSampleLimit {
                field: "STATUS_SAMPLE_LIMIT",
                value: self.sample_limit,
            });
        }

        if self.offline_threshold_seconds == 0 {
            return Err(ConfigError::InvalidOfflineThreshold {
                value: self.offline_threshold_seconds,
            });
        }

        Ok(())
    }
}

impl TelemetryApiConfig {
    /// Validate the API base URL and request timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = Url::parse(&self.api_base).map_err(|e| ConfigError::InvalidTelemetryApiBase {
            value: self.api_base.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidTelemetryApiBase {
                value: self.api_base.clone(),
                reason: "scheme must be http or https".to_string(),
            });
        }

        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidTelemetryTimeout {
                value: self.request_timeout_ms,
            });
        }

        Ok(())
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Propagation map built from the configured mirror links.
    pub fn mirror_map(&self) -> MirrorMap {
        self.alert_mirrors
            .iter()
            .map(|link| (link.source.as_str(), link.mirror.as_str()))
            .collect()
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        for device in &mut config.devices {
            device.read_api_key = REDACTED.to_string();
        }
        config.database_url = redact_url_password(&config.database_url);
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.poller.validate()?;
        self.status.validate()?;
        self.telemetry_api.validate()?;

        let mut seen = std::collections::HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.id.as_str()) {
                return Err(ConfigError::DuplicateDevice {
                    id: device.id.clone(),
                });
            }
        }

        if self.db_max_connections == 0 {
            return Err(ConfigError::InvalidDbMaxConnections {
                value: self.db_max_connections,
            });
        }

        Ok(())
    }
}

/// Upper bound the feed API accepts for `results`.
const MAX_FEED_RESULTS: u32 = 8000;

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "sqlite://firewatch.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_poll_tick_interval_seconds() -> u64 {
    10
}

fn default_poll_sample_limit() -> u32 {
    5
}

fn default_poll_dedupe_window() -> u64 {
    DEFAULT_DEDUPE_WINDOW
}

fn default_poll_threshold_margin() -> f64 {
    DEFAULT_THRESHOLD_MARGIN
}

fn default_poll_fetch_concurrency() -> usize {
    4
}

fn default_status_sample_limit() -> u32 {
    20
}

fn default_status_offline_threshold_seconds() -> u64 {
    90
}

fn default_telemetry_api_base() -> String {
    "https://api.thingspeak.com".to_string()
}

fn default_telemetry_request_timeout_ms() -> u64 {
    10_000
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("database max connections must be positive, got {value}")]
    InvalidDbMaxConnections { value: u32 },
    #[error("poll tick interval must be between 10 and 3600 seconds, got {value}")]
    InvalidPollTickInterval { value: u64 },
    #[error("{field} must be between 1 and 8000, got {value}")]
    InvalidSampleLimit { field: &'static str, value: u32 },
    #[error("dedupe window must be between 1 and 10000, got {value}")]
    InvalidDedupeWindow { value: u64 },
    #[error("threshold margin must be a finite number, got {value}")]
    InvalidThresholdMargin { value: f64 },
    #[error("fetch concurrency must be between 1 and 32, got {value}")]
    InvalidFetchConcurrency { value: usize },
    #[error("offline threshold must be positive, got {value}")]
    InvalidOfflineThreshold { value: u64 },
    #[error("invalid telemetry API base '{value}': {reason}")]
    InvalidTelemetryApiBase { value: String, reason: String },
    #[error("telemetry request timeout must be positive, got {value}")]
    InvalidTelemetryTimeout { value: u64 },
    #[error("invalid device entry '{entry}': expected id=channel_id:read_api_key[@location]")]
    InvalidDeviceEntry { entry: String },
    #[error("device '{id}' is listed more than once")]
    DuplicateDevice { id: String },
    #[error("invalid alert mirror entry '{entry}': expected source=mirror with distinct ids")]
    InvalidMirrorEntry { entry: String },
}

/// Parses `FIREWATCH_DEVICES`.
pub fn parse_device_list(raw: &str) -> Result<Vec<DeviceConfig>, ConfigError> {
    split_list(raw).map(parse_device_entry).collect()
}

fn parse_device_entry(entry: &str) -> Result<DeviceConfig, ConfigError> {
    let invalid = || ConfigError::InvalidDeviceEntry {
        entry: entry.to_string(),
    };

    let (id, rest) = entry.split_once('=').ok_or_else(invalid)?;
    let (channel, location) = match rest.split_once('@') {
        Some((channel, location)) => (channel, Some(location.trim())),
        None => (rest, None),
    };
    let (channel_id, read_api_key) = channel.split_once(':').ok_or_else(invalid)?;

    let (id, channel_id, read_api_key) = (id.trim(), channel_id.trim(), read_api_key.trim());
    if id.is_empty() || channel_id.is_empty() || read_api_key.is_empty() {
        return Err(invalid());
    }

    Ok(DeviceConfig {
        id: id.to_string(),
        channel_id: channel_id.to_string(),
        read_api_key: read_api_key.to_string(),
        location: location.filter(|l| !l.is_empty()).map(str::to_string),
    })
}

/// Parses `FIREWATCH_ALERT_MIRRORS`.
pub fn parse_mirror_list(raw: &str) -> Result<Vec<MirrorLink>, ConfigError> {
    split_list(raw)
        .map(|entry| {
            let invalid = || ConfigError::InvalidMirrorEntry {
                entry: entry.to_string(),
            };
            let (source, mirror) = entry.split_once('=').ok_or_else(invalid)?;
            let (source, mirror) = (source.trim(), mirror.trim());
            if source.is_empty() || mirror.is_empty() || source == mirror {
                return Err(invalid());
            }
            Ok(MirrorLink {
                source: source.to_string(),
                mirror: mirror.to_string(),
            })
        })
        .collect()
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn redact_url_password(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some(REDACTED)).is_err() {
                return REDACTED.to_string();
            }
            url.to_string()
        }
        _ => raw.to_string(),
    }
}

/// Loads configuration using layered `.env` files and `FIREWATCH_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads `.env`, `.env.local`, `.env.{profile}`, `.env.{profile}.local`
    /// and then the process environment, later layers winning.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let api_bind_addr = layered
            .remove("API_BIND_ADDR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_api_bind_addr);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);
        let database_url = layered
            .remove("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_database_url);
        let db_max_connections = layered
            .remove("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = layered
            .remove("DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);

        let poller = PollerConfig {
            tick_interval_seconds: layered
                .remove("POLL_TICK_INTERVAL_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_poll_tick_interval_seconds),
            sample_limit: layered
                .remove("POLL_SAMPLE_LIMIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_poll_sample_limit),
            dedupe_window: layered
                .remove("POLL_DEDUPE_WINDOW")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_poll_dedupe_window),
            threshold_margin: layered
                .remove("POLL_THRESHOLD_MARGIN")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_poll_threshold_margin),
            fetch_concurrency: layered
                .remove("POLL_FETCH_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_poll_fetch_concurrency),
        };

        let status = StatusConfig {
            sample_limit: layered
                .remove("STATUS_SAMPLE_LIMIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_status_sample_limit),
            offline_threshold_seconds: layered
                .remove("STATUS_OFFLINE_THRESHOLD_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_status_offline_threshold_seconds),
        };

        let telemetry_api = TelemetryApiConfig {
            api_base: layered
                .remove("TELEMETRY_API_BASE")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_telemetry_api_base),
            request_timeout_ms: layered
                .remove("TELEMETRY_REQUEST_TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_telemetry_request_timeout_ms),
        };

        let devices = match layered.remove("DEVICES") {
            Some(raw) => parse_device_list(&raw)?,
            None => Vec::new(),
        };
        let alert_mirrors = match layered.remove("ALERT_MIRRORS") {
            Some(raw) => parse_mirror_list(&raw)?,
            None => Vec::new(),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            poller,
            status,
            telemetry_api,
            devices,
            alert_mirrors,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("FIREWATCH_PROFILE")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
