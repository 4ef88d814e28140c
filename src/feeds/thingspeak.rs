//! ThingSpeak-compatible channel feed client.
//!
//! Reads `GET {base}/channels/{channel_id}/feeds.json?api_key=..&results=..`
//! and turns each feed entry into a [`Sample`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::source::{DeviceChannel, FeedError, Sample, TelemetrySource};
use crate::config::TelemetryApiConfig;

/// Smoke value used when a field is missing or not numeric.
pub const SMOKE_FALLBACK: f64 = 0.0;
/// Flame value used when a field is missing or not numeric (the sensor's "no fire" reading).
pub const FLAME_FALLBACK: f64 = 1.0;

#[derive(Debug, Deserialize)]
struct FeedsResponse {
    #[serde(default)]
    feeds: Vec<FeedEntry>,
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    entry_id: Option<Value>,
    #[serde(default)]
    field1: Option<Value>,
    #[serde(default)]
    field2: Option<Value>,
    #[serde(default)]
    field3: Option<Value>,
    #[serde(default)]
    field4: Option<Value>,
}

/// HTTP client for channel feeds.
#[derive(Debug, Clone)]
pub struct ThingSpeakClient {
    http_client: Client,
    api_base: Url,
}

impl ThingSpeakClient {
    pub fn new(api_base: &str, request_timeout: Duration) -> Result<Self, FeedError> {
        let api_base =
            Url::parse(api_base).map_err(|e| FeedError::InvalidUrl(format!("{api_base}: {e}")))?;
        if api_base.cannot_be_a_base() {
            return Err(FeedError::InvalidUrl(api_base.to_string()));
        }
        let http_client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http_client,
            api_base,
        })
    }

    pub fn from_config(config: &TelemetryApiConfig) -> Result<Self, FeedError> {
        Self::new(
            &config.api_base,
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    fn feeds_url(&self, channel: &DeviceChannel, limit: u32) -> Result<Url, FeedError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| FeedError::InvalidUrl(self.api_base.to_string()))?
            .pop_if_empty()
            .extend(["channels", channel.channel_id.as_str(), "feeds.json"]);
        url.query_pairs_mut()
            .append_pair("api_key", &channel.read_api_key)
            .append_pair("results", &limit.to_string());
        Ok(url)
    }
}

#[async_trait]
impl TelemetrySource for ThingSpeakClient {
    async fn fetch_recent_samples(
        &self,
        channel: &DeviceChannel,
        limit: u32,
    ) -> Result<Vec<Sample>, FeedError> {
        let url = self.feeds_url(channel, limit)?;
        debug!(
            device_id = %channel.device_id,
            channel_id = %channel.channel_id,
            limit,
            "fetching channel feed"
        );

        let resp = self.http_client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                channel_id: channel.channel_id.clone(),
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await?;
        decode_feed(&body)
    }
}

/// Decodes a feeds document into samples ordered oldest first.
///
/// Entries whose `created_at` cannot be parsed are dropped.
pub fn decode_feed(body: &[u8]) -> Result<Vec<Sample>, FeedError> {
    let parsed: FeedsResponse =
        serde_json::from_slice(body).map_err(|e| FeedError::Malformed(e.to_string()))?;

    let mut samples: Vec<Sample> = parsed
        .feeds
        .into_iter()
        .filter_map(|entry| {
            let Some(created_at) = entry.created_at.as_deref().and_then(parse_timestamp) else {
                warn!(
                    created_at = ?entry.created_at,
                    "dropping feed entry with unparseable timestamp"
                );
                return None;
            };
            Some(Sample {
                entry_id: entry.entry_id.as_ref().and_then(coerce_entry_id),
                created_at,
                smoke1: coerce_reading(entry.field1.as_ref()).unwrap_or(SMOKE_FALLBACK),
                smoke2: coerce_reading(entry.field2.as_ref()).unwrap_or(SMOKE_FALLBACK),
                flame1: coerce_reading(entry.field3.as_ref()).unwrap_or(FLAME_FALLBACK),
                flame2: coerce_reading(entry.field4.as_ref()).unwrap_or(FLAME_FALLBACK),
            })
        })
        .collect();

    samples.sort_by_key(|s| s.created_at);
    Ok(samples)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Numeric value of a feed field. Strings are trimmed and parsed; anything
/// else, including non-finite numbers, yields `None`.
fn coerce_reading(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn coerce_entry_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
