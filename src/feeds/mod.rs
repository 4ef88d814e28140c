//! Telemetry feeds
//!
//! The `TelemetrySource` trait the ingestion cycle reads samples through, the
//! ThingSpeak-compatible HTTP client implementing it, and a bounded
//! concurrent fan-out over many channels.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::error;

pub mod source;
pub mod thingspeak;

pub use source::{DeviceChannel, FeedError, Sample, TelemetrySource};
pub use thingspeak::ThingSpeakClient;

/// Outcome of fetching one channel.
pub type ChannelFetch = (DeviceChannel, Result<Vec<Sample>, FeedError>);

/// Fetches `limit` samples from every channel, at most `concurrency` at a
/// time. Results are returned in input order.
pub async fn fetch_concurrently(
    source: Arc<dyn TelemetrySource>,
    channels: Vec<DeviceChannel>,
    limit: u32,
    concurrency: usize,
) -> Vec<ChannelFetch> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(channels.len());

    for channel in channels {
        let semaphore = semaphore.clone();
        let source = source.clone();
        let task_channel = channel.clone();

        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire().await.ok();
            source.fetch_recent_samples(&task_channel, limit).await
        });

        handles.push((channel, handle));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (channel, handle) in handles {
        let outcome = match handle.await {
            Ok(result) => result,
            Err(err) => {
                error!(device_id = %channel.device_id, error = ?err, "Feed task panicked or was cancelled");
                Err(FeedError::Task(err.to_string()))
            }
        };
        results.push((channel, outcome));
    }
    results
}
