//! # Alert Poller
//!
//! Background task running the alert ingestion cycle on a fixed interval:
//! read every registered device's recent telemetry, evaluate triggers,
//! suppress duplicates against a snapshot of recent alerts, propagate to
//! mirror devices, persist, and refresh the alert board.
//!
//! At most one cycle runs at a time. A tick that finds a cycle in flight is
//! skipped, never queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use metrics::{counter, histogram};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::alerting::{AlertBoard, DedupeWindow, MirrorMap, evaluate_batch};
use crate::config::PollerConfig;
use crate::error::RepositoryError;
use crate::feeds::{self, TelemetrySource};
use crate::repositories::{AlertStore, DeviceRegistry, InsertOutcome, NewAlert};
use crate::telemetry::{TraceContext, with_trace_context};

/// Errors that abandon a whole cycle.
#[derive(Debug, Error)]
pub enum PollerError {
    #[error("failed to list registered devices: {0}")]
    Registry(#[source] RepositoryError),
    #[error("failed to load recent alerts for deduplication: {0}")]
    Snapshot(#[source] RepositoryError),
    #[error("a poll cycle is already in flight")]
    CycleInFlight,
}

/// Counters describing one completed cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub devices_polled: u64,
    pub feed_failures: u64,
    pub empty_feeds: u64,
    pub samples_evaluated: u64,
    pub alerts_inserted: u64,
    /// Candidates already present in the dedupe window
    pub duplicates_suppressed: u64,
    /// Candidates the store rejected as already recorded
    pub duplicates_rejected: u64,
    pub write_failures: u64,
    /// Alerts on the board after the refresh, if the refresh succeeded
    pub board_size: Option<usize>,
}

/// Clears the in-flight flag when the cycle ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Alert ingestion service.
pub struct AlertPoller {
    config: PollerConfig,
    mirrors: MirrorMap,
    source: Arc<dyn TelemetrySource>,
    registry: Arc<dyn DeviceRegistry>,
    store: Arc<dyn AlertStore>,
    board: AlertBoard,
    in_flight: AtomicBool,
}

impl AlertPoller {
    pub fn new(
        config: PollerConfig,
        mirrors: MirrorMap,
        source: Arc<dyn TelemetrySource>,
        registry: Arc<dyn DeviceRegistry>,
        store: Arc<dyn AlertStore>,
        board: AlertBoard,
    ) -> Self {
        Self {
            config,
            mirrors,
            source,
            registry,
            store,
            board,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn board(&self) -> &AlertBoard {
        &self.board
    }

    pub fn is_cycle_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Loads the alert board before the first cycle.
    pub async fn init(&self) -> Result<usize, RepositoryError> {
        let loaded = self.board.refresh(self.store.as_ref()).await?;
        info!(alerts = loaded, "Alert board loaded");
        Ok(loaded)
    }

    /// Run the poll loop until the provided shutdown token fires.
    ///
    /// The first cycle starts immediately. On shutdown the in-flight cycle,
    /// if any, is awaited.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            tick_interval_seconds = self.config.tick_interval_seconds,
            "Starting alert poller"
        );
        for (source, mirrors) in self.mirrors.iter() {
            info!(source, ?mirrors, "Alert propagation link");
        }

        if let Err(err) = self.init().await {
            error!(error = %err, "Initial alert board load failed");
        }

        let mut ticker = interval(Duration::from_secs(self.config.tick_interval_seconds));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut current: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Alert poller shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    if self.is_cycle_in_flight() {
                        counter!("firewatch_poll_cycle_skipped_total").increment(1);
                        warn!("Previous poll cycle still running; skipping tick");
                        continue;
                    }
                    let poller = Arc::clone(&self);
                    current = Some(tokio::spawn(async move {
                        poller.run_logged_cycle().await;
                    }));
                }
            }
        }

        if let Some(handle) = current {
            if !handle.is_finished() {
                info!("Waiting for in-flight poll cycle to finish");
            }
            if let Err(err) = handle.await {
                error!(error = ?err, "Poll cycle task panicked or was cancelled");
            }
        }

        info!("Alert poller stopped");
    }

    async fn run_logged_cycle(&self) {
        match self.run_cycle().await {
            Ok(report) => log_report(&report),
            Err(PollerError::CycleInFlight) => {}
            Err(err) => error!(error = %err, "Poll cycle abandoned"),
        }
    }

    /// Runs one ingestion cycle within its own trace context.
    pub async fn run_cycle(&self) -> Result<CycleReport, PollerError> {
        let Some(_guard) = InFlightGuard::try_acquire(&self.in_flight) else {
            counter!("firewatch_poll_cycle_skipped_total").increment(1);
            warn!("Poll cycle requested while another is in flight");
            return Err(PollerError::CycleInFlight);
        };

        let context = TraceContext::generate("cycle");
        let span = info_span!("poll_cycle", trace_id = %context.trace_id);
        with_trace_context(context, self.execute_cycle().instrument(span)).await
    }

    async fn execute_cycle(&self) -> Result<CycleReport, PollerError> {
        let started = Instant::now();
        let mut report = CycleReport::default();

        let devices = self
            .registry
            .list_devices()
            .await
            .map_err(PollerError::Registry)?;

        let recent = self
            .store
            .recent_alert_keys(self.config.dedupe_window)
            .await
            .map_err(PollerError::Snapshot)?;
        let mut window = DedupeWindow::from_recent(recent);
        debug!(
            devices = devices.len(),
            window = window.len(),
            "Poll cycle started"
        );

        let fetched = feeds::fetch_concurrently(
            Arc::clone(&self.source),
            devices,
            self.config.sample_limit,
            self.config.fetch_concurrency,
        )
        .await;

        for (channel, outcome) in fetched {
            report.devices_polled += 1;

            let samples = match outcome {
                Ok(samples) => samples,
                Err(err) => {
                    report.feed_failures += 1;
                    counter!("firewatch_feed_failures_total", "kind" => err.kind()).increment(1);
                    warn!(device_id = %channel.device_id, error = %err, "Skipping device: feed unavailable");
                    continue;
                }
            };

            report.samples_evaluated += samples.len() as u64;
            let Some(evaluation) = evaluate_batch(&samples, self.config.threshold_margin) else {
                report.empty_feeds += 1;
                debug!(device_id = %channel.device_id, "Skipping device: no samples");
                continue;
            };

            for detection in &evaluation.detections {
                for trigger in &detection.triggers {
                    for target in self.mirrors.targets(&channel.device_id) {
                        let alert = NewAlert::from_sample(
                            target,
                            *trigger,
                            &detection.sample,
                            evaluation.threshold,
                        );
                        self.persist(alert, &mut window, &mut report).await;
                    }
                }
            }
        }

        match self.board.refresh(self.store.as_ref()).await {
            Ok(size) => report.board_size = Some(size),
            Err(err) => error!(error = %err, "Alert board refresh failed"),
        }

        counter!("firewatch_poll_cycles_total").increment(1);
        counter!("firewatch_alerts_inserted_total").increment(report.alerts_inserted);
        counter!("firewatch_alerts_duplicate_total")
            .increment(report.duplicates_suppressed + report.duplicates_rejected);
        counter!("firewatch_alert_write_failures_total").increment(report.write_failures);
        histogram!("firewatch_poll_cycle_duration_ms")
            .record(started.elapsed().as_secs_f64() * 1_000.0);

        Ok(report)
    }

    async fn persist(&self, alert: NewAlert, window: &mut DedupeWindow, report: &mut CycleReport) {
        let key = alert.key();
        if window.is_duplicate(&key) {
            report.duplicates_suppressed += 1;
            debug!(
                device_id = %key.device_id,
                trigger = %key.trigger,
                sampled_at = %key.sampled_at,
                "Duplicate alert suppressed"
            );
            return;
        }

        match self.store.insert_alert(alert).await {
            Ok(InsertOutcome::Inserted(id)) => {
                report.alerts_inserted += 1;
                info!(
                    alert_id = id,
                    device_id = %key.device_id,
                    trigger = %key.trigger,
                    sampled_at = %key.sampled_at,
                    "Alert recorded"
                );
                window.record(key);
            }
            Ok(InsertOutcome::Duplicate) => {
                report.duplicates_rejected += 1;
                window.record(key);
            }
            Err(err) => {
                report.write_failures += 1;
                error!(
                    device_id = %key.device_id,
                    trigger = %key.trigger,
                    sampled_at = %key.sampled_at,
                    error = %err,
                    "Failed to record alert"
                );
            }
        }
    }
}

fn log_report(report: &CycleReport) {
    info!(
        devices = report.devices_polled,
        feed_failures = report.feed_failures,
        empty_feeds = report.empty_feeds,
        samples = report.samples_evaluated,
        inserted = report.alerts_inserted,
        suppressed = report.duplicates_suppressed,
        rejected = report.duplicates_rejected,
        write_failures = report.write_failures,
        board_size = ?report.board_size,
        "Poll cycle completed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::{AlertKey, TriggerKind};
    use crate::feeds::{DeviceChannel, FeedError, Sample};
    use crate::models::alert;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Utc};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn sample(offset_secs: i64, smoke1: f64, smoke2: f64, flame1: f64, flame2: f64) -> Sample {
        Sample {
            entry_id: Some(100 + offset_secs),
            created_at: t0() + ChronoDuration::seconds(offset_secs),
            smoke1,
            smoke2,
            flame1,
            flame2,
        }
    }

    fn channel(id: &str) -> DeviceChannel {
        DeviceChannel {
            device_id: id.to_string(),
            channel_id: format!("ch-{id}"),
            read_api_key: "key".to_string(),
        }
    }

    #[derive(Default)]
    struct FakeSource {
        feeds: Mutex<HashMap<String, Result<Vec<Sample>, String>>>,
    }

    impl FakeSource {
        fn set(&self, device_id: &str, feed: Result<Vec<Sample>, String>) {
            self.feeds
                .lock()
                .unwrap()
                .insert(format!("ch-{device_id}"), feed);
        }
    }

    #[async_trait]
    impl TelemetrySource for FakeSource {
        async fn fetch_recent_samples(
            &self,
            channel: &DeviceChannel,
            _limit: u32,
        ) -> Result<Vec<Sample>, FeedError> {
            match self.feeds.lock().unwrap().get(&channel.channel_id) {
                Some(Ok(samples)) => Ok(samples.clone()),
                Some(Err(message)) => Err(FeedError::Malformed(message.clone())),
                None => Ok(Vec::new()),
            }
        }
    }

    struct FakeRegistry {
        devices: Vec<DeviceChannel>,
        fail: bool,
    }

    #[async_trait]
    impl DeviceRegistry for FakeRegistry {
        async fn list_devices(&self) -> Result<Vec<DeviceChannel>, RepositoryError> {
            if self.fail {
                return Err(RepositoryError::Database(sea_orm::DbErr::Custom(
                    "registry offline".to_string(),
                )));
            }
            Ok(self.devices.clone())
        }
    }

    /// In-memory alert log enforcing the same uniqueness as the real table.
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<alert::Model>>,
        failing_devices: Mutex<HashSet<String>>,
        fail_snapshot: bool,
    }

    impl MemoryStore {
        fn rows_for(&self, device_id: &str) -> Vec<alert::Model> {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.device_id == device_id)
                .cloned()
                .collect()
        }

        fn len(&self) -> usize {
            self.rows.lock().unwrap().len()
        }

        fn sorted(&self) -> Vec<alert::Model> {
            let mut rows = self.rows.lock().unwrap().clone();
            rows.sort_by(|a, b| b.sampled_at.cmp(&a.sampled_at).then(b.id.cmp(&a.id)));
            rows
        }
    }

    #[async_trait]
    impl AlertStore for MemoryStore {
        async fn recent_alert_keys(&self, limit: u64) -> Result<Vec<AlertKey>, RepositoryError> {
            if self.fail_snapshot {
                return Err(RepositoryError::Database(sea_orm::DbErr::Custom(
                    "snapshot failed".to_string(),
                )));
            }
            Ok(self
                .sorted()
                .into_iter()
                .take(limit as usize)
                .map(|r| {
                    AlertKey::new(
                        r.device_id,
                        r.trigger_type.parse().unwrap(),
                        r.sampled_at.with_timezone(&Utc),
                    )
                })
                .collect())
        }

        async fn insert_alert(&self, new_alert: NewAlert) -> Result<InsertOutcome, RepositoryError> {
            if self
                .failing_devices
                .lock()
                .unwrap()
                .contains(&new_alert.device_id)
            {
                return Err(RepositoryError::Database(sea_orm::DbErr::Custom(
                    "write failed".to_string(),
                )));
            }

            let mut rows = self.rows.lock().unwrap();
            let sampled_at = new_alert
                .sampled_at
                .with_timezone(&FixedOffset::east_opt(0).unwrap());
            let exists = rows.iter().any(|r| {
                r.device_id == new_alert.device_id
                    && r.trigger_type == new_alert.trigger.as_str()
                    && r.sampled_at == sampled_at
            });
            if exists {
                return Ok(InsertOutcome::Duplicate);
            }

            let id = rows.len() as i32 + 1;
            rows.push(alert::Model {
                id,
                entry_id: new_alert.entry_id,
                device_id: new_alert.device_id,
                trigger_type: new_alert.trigger.as_str().to_string(),
                smoke1: new_alert.smoke1,
                smoke2: new_alert.smoke2,
                flame1: new_alert.flame1,
                flame2: new_alert.flame2,
                threshold: new_alert.threshold,
                sampled_at,
                created_at: sampled_at,
            });
            Ok(InsertOutcome::Inserted(id))
        }

        async fn list_alerts(&self) -> Result<Vec<alert::Model>, RepositoryError> {
            Ok(self.sorted())
        }
    }

    struct Harness {
        source: Arc<FakeSource>,
        store: Arc<MemoryStore>,
        poller: AlertPoller,
    }

    fn harness(devices: &[&str], mirrors: &[(&str, &str)], config: PollerConfig) -> Harness {
        harness_with(devices, mirrors, config, MemoryStore::default(), false)
    }

    fn harness_with(
        devices: &[&str],
        mirrors: &[(&str, &str)],
        config: PollerConfig,
        store: MemoryStore,
        registry_fails: bool,
    ) -> Harness {
        let source = Arc::new(FakeSource::default());
        let store = Arc::new(store);
        let registry = Arc::new(FakeRegistry {
            devices: devices.iter().map(|id| channel(id)).collect(),
            fail: registry_fails,
        });
        let poller = AlertPoller::new(
            config,
            mirrors.iter().copied().collect(),
            source.clone(),
            registry,
            store.clone(),
            AlertBoard::new(),
        );
        Harness {
            source,
            store,
            poller,
        }
    }

    #[tokio::test]
    async fn smoke_above_threshold_is_recorded_once() {
        let h = harness(&["Device-02"], &[], PollerConfig::default());
        // threshold = round((50 + 50) / 2) + 40 = 90
        h.source.set(
            "Device-02",
            Ok(vec![
                sample(0, 50.0, 50.0, 1.0, 1.0),
                sample(15, 95.0, 10.0, 1.0, 1.0),
                sample(30, 90.0, 90.0, 1.0, 1.0),
            ]),
        );

        let report = h.poller.run_cycle().await.unwrap();

        assert_eq!(report.alerts_inserted, 1);
        let rows = h.store.rows_for("Device-02");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].trigger_type, "SmokeSensor1");
        assert_eq!(rows[0].threshold, 90.0);
        assert_eq!(rows[0].smoke1, 95.0);
    }

    #[tokio::test]
    async fn reprocessing_the_same_batch_writes_nothing() {
        let h = harness(&["Device-02"], &[], PollerConfig::default());
        h.source.set(
            "Device-02",
            Ok(vec![sample(0, 50.0, 50.0, 1.0, 1.0), sample(15, 10.0, 10.0, 0.0, 0.0)]),
        );

        let first = h.poller.run_cycle().await.unwrap();
        let second = h.poller.run_cycle().await.unwrap();

        assert_eq!(first.alerts_inserted, 2);
        assert_eq!(second.alerts_inserted, 0);
        assert_eq!(second.duplicates_suppressed, 2);
        assert_eq!(h.store.len(), 2);
    }

    #[tokio::test]
    async fn triggers_propagate_to_mirror_devices() {
        let h = harness(
            &["Device-01", "Device-03"],
            &[("Device-01", "Device-03")],
            PollerConfig::default(),
        );
        h.source.set(
            "Device-01",
            Ok(vec![sample(0, 20.0, 20.0, 1.0, 1.0), sample(10, 20.0, 20.0, 0.0, 1.0)]),
        );
        h.source.set("Device-03", Ok(vec![sample(0, 20.0, 20.0, 1.0, 1.0)]));

        let report = h.poller.run_cycle().await.unwrap();

        assert_eq!(report.alerts_inserted, 2);
        for device in ["Device-01", "Device-03"] {
            let rows = h.store.rows_for(device);
            assert_eq!(rows.len(), 1, "{device}");
            assert_eq!(rows[0].trigger_type, "FlameSensor1");
            assert_eq!(rows[0].sampled_at, (t0() + ChronoDuration::seconds(10)).fixed_offset());
        }
    }

    #[tokio::test]
    async fn mirror_records_are_deduplicated_independently() {
        let h = harness(
            &["Device-01", "Device-03"],
            &[("Device-01", "Device-03")],
            PollerConfig::default(),
        );
        let fire = vec![sample(0, 20.0, 20.0, 1.0, 1.0), sample(10, 20.0, 20.0, 0.0, 1.0)];
        // Device-03 reports the same fire itself at the same timestamp
        h.source.set("Device-01", Ok(fire.clone()));
        h.source.set("Device-03", Ok(fire));

        let report = h.poller.run_cycle().await.unwrap();

        assert_eq!(report.alerts_inserted, 2);
        assert_eq!(report.duplicates_suppressed, 1);
        assert_eq!(h.store.rows_for("Device-03").len(), 1);
    }

    #[tokio::test]
    async fn failing_device_does_not_block_others() {
        let h = harness(&["Device-01", "Device-02", "Device-03"], &[], PollerConfig::default());
        h.source.set("Device-01", Ok(vec![sample(0, 0.0, 0.0, 0.0, 1.0)]));
        h.source.set("Device-02", Err("garbage".to_string()));
        h.source.set("Device-03", Ok(vec![sample(0, 0.0, 0.0, 1.0, 0.0)]));

        let report = h.poller.run_cycle().await.unwrap();

        assert_eq!(report.devices_polled, 3);
        assert_eq!(report.feed_failures, 1);
        assert_eq!(report.alerts_inserted, 2);
        assert_eq!(h.store.rows_for("Device-02").len(), 0);
    }

    #[tokio::test]
    async fn empty_feed_is_skipped() {
        let h = harness(&["Device-01"], &[], PollerConfig::default());
        h.source.set("Device-01", Ok(Vec::new()));

        let report = h.poller.run_cycle().await.unwrap();

        assert_eq!(report.empty_feeds, 1);
        assert_eq!(report.alerts_inserted, 0);
    }

    #[tokio::test]
    async fn write_failure_is_isolated_and_retried_next_cycle() {
        let store = MemoryStore::default();
        store
            .failing_devices
            .lock()
            .unwrap()
            .insert("Device-01".to_string());
        let h = harness_with(
            &["Device-01", "Device-02"],
            &[],
            PollerConfig::default(),
            store,
            false,
        );
        h.source.set("Device-01", Ok(vec![sample(0, 0.0, 0.0, 0.0, 1.0)]));
        h.source.set("Device-02", Ok(vec![sample(0, 0.0, 0.0, 0.0, 1.0)]));

        let report = h.poller.run_cycle().await.unwrap();
        assert_eq!(report.write_failures, 1);
        assert_eq!(report.alerts_inserted, 1);
        assert_eq!(h.store.rows_for("Device-02").len(), 1);

        h.store.failing_devices.lock().unwrap().clear();
        let retry = h.poller.run_cycle().await.unwrap();
        assert_eq!(retry.alerts_inserted, 1);
        assert_eq!(h.store.rows_for("Device-01").len(), 1);
    }

    #[tokio::test]
    async fn store_rejects_duplicates_outside_the_window() {
        let config = PollerConfig {
            dedupe_window: 1,
            ..PollerConfig::default()
        };
        let h = harness(&["Device-01"], &[], config);
        h.source.set(
            "Device-01",
            Ok(vec![sample(0, 0.0, 0.0, 0.0, 1.0), sample(10, 0.0, 0.0, 0.0, 1.0)]),
        );

        h.poller.run_cycle().await.unwrap();
        let second = h.poller.run_cycle().await.unwrap();

        assert_eq!(second.alerts_inserted, 0);
        assert_eq!(second.duplicates_suppressed, 1);
        assert_eq!(second.duplicates_rejected, 1);
        assert_eq!(h.store.len(), 2);
    }

    #[tokio::test]
    async fn registry_failure_abandons_the_cycle() {
        let h = harness_with(&["Device-01"], &[], PollerConfig::default(), MemoryStore::default(), true);

        let err = h.poller.run_cycle().await.unwrap_err();

        assert!(matches!(err, PollerError::Registry(_)));
        assert!(!h.poller.is_cycle_in_flight());
    }

    #[tokio::test]
    async fn snapshot_failure_abandons_the_cycle_before_writes() {
        let store = MemoryStore {
            fail_snapshot: true,
            ..MemoryStore::default()
        };
        let h = harness_with(&["Device-01"], &[], PollerConfig::default(), store, false);
        h.source.set("Device-01", Ok(vec![sample(0, 0.0, 0.0, 0.0, 0.0)]));

        let err = h.poller.run_cycle().await.unwrap_err();

        assert!(matches!(err, PollerError::Snapshot(_)));
        assert_eq!(h.store.len(), 0);
    }

    #[tokio::test]
    async fn board_is_refreshed_after_cycle() {
        let h = harness(&["Device-01"], &[], PollerConfig::default());
        h.source.set(
            "Device-01",
            Ok(vec![sample(0, 50.0, 50.0, 1.0, 1.0), sample(10, 200.0, 200.0, 0.0, 0.0)]),
        );

        let report = h.poller.run_cycle().await.unwrap();

        // Four triggers share one timestamp and collapse to one board entry
        assert_eq!(report.alerts_inserted, 4);
        assert_eq!(report.board_size, Some(1));
        let snapshot = h.poller.board().snapshot().await;
        assert_eq!(snapshot.alerts.len(), 1);
        assert!(snapshot.refreshed_at.is_some());
    }

    /// Holds every fetch until released.
    struct BlockingSource {
        entered: Notify,
        release: Notify,
        calls: AtomicUsize,
    }

    impl BlockingSource {
        fn new() -> Self {
            Self {
                entered: Notify::new(),
                release: Notify::new(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TelemetrySource for BlockingSource {
        async fn fetch_recent_samples(
            &self,
            _channel: &DeviceChannel,
            _limit: u32,
        ) -> Result<Vec<Sample>, FeedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn overlapping_cycle_is_rejected() {
        let source = Arc::new(BlockingSource::new());
        let poller = Arc::new(AlertPoller::new(
            PollerConfig::default(),
            MirrorMap::new(),
            source.clone(),
            Arc::new(FakeRegistry {
                devices: vec![channel("Device-01")],
                fail: false,
            }),
            Arc::new(MemoryStore::default()),
            AlertBoard::new(),
        ));

        let running = tokio::spawn({
            let poller = poller.clone();
            async move { poller.run_cycle().await }
        });
        source.entered.notified().await;

        assert!(poller.is_cycle_in_flight());
        assert!(matches!(
            poller.run_cycle().await,
            Err(PollerError::CycleInFlight)
        ));

        source.release.notify_one();
        let report = running.await.unwrap().unwrap();
        assert_eq!(report.devices_polled, 1);
        assert!(!poller.is_cycle_in_flight());
    }

    #[tokio::test]
    async fn run_loop_polls_immediately_and_stops_on_shutdown() {
        let h = harness(&["Device-01"], &[], PollerConfig::default());
        h.source.set("Device-01", Ok(vec![sample(0, 0.0, 0.0, 0.0, 1.0)]));
        let store = h.store.clone();
        let poller = Arc::new(h.poller);
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(poller.clone().run(shutdown.clone()));

        let deadline = Instant::now() + Duration::from_secs(5);
        while store.len() == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();
        task.await.unwrap();

        assert_eq!(store.len(), 1);
        let rows = store.rows_for("Device-01");
        assert_eq!(rows[0].trigger_type, TriggerKind::FlameSensor1.as_str());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_during_in_flight_cycle_is_skipped() {
        let source = Arc::new(BlockingSource::new());
        let poller = Arc::new(AlertPoller::new(
            PollerConfig::default(),
            MirrorMap::new(),
            source.clone(),
            Arc::new(FakeRegistry {
                devices: vec![channel("Device-01")],
                fail: false,
            }),
            Arc::new(MemoryStore::default()),
            AlertBoard::new(),
        ));
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(poller.clone().run(shutdown.clone()));

        // First tick fires immediately and blocks in the fetch
        source.entered.notified().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // Ticks at 10s and 20s land while the cycle is still running
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(poller.is_cycle_in_flight());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // Once released, the loop keeps ticking and starts a fresh cycle
        source.release.notify_one();
        source.entered.notified().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        source.release.notify_one();
        shutdown.cancel();
        task.await.unwrap();
        assert!(!poller.is_cycle_in_flight());
    }
}
