//! # Tests for Handlers
//!
//! Router-level tests against an in-memory SQLite database and a stub feed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use chrono::{TimeZone, Utc};
use sea_orm::{Database, DatabaseConnection};
use serde_json::Value;
use tower::ServiceExt;

use crate::alerting::{AlertBoard, TriggerKind};
use crate::config::{AppConfig, DeviceConfig};
use crate::feeds::{DeviceChannel, FeedError, Sample, TelemetrySource};
use crate::handlers::root;
use crate::migration::{Migrator, MigratorTrait};
use crate::repositories::{AlertRepository, AlertStore, DeviceRepository, NewAlert};
use crate::server::{AppState, create_app};
use crate::telemetry::TRACE_ID_HEADER;

struct StubSource {
    feeds: HashMap<String, Vec<Sample>>,
}

#[async_trait]
impl TelemetrySource for StubSource {
    async fn fetch_recent_samples(
        &self,
        channel: &DeviceChannel,
        _limit: u32,
    ) -> Result<Vec<Sample>, FeedError> {
        self.feeds
            .get(&channel.channel_id)
            .cloned()
            .ok_or(FeedError::Status {
                channel_id: channel.channel_id.clone(),
                status: 404,
            })
    }
}

fn sample(secs_ago: i64, smoke: f64, flame: f64) -> Sample {
    Sample {
        entry_id: Some(1),
        created_at: Utc::now() - chrono::Duration::seconds(secs_ago),
        smoke1: smoke,
        smoke2: smoke,
        flame1: flame,
        flame2: 1.0,
    }
}

async fn test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("connect sqlite");
    Migrator::up(&db, None).await.expect("migrate");
    db
}

async fn test_app(db: DatabaseConnection, board: AlertBoard, source: StubSource) -> Router {
    let state = AppState {
        config: Arc::new(AppConfig::default()),
        db,
        board,
        source: Arc::new(source),
    };
    create_app(state)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn empty_source() -> StubSource {
    StubSource {
        feeds: HashMap::new(),
    }
}

#[tokio::test]
async fn test_root_handler_returns_expected_service_info() {
    let axum::Json(info) = root().await;
    assert_eq!(info.service, "firewatch");
    assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_health_reports_database_ok() {
    let app = test_app(test_db().await, AlertBoard::new(), empty_source()).await;
    let (status, body) = get_json(app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
}

#[tokio::test]
async fn test_health_returns_503_when_database_is_closed() {
    let db = test_db().await;
    let app = test_app(db.clone(), AlertBoard::new(), empty_source()).await;
    db.close().await.unwrap();

    let (status, body) = get_json(app, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_alerts_served_from_board_newest_first() {
    let db = test_db().await;
    let store = AlertRepository::new(Arc::new(db.clone()));
    for (device, minute) in [("Device-01", 1), ("Device-02", 3), ("Device-03", 2)] {
        let at = Utc.with_ymd_and_hms(2025, 10, 1, 12, minute, 0).unwrap();
        let new_alert = NewAlert::from_sample(
            device,
            TriggerKind::SmokeSensor1,
            &Sample {
                entry_id: Some(minute as i64),
                created_at: at,
                smoke1: 120.0,
                smoke2: 10.0,
                flame1: 1.0,
                flame2: 1.0,
            },
            50.0,
        );
        store.insert_alert(new_alert).await.unwrap();
    }
    let board = AlertBoard::new();
    board.refresh(&store).await.unwrap();

    let app = test_app(db, board, empty_source()).await;
    let (status, body) = get_json(app.clone(), "/alerts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    let devices: Vec<&str> = body["alerts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["device_id"].as_str().unwrap())
        .collect();
    assert_eq!(devices, vec!["Device-02", "Device-03", "Device-01"]);
    assert!(body["refreshed_at"].is_string());

    let (status, body) = get_json(app, "/alerts?limit=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alerts"].as_array().unwrap().len(), 1);
    assert_eq!(body["total"], 3);
}

#[tokio::test]
async fn test_alerts_limit_out_of_range_is_rejected() {
    let app = test_app(test_db().await, AlertBoard::new(), empty_source()).await;

    for uri in ["/alerts?limit=0", "/alerts?limit=501"] {
        let (status, body) = get_json(app.clone(), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["code"], "VALIDATION_FAILED");
        assert!(body["details"]["limit"].is_string());
    }
}

#[tokio::test]
async fn test_alerts_non_numeric_limit_is_bad_request() {
    let app = test_app(test_db().await, AlertBoard::new(), empty_source()).await;
    let (status, _) = get_json(app, "/alerts?limit=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_device_status_marks_stale_and_failing_devices_offline() {
    let db = test_db().await;
    let devices = DeviceRepository::new(Arc::new(db.clone()));
    for (id, channel) in [("Device-01", "100"), ("Device-02", "200"), ("Device-03", "300")] {
        devices
            .upsert(&DeviceConfig {
                id: id.to_string(),
                channel_id: channel.to_string(),
                read_api_key: "KEY".to_string(),
                location: None,
            })
            .await
            .unwrap();
    }

    let mut feeds = HashMap::new();
    feeds.insert(
        "100".to_string(),
        vec![sample(300, 10.0, 1.0), sample(30, 12.0, 0.0)],
    );
    feeds.insert("200".to_string(), vec![sample(600, 10.0, 1.0)]);

    let app = test_app(db, AlertBoard::new(), StubSource { feeds }).await;
    let (status, body) = get_json(app, "/devices/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["offline_threshold_seconds"], 90);

    let list = body["devices"].as_array().unwrap();
    assert_eq!(list.len(), 3);
    assert_eq!(list[0]["device_id"], "Device-01");
    assert_eq!(list[0]["online"], true);
    assert_eq!(list[0]["latest"]["smoke1"], 12.0);
    assert_eq!(list[0]["latest"]["flame1_detected"], true);
    assert_eq!(list[0]["history"].as_array().unwrap().len(), 2);

    assert_eq!(list[1]["online"], false);
    assert!(list[1].get("feed_error").is_none());

    assert_eq!(list[2]["online"], false);
    assert!(list[2]["feed_error"].is_string());
    assert!(list[2]["latest"].is_null());
}

#[tokio::test]
async fn test_trace_id_header_is_echoed() {
    let app = test_app(test_db().await, AlertBoard::new(), empty_source()).await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/")
                .header(TRACE_ID_HEADER, "req-fixed")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(TRACE_ID_HEADER).unwrap(),
        "req-fixed"
    );
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let app = test_app(test_db().await, AlertBoard::new(), empty_source()).await;
    let (status, body) = get_json(app, "/openapi.json").await;

    assert_eq!(status, StatusCode::OK);
    for path in ["/", "/health", "/alerts", "/devices/status"] {
        assert!(body["paths"].get(path).is_some(), "missing {path}");
    }
}
