//! Concurrent visit integration tests
//!
//! Many simultaneous requests from one visitor must produce exactly one
//! counted visit, whatever the backend.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use footfall::api::{self, handlers::AppState};
use footfall::auth::OriginVerifier;
use footfall::config::{CorsConfig, HeaderNames};
use footfall::fingerprint::FingerprintGenerator;
use footfall::storage::{CounterStore, MemoryStorage, SqliteStorage, Stores};
use footfall::visits::VisitRecorder;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const SECRET: &str = "abc123";

fn create_test_app(stores: Stores) -> Router {
    let recorder = Arc::new(VisitRecorder::new(
        stores.dedup,
        stores.counters,
        FingerprintGenerator::default(),
        Duration::from_secs(1800),
    ));

    api::create_api_router(
        AppState {
            recorder,
            headers: HeaderNames::default(),
        },
        Arc::new(OriginVerifier::new("x-origin-verify", SECRET)),
        &CorsConfig {
            allowed_origin: None,
        },
    )
}

fn visit_request(address: &str) -> Request<Body> {
    Request::builder()
        .uri("/api/visit")
        .header("x-origin-verify", SECRET)
        .header("cloudfront-viewer-address", address)
        .header("user-agent", "Mozilla/5.0")
        .header("cloudfront-viewer-country", "US")
        .body(Body::empty())
        .unwrap()
}

/// Fire `n` simultaneous requests and return how many were counted
async fn fire_concurrently(app: &Router, addresses: Vec<String>) -> usize {
    let mut handles = vec![];

    for address in addresses {
        let app_clone = app.clone();
        let handle = tokio::spawn(async move {
            let response = app_clone.oneshot(visit_request(&address)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            body["status"] == "counted"
        });
        handles.push(handle);
    }

    let mut counted = 0;
    for (i, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(true) => counted += 1,
            Ok(false) => {}
            Err(e) => panic!("Request {} failed: {:?}", i, e),
        }
    }
    counted
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_identical_visits_count_once_memory() {
    // Scenario E
    let storage = Arc::new(MemoryStorage::new());
    let app = create_test_app(Stores::from_backend(storage.clone()));

    let counted = fire_concurrently(&app, vec!["1.2.3.4".to_string(); 100]).await;

    assert_eq!(counted, 1, "Exactly one request should be counted");
    let totals = storage.get_totals().await.unwrap();
    assert_eq!(totals.total, 1);
    assert_eq!(totals.by_country.get("US"), Some(&1));
    assert_eq!(totals.by_device.desktop, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_identical_visits_count_once_sqlite() {
    // SQLite serializes writers; a single connection keeps the shared
    // in-memory database free of table-lock contention
    let storage = Arc::new(SqliteStorage::new("sqlite::memory:", 1).await.unwrap());
    storage.init().await.unwrap();
    let app = create_test_app(Stores::from_backend(storage.clone()));

    let counted = fire_concurrently(&app, vec!["1.2.3.4".to_string(); 100]).await;

    assert_eq!(counted, 1, "Exactly one request should be counted");
    let totals = storage.get_totals().await.unwrap();
    assert_eq!(totals.total, 1);
    assert_eq!(totals.by_country.get("US"), Some(&1));
    assert_eq!(totals.by_device.desktop, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_identical_visits_count_once_sqlite_file_pool() {
    // Separate connections race on the same fingerprint row
    let path = std::env::temp_dir().join(format!(
        "footfall_concurrent_{}_{}.db",
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    let url = format!("sqlite://{}", path.display());

    let storage = Arc::new(SqliteStorage::new(&url, 8).await.unwrap());
    storage.init().await.unwrap();
    let app = create_test_app(Stores::from_backend(storage.clone()));

    let counted = fire_concurrently(&app, vec!["1.2.3.4".to_string(); 100]).await;

    assert_eq!(counted, 1, "Exactly one request should be counted");
    let totals = storage.get_totals().await.unwrap();
    assert_eq!(totals.total, 1);
    assert_eq!(totals.by_country.get("US"), Some(&1));
    assert_eq!(totals.by_device.desktop, 1);

    drop(app);
    drop(storage);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_distinct_visits_all_count() {
    let storage = Arc::new(MemoryStorage::new());
    let app = create_test_app(Stores::from_backend(storage.clone()));

    let addresses = (0..50).map(|i| format!("198.51.100.{}", i)).collect();
    let counted = fire_concurrently(&app, addresses).await;

    assert_eq!(counted, 50);
    let totals = storage.get_totals().await.unwrap();
    assert_eq!(totals.total, 50);
    assert_eq!(totals.by_country.get("US"), Some(&50));
    assert_eq!(totals.by_device.desktop, 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_mixed_visitors_count_once_each() {
    let storage = Arc::new(MemoryStorage::new());
    let app = create_test_app(Stores::from_backend(storage.clone()));

    // Ten visitors, each sending ten simultaneous requests
    let addresses = (0..100).map(|i| format!("203.0.113.{}", i % 10)).collect();
    let counted = fire_concurrently(&app, addresses).await;

    assert_eq!(counted, 10);
    assert_eq!(storage.get_totals().await.unwrap().total, 10);
}
