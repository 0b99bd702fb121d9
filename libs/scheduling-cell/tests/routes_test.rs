use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use scheduling_cell::{
    scheduling_routes, ConflictValidator, FixedClock, RefreshTrigger, SchedulingRules, SchedulingState,
    SnapshotRefresher,
};
use shared_database::collaborators::CatalogStore;
use shared_models::{AppointmentStatus, StoreError};
use shared_utils::test_utils::fixtures::{appointment, at, provider};
use shared_utils::test_utils::{InMemoryBackend, Operation};

async fn create_test_app(backend: Arc<InMemoryBackend>, now: &str) -> Router {
    let rules = SchedulingRules::default();
    let clock = Arc::new(FixedClock::new(at(now)));
    let snapshot = Arc::new(SnapshotRefresher::new(backend.clone(), Duration::from_secs(2)));
    snapshot.refresh(RefreshTrigger::Manual).await;
    let providers: HashMap<_, _> = backend
        .list_providers()
        .await
        .unwrap()
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    let validator = Arc::new(ConflictValidator::new(
        backend,
        rules,
        clock.clone(),
        Duration::from_millis(500),
    ));

    scheduling_routes(Arc::new(SchedulingState {
        rules,
        snapshot,
        validator,
        clock,
        providers: Arc::new(providers),
    }))
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_slots_lists_the_business_day() {
    let app = create_test_app(Arc::new(InMemoryBackend::new()), "2025-01-15 07:00").await;

    let request = Request::builder().uri("/slots").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let slots = body["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 25);
    assert_eq!(slots[0], "08:00");
    assert_eq!(slots[24], "20:00");
}

#[tokio::test]
async fn test_availability_excludes_booked_and_too_soon_slots() {
    let backend = Arc::new(InMemoryBackend::new().with_appointments(vec![appointment(
        1,
        7,
        "2025-01-15 16:00",
        AppointmentStatus::Pending,
    )]));
    let app = create_test_app(backend, "2025-01-15 14:10").await;

    let request = Request::builder()
        .uri("/availability?date=2025-01-15&provider_id=7")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let times: Vec<&str> = body["availability"]["times"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(times.first(), Some(&"15:00"));
    assert!(!times.contains(&"14:30"));
    assert!(!times.contains(&"16:00"));
    assert!(times.contains(&"16:30"));
}

#[tokio::test]
async fn test_availability_honours_provider_day_off() {
    let mut ana = provider(7, "Ana", &[1]);
    ana.days_off = vec!["jueves".to_string()];
    let backend = Arc::new(InMemoryBackend::new().with_catalog(vec![], vec![ana], vec![]));
    let app = create_test_app(backend, "2025-01-15 07:00").await;

    let day_off = Request::builder()
        .uri("/availability?date=2025-01-16&provider_id=7")
        .body(Body::empty())
        .unwrap();
    let body = body_json(app.clone().oneshot(day_off).await.unwrap()).await;
    assert_eq!(body["availability"]["status"], "fully_booked");

    let working_day = Request::builder()
        .uri("/availability?date=2025-01-17&provider_id=7")
        .body(Body::empty())
        .unwrap();
    let body = body_json(app.oneshot(working_day).await.unwrap()).await;
    assert_eq!(body["availability"]["times"].as_array().unwrap().len(), 25);
}

#[tokio::test]
async fn test_availability_without_date_reports_no_selection() {
    let app = create_test_app(Arc::new(InMemoryBackend::new()), "2025-01-15 07:00").await;

    let request = Request::builder().uri("/availability").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    let body = body_json(response).await;
    assert_eq!(body["availability"]["status"], "no_date_selected");
}

#[tokio::test]
async fn test_conflict_check_reports_taken_slot() {
    let backend = Arc::new(InMemoryBackend::new().with_appointments(vec![appointment(
        1,
        7,
        "2025-01-15 10:00",
        AppointmentStatus::Pending,
    )]));
    let app = create_test_app(backend, "2025-01-14 12:00").await;

    let request = Request::builder()
        .method("POST")
        .uri("/conflicts/check")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "provider_id": 7, "date": "2025-01-15", "time": "10:00:00" }).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["outcome"]["result"], "conflict");
    assert_eq!(body["outcome"]["appointment_id"], 1);
    assert_eq!(body["outcome"]["alternatives"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_conflict_check_degrades_when_backend_is_down() {
    let backend = Arc::new(InMemoryBackend::new());
    let app = create_test_app(backend.clone(), "2025-01-14 12:00").await;
    backend.fail_next(Operation::ListAppointments, StoreError::Network("timeout".into()));

    let request = Request::builder()
        .method("POST")
        .uri("/conflicts/check")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "provider_id": 7, "date": "2025-01-15", "time": "10:00:00" }).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["outcome"]["result"], "indeterminate");
}
