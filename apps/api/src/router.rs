use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use appointment_cell::{appointment_routes, AppointmentLifecycleService, AppointmentState, PlainTextRenderer, SessionContext};
use booking_cell::{booking_routes, BookingFlow, BookingState};
use scheduling_cell::scheduling_routes;

pub fn booking_state(session: &Arc<SessionContext>) -> Arc<BookingState> {
    Arc::new(BookingState {
        flow: BookingFlow::new(session.clone()),
    })
}

pub fn create_router(session: Arc<SessionContext>, bookings: Arc<BookingState>) -> Router {
    let appointments = Arc::new(AppointmentState {
        session: session.clone(),
        lifecycle: AppointmentLifecycleService::new(session.clone(), Arc::new(PlainTextRenderer)),
    });
    let catalog_session = session.clone();

    Router::new()
        .route("/", get(|| async { "Walk-in booking API is running!" }))
        .route(
            "/services",
            get(move || {
                let session = catalog_session.clone();
                async move { Json(catalog(&session)) }
            }),
        )
        .nest("/scheduling", scheduling_routes(session.scheduling_state()))
        .nest("/bookings", booking_routes(bookings))
        .nest("/appointments", appointment_routes(appointments))
}

/// Bookable services, each with the providers that offer it.
fn catalog(session: &SessionContext) -> Value {
    let services: Vec<Value> = session
        .catalog
        .bookable_services()
        .into_iter()
        .map(|service| {
            json!({
                "service": service,
                "providers": session.catalog.eligible_providers(service.id),
            })
        })
        .collect();
    json!({ "services": services })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::{Request, StatusCode}};
    use scheduling_cell::FixedClock;
    use shared_config::AppConfig;
    use shared_utils::test_utils::fixtures::{at, link, provider, service};
    use shared_utils::test_utils::InMemoryBackend;
    use appointment_cell::SessionStores;
    use tower::ServiceExt;

    async fn create_test_app() -> Router {
        let backend = Arc::new(
            InMemoryBackend::new().with_catalog(
                vec![service(1, "Corte", 5000.0)],
                vec![provider(7, "Ana", &[]), provider(8, "Luis", &[])],
                vec![link(10, 8, 1)],
            ),
        );
        let session = SessionContext::init(
            AppConfig::default(),
            SessionStores::shared(backend),
            Arc::new(FixedClock::new(at("2025-01-15 09:00"))),
        )
        .await
        .unwrap();
        let bookings = booking_state(&session);
        create_router(session, bookings)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_catalog_lists_eligible_providers() {
        let (status, body) = get_json(create_test_app().await, "/services").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["services"][0]["service"]["id"], 1);
        let providers = body["services"][0]["providers"].as_array().unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0]["id"], 8);
    }

    #[tokio::test]
    async fn test_cells_are_mounted() {
        let app = create_test_app().await;

        let (status, body) = get_json(app.clone(), "/scheduling/slots").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["slots"][0], "08:00");

        let (status, body) = get_json(app, "/appointments").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);
    }
}
