#![allow(dead_code)]

use std::sync::Arc;

use appointment_cell::{SessionContext, SessionStores};
use booking_cell::{BookingForm, BookingWizard};
use scheduling_cell::FixedClock;
use shared_config::AppConfig;
use shared_models::{Appointment, Service};
use shared_utils::test_utils::fixtures::{at, link, provider, service};
use shared_utils::test_utils::InMemoryBackend;

pub const NOW: &str = "2025-01-15 09:00";

/// Corte (1) by Ana (7) and Luis (8); Barba (2) by Luis only; Tintura (3) by nobody;
/// Consulta (4) is free of charge.
pub fn backend(appointments: Vec<Appointment>) -> Arc<InMemoryBackend> {
    let free: Service = service(4, "Consulta", 0.0);
    Arc::new(
        InMemoryBackend::new()
            .with_catalog(
                vec![
                    service(1, "Corte", 5000.0),
                    service(2, "Barba", 3000.0),
                    service(3, "Tintura", 9000.0),
                    free,
                ],
                vec![provider(7, "Ana", &[4]), provider(8, "Luis", &[2])],
                vec![link(10, 7, 1), link(11, 8, 1)],
            )
            .with_appointments(appointments),
    )
}

pub async fn session(backend: &Arc<InMemoryBackend>) -> Arc<SessionContext> {
    SessionContext::init(
        AppConfig::default(),
        SessionStores::shared(backend.clone()),
        Arc::new(FixedClock::new(at(NOW))),
    )
    .await
    .unwrap()
}

pub fn form(service_id: i64, provider_id: Option<i64>, date: &str, time: &str) -> BookingForm {
    BookingForm {
        service_id: Some(service_id),
        provider_id,
        date: date.to_string(),
        time: time.to_string(),
        name: "Ana Perez".to_string(),
        email: "ana@example.com".to_string(),
        phone: "+54 11 4555 1234".to_string(),
        notes: None,
    }
}

pub fn wizard(session: &Arc<SessionContext>, form: BookingForm) -> BookingWizard {
    BookingWizard::from_form(session.clone(), form)
}
