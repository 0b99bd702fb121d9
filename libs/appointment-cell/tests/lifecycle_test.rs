use std::sync::Arc;

use assert_matches::assert_matches;

use appointment_cell::{
    AppointmentLifecycleService, LifecycleError, NotificationKind, PlainTextRenderer, SessionContext,
    SessionStores,
};
use scheduling_cell::FixedClock;
use shared_config::AppConfig;
use shared_models::{AppointmentStatus, StoreError};
use shared_utils::test_utils::fixtures::{appointment, at, provider, service};
use shared_utils::test_utils::{InMemoryBackend, Operation};

async fn setup(statuses: &[(i64, AppointmentStatus)]) -> (Arc<InMemoryBackend>, Arc<SessionContext>, AppointmentLifecycleService) {
    let appointments = statuses
        .iter()
        .map(|(id, status)| appointment(*id, 7, "2025-01-15 10:00", *status))
        .collect();
    let backend = Arc::new(
        InMemoryBackend::new()
            .with_catalog(vec![service(1, "Corte", 5000.0)], vec![provider(7, "Ana", &[1])], vec![])
            .with_appointments(appointments),
    );
    let session = SessionContext::init(
        AppConfig::default(),
        SessionStores::shared(backend.clone()),
        Arc::new(FixedClock::new(at("2025-01-15 11:00"))),
    )
    .await
    .unwrap();
    let lifecycle = AppointmentLifecycleService::new(session.clone(), Arc::new(PlainTextRenderer));
    (backend, session, lifecycle)
}

#[tokio::test]
async fn test_completing_a_pending_appointment_is_a_state_conflict() {
    let (backend, _session, lifecycle) = setup(&[(1, AppointmentStatus::Pending)]).await;

    let err = lifecycle.mark_completed(1).await.unwrap_err();

    assert_matches!(
        err,
        LifecycleError::StateConflict {
            from: AppointmentStatus::Pending,
            to: AppointmentStatus::Completed
        }
    );
    assert_eq!(backend.appointment(1).unwrap().status, AppointmentStatus::Pending);
    assert_eq!(backend.call_count(Operation::UpdateAppointment), 0);
}

#[tokio::test]
async fn test_full_lifecycle_with_invoice_gate() {
    let (backend, session, lifecycle) = setup(&[(1, AppointmentStatus::Pending)]).await;

    let paid = lifecycle.mark_paid(1).await.unwrap();
    assert_eq!(paid.status, AppointmentStatus::Paid);

    assert_matches!(lifecycle.mark_completed(1).await, Err(LifecycleError::InvoiceRequired(1)));

    let invoice = lifecycle.generate_invoice(1).await.unwrap();
    assert_eq!(invoice.number, "FAC-20250115-00001");
    assert!(String::from_utf8(invoice.bytes).unwrap().contains("Servicio: Corte"));

    let completed = lifecycle.mark_completed(1).await.unwrap();
    assert_eq!(completed.status, AppointmentStatus::Completed);
    assert_eq!(backend.appointment(1).unwrap().status, AppointmentStatus::Completed);

    let kinds: Vec<_> = session.notifications.recent().iter().map(|n| n.kind).collect();
    assert_eq!(
        kinds,
        vec![
            NotificationKind::AppointmentPaid,
            NotificationKind::InvoiceIssued,
            NotificationKind::AppointmentCompleted
        ]
    );
}

#[tokio::test]
async fn test_cancel_from_paid_and_never_twice() {
    let (_backend, session, lifecycle) = setup(&[(1, AppointmentStatus::Paid), (2, AppointmentStatus::Completed)]).await;

    assert_eq!(lifecycle.cancel(1).await.unwrap().status, AppointmentStatus::Cancelled);
    assert_eq!(
        session.snapshot.current().find(1).map(|a| a.status),
        Some(AppointmentStatus::Cancelled)
    );
    assert_matches!(lifecycle.cancel(1).await, Err(LifecycleError::StateConflict { .. }));
    assert_matches!(lifecycle.cancel(2).await, Err(LifecycleError::StateConflict { .. }));
}

#[tokio::test]
async fn test_notes_are_appended_even_on_terminal_appointments() {
    let (backend, _session, lifecycle) = setup(&[(1, AppointmentStatus::Completed)]).await;

    lifecycle.add_note(1, "cliente llego tarde").await.unwrap();
    let updated = lifecycle.add_note(1, "  pago en efectivo ").await.unwrap();

    let notes = updated.notes.unwrap();
    assert_eq!(notes.lines().count(), 2);
    assert!(notes.starts_with("[2025-01-15 11:00] cliente llego tarde"));
    assert!(notes.ends_with("pago en efectivo"));
    assert_eq!(backend.appointment(1).unwrap().status, AppointmentStatus::Completed);
    assert_matches!(lifecycle.add_note(1, "   ").await, Err(LifecycleError::EmptyNote));
}

#[tokio::test]
async fn test_pending_appointments_cannot_be_invoiced() {
    let (_backend, session, lifecycle) = setup(&[(1, AppointmentStatus::Pending)]).await;

    assert_matches!(
        lifecycle.generate_invoice(1).await,
        Err(LifecycleError::NotInvoiceable(AppointmentStatus::Pending))
    );
    assert!(!session.has_invoice(1));
}

#[tokio::test]
async fn test_unknown_appointment_is_not_found_in_the_backend() {
    let (backend, _session, lifecycle) = setup(&[]).await;

    assert_matches!(lifecycle.mark_paid(42).await, Err(LifecycleError::NotFound(42)));
    assert_matches!(lifecycle.add_note(42, "hola").await, Err(LifecycleError::NotFound(42)));
    assert_eq!(backend.call_count(Operation::GetAppointment), 2);
    assert_eq!(backend.call_count(Operation::UpdateAppointment), 0);
}

#[tokio::test]
async fn test_appointment_cancelled_elsewhere_cannot_be_marked_paid() {
    let (backend, session, lifecycle) = setup(&[(1, AppointmentStatus::Pending)]).await;
    backend.put_appointment(appointment(1, 7, "2025-01-15 10:00", AppointmentStatus::Cancelled));
    assert_eq!(
        session.snapshot.current().find(1).map(|a| a.status),
        Some(AppointmentStatus::Pending)
    );

    assert_matches!(
        lifecycle.mark_paid(1).await,
        Err(LifecycleError::StateConflict {
            from: AppointmentStatus::Cancelled,
            to: AppointmentStatus::Paid
        })
    );
    assert_eq!(backend.appointment(1).unwrap().status, AppointmentStatus::Cancelled);
    assert_eq!(backend.call_count(Operation::UpdateAppointment), 0);
    assert_eq!(
        session.snapshot.current().find(1).map(|a| a.status),
        Some(AppointmentStatus::Cancelled)
    );
}

#[tokio::test]
async fn test_appointment_paid_elsewhere_can_be_completed_after_invoicing() {
    let (backend, _session, lifecycle) = setup(&[(1, AppointmentStatus::Pending)]).await;
    backend.put_appointment(appointment(1, 7, "2025-01-15 10:00", AppointmentStatus::Paid));

    lifecycle.generate_invoice(1).await.unwrap();
    assert_eq!(lifecycle.mark_completed(1).await.unwrap().status, AppointmentStatus::Completed);
}

#[tokio::test]
async fn test_backend_rejection_surfaces_and_leaves_snapshot_alone() {
    let (backend, session, lifecycle) = setup(&[(1, AppointmentStatus::Pending)]).await;
    backend.fail_next(Operation::UpdateAppointment, StoreError::Unauthorized("rls".into()));

    assert_matches!(
        lifecycle.mark_paid(1).await,
        Err(LifecycleError::Store(StoreError::Unauthorized(_)))
    );
    assert!(!session.snapshot.current().is_provisional(1));
    assert!(session.notifications.recent().is_empty());
}
