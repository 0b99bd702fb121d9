// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::session::SessionContext;

pub struct AppointmentState {
    pub session: Arc<SessionContext>,
    pub lifecycle: AppointmentLifecycleService,
}

pub fn appointment_routes(state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route("/", get(handlers::list_appointments))
        .route("/refresh", post(handlers::refresh_appointments))
        .route("/{appointment_id}/paid", post(handlers::mark_paid))
        .route("/{appointment_id}/complete", post(handlers::mark_completed))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/notes", post(handlers::add_note))
        .route("/{appointment_id}/invoice", post(handlers::generate_invoice))
        .with_state(state)
}
