// libs/booking-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{delete, post},
    Router,
};

use crate::handlers;
use crate::services::flow::BookingFlow;

pub struct BookingState {
    pub flow: BookingFlow,
}

pub fn booking_routes(state: Arc<BookingState>) -> Router {
    Router::new()
        .route("/", post(handlers::create_booking))
        .route("/{attempt_id}/retry", post(handlers::retry_booking))
        .route("/{attempt_id}", delete(handlers::abandon_booking))
        .with_state(state)
}
