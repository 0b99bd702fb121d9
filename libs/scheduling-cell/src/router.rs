// libs/scheduling-cell/src/router.rs
use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use shared_models::{EntityId, Provider};

use crate::handlers;
use crate::models::SchedulingRules;
use crate::services::clock::Clock;
use crate::services::conflict::ConflictValidator;
use crate::services::snapshot::SnapshotRefresher;

/// Shared state behind the scheduling endpoints.
pub struct SchedulingState {
    pub rules: SchedulingRules,
    pub snapshot: Arc<SnapshotRefresher>,
    pub validator: Arc<ConflictValidator>,
    pub clock: Arc<dyn Clock>,
    /// Provider schedules by id, taken from the session catalog.
    pub providers: Arc<HashMap<EntityId, Provider>>,
}

pub fn scheduling_routes(state: Arc<SchedulingState>) -> Router {
    Router::new()
        .route("/slots", get(handlers::list_slots))
        .route("/availability", get(handlers::get_availability))
        .route("/conflicts/check", post(handlers::check_conflict))
        .with_state(state)
}
