// libs/scheduling-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use shared_models::{AppError, EntityId};

use crate::models::{hh_mm, ConflictOutcome, SlotCandidate};
use crate::router::SchedulingState;
use crate::services::availability::{parse_date, provider_slots, AvailabilityFilter};
use crate::services::slots::SlotSequence;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: Option<String>,
    pub provider_id: Option<EntityId>,
}

// ==============================================================================
// HANDLERS
// ==============================================================================

/// The business day's slot grid, independent of bookings.
pub async fn list_slots(State(state): State<Arc<SchedulingState>>) -> Json<Value> {
    let slots = SlotSequence::for_hours(state.rules.hours, state.rules.step_minutes);
    let times: Vec<String> = slots.iter().map(|t| hh_mm::format(&t)).collect();

    Json(json!({
        "open_hour": state.rules.hours.open_hour,
        "close_hour": state.rules.hours.close_hour,
        "step_minutes": state.rules.step_minutes,
        "slots": times,
    }))
}

/// Free slots for a date, optionally for one provider, against the current snapshot.
/// A provider's own working hours and days off narrow the grid first.
#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<Arc<SchedulingState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = SlotSequence::for_hours(state.rules.hours, state.rules.step_minutes);
    let filter = AvailabilityFilter::from_rules(&state.rules);
    let snapshot = state.snapshot.appointments();
    let raw_date = query.date.as_deref().unwrap_or_default();

    let provider = query.provider_id.and_then(|id| state.providers.get(&id));
    let day = match parse_date(raw_date) {
        Some(date) => provider_slots(&slots, provider, date),
        None => slots.to_vec(),
    };

    let availability = filter.filter_raw(
        day,
        raw_date,
        query.provider_id,
        &snapshot,
        state.clock.now(),
    );

    debug!("Availability query {:?} -> {} times", query, availability.times().len());

    Ok(Json(json!({
        "date": query.date,
        "provider_id": query.provider_id,
        "availability": availability,
    })))
}

/// Immediate conflict check against freshly fetched appointments.
#[axum::debug_handler]
pub async fn check_conflict(
    State(state): State<Arc<SchedulingState>>,
    Json(candidate): Json<SlotCandidate>,
) -> Result<Json<Value>, AppError> {
    let outcome = state.validator.check_now(&candidate).await;

    let message = match &outcome {
        ConflictOutcome::Available => "Slot is free",
        ConflictOutcome::Conflict { .. } => "Slot is already taken for this provider",
        ConflictOutcome::Indeterminate { .. } => "Could not verify the slot, booking may still proceed",
    };

    Ok(Json(json!({
        "candidate": candidate,
        "outcome": outcome,
        "message": message,
    })))
}
