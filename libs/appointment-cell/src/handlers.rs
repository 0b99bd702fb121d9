// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

use scheduling_cell::RefreshOutcome;
use shared_models::{AppError, Appointment, EntityId};

use crate::models::{AddNoteRequest, AppointmentListQuery, AppointmentView, RefreshQuery};
use crate::router::AppointmentState;

// ==============================================================================
// LISTING
// ==============================================================================

/// Current snapshot, optionally filtered, soonest first.
pub async fn list_appointments(
    State(state): State<Arc<AppointmentState>>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    let snapshot = state.session.snapshot.current();

    let mut appointments: Vec<AppointmentView> = snapshot
        .appointments
        .iter()
        .filter(|apt| apt.deleted_at.is_none() && query.matches(apt))
        .map(|apt| AppointmentView {
            appointment: apt.clone(),
            provisional: snapshot.is_provisional(apt.id),
        })
        .collect();
    appointments.sort_by_key(|view| view.appointment.scheduled_at);

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len(),
        "fetched_at": snapshot.fetched_at,
        "stale": snapshot.last_error.is_some(),
    })))
}

#[axum::debug_handler]
pub async fn refresh_appointments(
    State(state): State<Arc<AppointmentState>>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<Value>, AppError> {
    match state.session.snapshot.refresh(query.reason.trigger()).await {
        RefreshOutcome::Refreshed { count } => Ok(Json(json!({ "refreshed": true, "count": count }))),
        RefreshOutcome::SkippedInFlight => {
            Ok(Json(json!({ "refreshed": false, "message": "A refresh is already running" })))
        }
        RefreshOutcome::SkippedThrottled => {
            Ok(Json(json!({ "refreshed": false, "message": "Appointments were refreshed moments ago" })))
        }
        RefreshOutcome::Failed(e) => Err(e.into()),
    }
}

// ==============================================================================
// LIFECYCLE TRANSITIONS
// ==============================================================================

fn transition_response(appointment: Appointment, message: &str) -> Json<Value> {
    Json(json!({
        "success": true,
        "appointment": appointment,
        "message": message,
    }))
}

#[axum::debug_handler]
pub async fn mark_paid(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<EntityId>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.lifecycle.mark_paid(appointment_id).await?;
    Ok(transition_response(appointment, "Appointment marked as paid"))
}

#[axum::debug_handler]
pub async fn mark_completed(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<EntityId>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.lifecycle.mark_completed(appointment_id).await?;
    Ok(transition_response(appointment, "Appointment completed"))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<EntityId>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.lifecycle.cancel(appointment_id).await?;
    Ok(transition_response(appointment, "Appointment cancelled"))
}

#[axum::debug_handler]
pub async fn add_note(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<EntityId>,
    Json(request): Json<AddNoteRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.lifecycle.add_note(appointment_id, &request.note).await?;
    Ok(transition_response(appointment, "Note added"))
}

// ==============================================================================
// INVOICING
// ==============================================================================

#[axum::debug_handler]
pub async fn generate_invoice(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<EntityId>,
) -> Result<Json<Value>, AppError> {
    let document = state.lifecycle.generate_invoice(appointment_id).await?;
    let encoded = STANDARD.encode(&document.bytes);

    Ok(Json(json!({
        "invoice": document,
        "document_base64": encoded,
    })))
}
