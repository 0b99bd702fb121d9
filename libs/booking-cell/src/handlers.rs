// libs/booking-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use scheduling_cell::hh_mm;
use shared_models::AppError;

use crate::models::{BookingError, BookingForm, PaymentMethod, SubmitOutcome};
use crate::router::BookingState;
use crate::services::wizard::BookingWizard;

// ==============================================================================
// REQUEST STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    #[serde(flatten)]
    pub form: BookingForm,
    pub method: PaymentMethod,
}

// ==============================================================================
// HANDLERS
// ==============================================================================

fn outcome_response(outcome: SubmitOutcome) -> (StatusCode, Json<Value>) {
    match outcome {
        SubmitOutcome::Confirmed { .. } => (
            StatusCode::CREATED,
            Json(json!({ "success": true, "booking": outcome })),
        ),
        SubmitOutcome::PaymentFailed { .. } => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "success": false,
                "booking": outcome,
                "message": "The booking could not be completed. You can retry it."
            })),
        ),
    }
}

/// Validate the form, re-check the slot and run payment confirmation.
#[axum::debug_handler]
pub async fn create_booking(
    State(state): State<Arc<BookingState>>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let mut wizard = BookingWizard::from_form(state.flow.session().clone(), request.form);
    let notices = wizard.notices().to_vec();

    match state.flow.submit(&mut wizard, request.method).await {
        Ok(outcome) => {
            let (status, Json(mut body)) = outcome_response(outcome);
            body["notices"] = json!(notices);
            Ok((status, Json(body)))
        }
        Err(BookingError::Validation(fields)) => Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "Some fields need attention", "fields": fields })),
        )),
        Err(BookingError::SlotTaken {
            appointment_id,
            alternatives,
        }) => Ok((
            StatusCode::CONFLICT,
            Json(json!({
                "error": "The selected time was just taken",
                "appointment_id": appointment_id,
                "alternatives": alternatives.iter().map(hh_mm::format).collect::<Vec<_>>(),
            })),
        )),
        Err(other) => Err(other.into()),
    }
}

#[axum::debug_handler]
pub async fn retry_booking(
    State(state): State<Arc<BookingState>>,
    Path(attempt_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let outcome = state.flow.retry(attempt_id).await?;
    Ok(outcome_response(outcome))
}

/// Close a failed attempt for good. Any appointment it left pending is reported back.
#[axum::debug_handler]
pub async fn abandon_booking(
    State(state): State<Arc<BookingState>>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let abandoned = state.flow.abandon(attempt_id).await?;

    let message = match &abandoned {
        Some(report) => format!(
            "Appointment #{} remains pending without payment",
            report.appointment_id
        ),
        None => "Nothing was committed for this attempt".to_string(),
    };

    Ok(Json(json!({
        "closed": true,
        "abandoned": abandoned,
        "message": message,
    })))
}
