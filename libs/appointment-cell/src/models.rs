// libs/appointment-cell/src/models.rs
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use scheduling_cell::RefreshTrigger;
use shared_models::{AppError, Appointment, AppointmentStatus, EntityId, StoreError};

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AddNoteRequest {
    pub note: String,
}

/// Why the staff view asks for a reload. A view regaining focus is throttled like the timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshReason {
    #[default]
    Manual,
    Visibility,
}

impl RefreshReason {
    pub fn trigger(self) -> RefreshTrigger {
        match self {
            RefreshReason::Manual => RefreshTrigger::Manual,
            RefreshReason::Visibility => RefreshTrigger::Visibility,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub reason: RefreshReason,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentListQuery {
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
    pub provider_id: Option<EntityId>,
}

impl AppointmentListQuery {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.status.map_or(true, |s| appointment.status == s)
            && self.date.map_or(true, |d| appointment.date() == d)
            && self.provider_id.map_or(true, |p| appointment.provider_id() == Some(p))
    }
}

// ==============================================================================
// RESPONSE MODELS
// ==============================================================================

/// Staff-facing row: the appointment plus whether it carries an unconfirmed local patch.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub provisional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceLine {
    pub label: String,
    pub value: String,
}

/// A rendered invoice. `bytes` is whatever the renderer produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceDocument {
    pub number: String,
    pub appointment_id: EntityId,
    pub issued_at: NaiveDateTime,
    pub lines: Vec<InvoiceLine>,
    pub total: f64,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Appointment {0} not found")]
    NotFound(EntityId),

    #[error("Cannot move appointment from {from} to {to}")]
    StateConflict {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("An invoice must be generated before completing appointment {0}")]
    InvoiceRequired(EntityId),

    #[error("Appointments that are {0} cannot be invoiced")]
    NotInvoiceable(AppointmentStatus),

    #[error("Note must not be empty")]
    EmptyNote,

    #[error("Invoice rendering failed: {0}")]
    RenderFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFound(_) => AppError::NotFound(err.to_string()),
            LifecycleError::StateConflict { .. }
            | LifecycleError::InvoiceRequired(_)
            | LifecycleError::NotInvoiceable(_) => AppError::Conflict(err.to_string()),
            LifecycleError::EmptyNote => AppError::ValidationError(err.to_string()),
            LifecycleError::RenderFailed(_) => AppError::Internal(err.to_string()),
            LifecycleError::Store(store) => store.into(),
        }
    }
}
