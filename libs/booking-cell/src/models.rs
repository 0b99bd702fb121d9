// libs/booking-cell/src/models.rs
use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use scheduling_cell::hh_mm;
use shared_models::{AppError, AppointmentStatus, EntityId, NewAppointment, Payment, Appointment, StoreError};

// ==============================================================================
// WIZARD MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Selection,
    Contact,
    Review,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Service,
    Provider,
    Date,
    Time,
    Name,
    Email,
    Phone,
}

impl Field {
    pub fn step(&self) -> WizardStep {
        match self {
            Field::Service | Field::Provider | Field::Date | Field::Time => WizardStep::Selection,
            Field::Name | Field::Email | Field::Phone => WizardStep::Contact,
        }
    }
}

/// Inline validation messages keyed by field.
pub type FieldErrors = BTreeMap<Field, String>;

/// Raw form input as typed by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookingForm {
    pub service_id: Option<EntityId>,
    pub provider_id: Option<EntityId>,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Something the client should be told without it being an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum WizardNotice {
    /// Nobody currently offers the service; the booking can go ahead and the shop will
    /// assign someone, but the client is asked to get in touch.
    NoEligibleProviders { service_id: EntityId },
    ProviderAutoSelected { provider_id: EntityId },
    TimeSnapped {
        #[serde(with = "hh_mm")]
        from: NaiveTime,
        #[serde(with = "hh_mm")]
        to: NaiveTime,
    },
    TimeCleared {
        #[serde(with = "hh_mm")]
        from: NaiveTime,
    },
}

/// Validated wizard output, ready for the payment machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingPayload {
    pub service_id: EntityId,
    pub service_name: String,
    pub price: f64,
    pub provider_id: Option<EntityId>,
    pub scheduled_at: NaiveDateTime,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub notes: Option<String>,
}

impl BookingPayload {
    pub fn to_new_appointment(&self) -> NewAppointment {
        NewAppointment {
            scheduled_at: self.scheduled_at,
            client_name: self.client_name.clone(),
            client_email: self.client_email.clone(),
            client_phone: self.client_phone.clone(),
            notes: self.notes.clone(),
            provider: self.provider_id,
            service: self.service_id,
            status: AppointmentStatus::Pending,
        }
    }
}

// ==============================================================================
// PAYMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Qr,
    Card,
}

impl PaymentMethod {
    pub fn reference_prefix(&self) -> &'static str {
        match self {
            PaymentMethod::Qr => "QR",
            PaymentMethod::Card => "CARD",
        }
    }

    /// Label stored on the payment record.
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Qr => "QR",
            PaymentMethod::Card => "Tarjeta",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStage {
    Method,
    Qr,
    Card,
    Processing,
    Success,
    Error,
}

impl fmt::Display for PaymentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentStage::Method => "method",
            PaymentStage::Qr => "qr",
            PaymentStage::Card => "card",
            PaymentStage::Processing => "processing",
            PaymentStage::Success => "success",
            PaymentStage::Error => "error",
        };
        f.write_str(name)
    }
}

/// The three dependent writes of a confirmation, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStep {
    CreateAppointment,
    CreatePayment,
    MarkPaid,
}

impl fmt::Display for WriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriteStep::CreateAppointment => "create appointment",
            WriteStep::CreatePayment => "create payment",
            WriteStep::MarkPaid => "mark appointment paid",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingReceipt {
    pub appointment: Appointment,
    pub payment: Option<Payment>,
    pub transaction_ref: String,
    pub method: PaymentMethod,
}

/// A machine closed after a partial failure: the appointment exists but was never paid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbandonedAttempt {
    pub appointment_id: EntityId,
    pub payment_id: Option<EntityId>,
    pub failed_step: Option<WriteStep>,
}

/// What a submission or retry ended in.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Confirmed {
        receipt: BookingReceipt,
        warning: Option<String>,
    },
    PaymentFailed {
        attempt_id: Uuid,
        failed_step: WriteStep,
        appointment_id: Option<EntityId>,
        message: String,
    },
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Some fields need attention")]
    Validation(FieldErrors),

    #[error("The selected time was just taken")]
    SlotTaken {
        appointment_id: EntityId,
        alternatives: Vec<NaiveTime>,
    },

    #[error("Cannot {action} while payment is in the {stage} stage")]
    InvalidStage { stage: PaymentStage, action: &'static str },

    #[error("The payment was already recorded as {}; the method can no longer change", .0.label())]
    MethodLocked(PaymentMethod),

    #[error("No pending booking to retry")]
    NothingToRetry,

    #[error("Booking attempt {0} not found")]
    UnknownAttempt(Uuid),

    #[error("Step '{step}' failed: {source}")]
    Write {
        step: WriteStep,
        #[source]
        source: StoreError,
    },
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Validation(_) => AppError::ValidationError(err.to_string()),
            BookingError::SlotTaken { .. } => AppError::Conflict(err.to_string()),
            BookingError::InvalidStage { .. } | BookingError::MethodLocked(_) | BookingError::NothingToRetry => {
                AppError::Conflict(err.to_string())
            }
            BookingError::UnknownAttempt(_) => AppError::NotFound(err.to_string()),
            BookingError::Write { source, .. } => source.into(),
        }
    }
}
