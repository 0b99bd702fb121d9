// libs/booking-cell/src/services/payment.rs
//
// Payment confirmation: method -> {qr | card} -> processing -> success | error.
// Processing runs three dependent writes in order and resumes from the failed one on retry.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use appointment_cell::{NotificationKind, SessionContext};
use scheduling_cell::RefreshTrigger;
use shared_database::{AppointmentStore, PaymentStore};
use shared_models::{Appointment, AppointmentPatch, AppointmentStatus, NewPayment, Payment, PaymentStatus, StoreError};

use crate::models::{
    AbandonedAttempt, BookingError, BookingPayload, BookingReceipt, PaymentMethod, PaymentStage, WriteStep,
};

pub struct PaymentConfirmation {
    session: Arc<SessionContext>,
    stage: PaymentStage,
    method: Option<PaymentMethod>,
    seed: Option<String>,
    payload: Option<BookingPayload>,
    appointment: Option<Appointment>,
    payment: Option<Payment>,
    failed_step: Option<WriteStep>,
    last_error: Option<StoreError>,
}

impl PaymentConfirmation {
    pub fn new(session: Arc<SessionContext>, payload: BookingPayload) -> Self {
        Self {
            session,
            stage: PaymentStage::Method,
            method: None,
            seed: None,
            payload: Some(payload),
            appointment: None,
            payment: None,
            failed_step: None,
            last_error: None,
        }
    }

    pub fn stage(&self) -> PaymentStage {
        self.stage
    }

    pub fn method(&self) -> Option<PaymentMethod> {
        self.method
    }

    pub fn seed(&self) -> Option<&str> {
        self.seed.as_deref()
    }

    pub fn appointment(&self) -> Option<&Appointment> {
        self.appointment.as_ref()
    }

    pub fn payment(&self) -> Option<&Payment> {
        self.payment.as_ref()
    }

    pub fn failed_step(&self) -> Option<WriteStep> {
        self.failed_step
    }

    pub fn last_error(&self) -> Option<&StoreError> {
        self.last_error.as_ref()
    }

    pub fn can_retry(&self) -> bool {
        self.stage == PaymentStage::Error && self.payload.is_some()
    }

    /// The method is fixed once the payment row has been written.
    fn locked_method(&self) -> Option<PaymentMethod> {
        self.payment.as_ref().and(self.method)
    }

    /// `{QR|CARD}-{seed}`. The seed is fixed at the first method selection.
    pub fn transaction_ref(&self) -> Option<String> {
        match (self.method, &self.seed) {
            (Some(method), Some(seed)) => Some(format!("{}-{}", method.reference_prefix(), seed)),
            _ => None,
        }
    }

    // ==============================================================================
    // STAGE TRANSITIONS
    // ==============================================================================

    pub fn select_method(&mut self, method: PaymentMethod) -> Result<PaymentStage, BookingError> {
        match self.stage {
            PaymentStage::Method | PaymentStage::Qr | PaymentStage::Card | PaymentStage::Error => {}
            stage => {
                return Err(BookingError::InvalidStage {
                    stage,
                    action: "choose a payment method",
                })
            }
        }

        if let Some(locked) = self.locked_method() {
            if locked != method {
                warn!("Method change to {:?} refused: payment already recorded as {:?}", method, locked);
                return Err(BookingError::MethodLocked(locked));
            }
        }

        if self.seed.is_none() {
            let seed = Uuid::new_v4().simple().to_string()[..12].to_uppercase();
            debug!("Transaction seed {} generated", seed);
            self.seed = Some(seed);
        }

        self.method = Some(method);
        self.stage = match method {
            PaymentMethod::Qr => PaymentStage::Qr,
            PaymentMethod::Card => PaymentStage::Card,
        };
        Ok(self.stage)
    }

    pub fn back_to_method(&mut self) -> Result<PaymentStage, BookingError> {
        if let Some(locked) = self.locked_method() {
            return Err(BookingError::MethodLocked(locked));
        }
        match self.stage {
            PaymentStage::Qr | PaymentStage::Card | PaymentStage::Error => {
                self.stage = PaymentStage::Method;
                Ok(self.stage)
            }
            stage => Err(BookingError::InvalidStage {
                stage,
                action: "go back to method selection",
            }),
        }
    }

    /// Explicit confirmation from the QR or card screen, or a retry from `error`.
    pub async fn confirm(&mut self) -> Result<BookingReceipt, BookingError> {
        match self.stage {
            PaymentStage::Qr | PaymentStage::Card => self.process().await,
            PaymentStage::Error => self.retry().await,
            stage => Err(BookingError::InvalidStage {
                stage,
                action: "confirm payment",
            }),
        }
    }

    /// Resume from the failed step. Only possible while the booking payload is still held.
    pub async fn retry(&mut self) -> Result<BookingReceipt, BookingError> {
        if self.stage != PaymentStage::Error {
            return Err(BookingError::InvalidStage {
                stage: self.stage,
                action: "retry",
            });
        }
        if self.payload.is_none() {
            return Err(BookingError::NothingToRetry);
        }
        info!("Retrying booking from step {:?}", self.failed_step);
        self.process().await
    }

    /// Discard transient state. Committed writes stay; an appointment created without
    /// reaching `success` is reported so the gap is visible.
    pub fn close(&mut self) -> Result<Option<AbandonedAttempt>, BookingError> {
        if self.stage == PaymentStage::Processing {
            return Err(BookingError::InvalidStage {
                stage: self.stage,
                action: "close",
            });
        }

        let abandoned = match (&self.appointment, self.stage) {
            (Some(appointment), stage) if stage != PaymentStage::Success => Some(AbandonedAttempt {
                appointment_id: appointment.id,
                payment_id: self.payment.as_ref().map(|p| p.id),
                failed_step: self.failed_step,
            }),
            _ => None,
        };

        if let Some(report) = &abandoned {
            warn!(
                "Booking closed unfinished: appointment {} stays pending (payment {:?}, failed at {:?})",
                report.appointment_id, report.payment_id, report.failed_step
            );
        }

        self.stage = PaymentStage::Method;
        self.method = None;
        self.seed = None;
        self.payload = None;
        self.appointment = None;
        self.payment = None;
        self.failed_step = None;
        self.last_error = None;
        Ok(abandoned)
    }

    // ==============================================================================
    // PROCESSING
    // ==============================================================================

    #[instrument(skip(self))]
    async fn process(&mut self) -> Result<BookingReceipt, BookingError> {
        let (Some(payload), Some(method), Some(transaction_ref)) =
            (self.payload.clone(), self.method, self.transaction_ref())
        else {
            return Err(BookingError::NothingToRetry);
        };

        self.stage = PaymentStage::Processing;
        self.failed_step = None;
        self.last_error = None;

        match self.run_steps(&payload, method, &transaction_ref).await {
            Ok(appointment) => {
                self.stage = PaymentStage::Success;
                let receipt = BookingReceipt {
                    appointment: appointment.clone(),
                    payment: self.payment.clone(),
                    transaction_ref,
                    method,
                };
                self.after_success(&receipt).await;
                Ok(receipt)
            }
            Err((step, e)) => {
                error!("Booking step '{}' failed: {}", step, e);
                self.stage = PaymentStage::Error;
                self.failed_step = Some(step);
                self.last_error = Some(e.clone());

                let key = match &self.appointment {
                    Some(appointment) => NotificationKind::PaymentFailed.key_for(appointment.id),
                    None => format!("{}:{}", NotificationKind::PaymentFailed.as_str(), transaction_ref),
                };
                self.session.notifications.notify(
                    NotificationKind::PaymentFailed,
                    format!("Payment {} failed at '{}'", transaction_ref, step),
                    key,
                );
                Err(BookingError::Write { step, source: e })
            }
        }
    }

    /// (a) create appointment, (b) create payment when there is something to charge,
    /// (c) mark the appointment paid. Steps already done are skipped.
    async fn run_steps(
        &mut self,
        payload: &BookingPayload,
        method: PaymentMethod,
        transaction_ref: &str,
    ) -> Result<Appointment, (WriteStep, StoreError)> {
        let stores = self.session.stores.clone();

        let appointment = match &self.appointment {
            Some(existing) => existing.clone(),
            None => {
                let created = stores
                    .appointments
                    .create_appointment(&payload.to_new_appointment())
                    .await
                    .map_err(|e| (WriteStep::CreateAppointment, e))?;
                info!("Appointment {} created for {}", created.id, payload.client_name);
                self.appointment = Some(created.clone());
                created
            }
        };

        if payload.price > 0.0 && self.payment.is_none() {
            let new_payment = NewPayment {
                amount: payload.price,
                method: method.label().to_string(),
                status: PaymentStatus::Completed,
                transaction_ref: transaction_ref.to_string(),
                paid_at: Some(Utc::now()),
                appointment: appointment.id,
            };
            let payment = stores
                .payments
                .create_payment(&new_payment)
                .await
                .map_err(|e| (WriteStep::CreatePayment, e))?;
            info!("Payment {} recorded for appointment {}", payment.id, appointment.id);
            self.payment = Some(payment);
        }

        if appointment.status == AppointmentStatus::Paid {
            return Ok(appointment);
        }

        let patch = AppointmentPatch {
            status: Some(AppointmentStatus::Paid),
            payment: self.payment.as_ref().map(|p| p.id),
            ..AppointmentPatch::default()
        };
        let paid = stores
            .appointments
            .update_appointment(appointment.id, &patch)
            .await
            .map_err(|e| (WriteStep::MarkPaid, e))?;
        self.appointment = Some(paid.clone());
        Ok(paid)
    }

    async fn after_success(&self, receipt: &BookingReceipt) {
        let appointment_id = receipt.appointment.id;
        if let Some(payment) = &receipt.payment {
            self.session.record_payment(appointment_id, payment.clone());
        }
        self.session.snapshot.refresh(RefreshTrigger::AfterWrite).await;
        self.session.notifications.notify_appointment(
            NotificationKind::BookingConfirmed,
            appointment_id,
            format!(
                "New booking #{} for {} on {}",
                appointment_id,
                receipt.appointment.client_name,
                receipt.appointment.scheduled_at.format("%d/%m/%Y %H:%M")
            ),
        );
        info!("Booking {} confirmed with {}", appointment_id, receipt.transaction_ref);
    }
}
