// libs/booking-cell/src/services/flow.rs
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use appointment_cell::{NotificationKind, SessionContext};
use scheduling_cell::{ConflictOutcome, SlotCandidate};

use crate::models::{AbandonedAttempt, BookingError, BookingPayload, PaymentMethod, SubmitOutcome, WriteStep};
use crate::services::payment::PaymentConfirmation;
use crate::services::wizard::BookingWizard;

struct ParkedAttempt {
    machine: PaymentConfirmation,
    parked_at: Instant,
}

/// Wizard submission through to a confirmed, paid appointment. Failed attempts are kept
/// by id so they can be retried or explicitly abandoned, and are dropped once they have
/// sat untouched for longer than the configured TTL.
pub struct BookingFlow {
    session: Arc<SessionContext>,
    attempts: Mutex<HashMap<Uuid, ParkedAttempt>>,
    attempt_ttl: Duration,
}

impl BookingFlow {
    pub fn new(session: Arc<SessionContext>) -> Self {
        let attempt_ttl = Duration::from_secs(session.config.attempt_ttl_minutes.saturating_mul(60));
        Self {
            session,
            attempts: Mutex::new(HashMap::new()),
            attempt_ttl,
        }
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Validate every field and run the forced conflict check. Returns the payload and,
    /// when the check could not reach the backend, a warning for the client.
    pub async fn preflight(&self, wizard: &mut BookingWizard) -> Result<(BookingPayload, Option<String>), BookingError> {
        let payload = wizard.submit_payload()?;

        let candidate = SlotCandidate {
            provider_id: payload.provider_id,
            date: payload.scheduled_at.date(),
            time: payload.scheduled_at.time(),
        };

        match self.session.validator.check_now(&candidate).await {
            ConflictOutcome::Available => Ok((payload, None)),
            ConflictOutcome::Indeterminate { reason } => {
                warn!("Proceeding without a confirmed conflict check: {}", reason);
                Ok((payload, Some(reason)))
            }
            ConflictOutcome::Conflict {
                appointment_id,
                alternatives,
            } => {
                self.session.notifications.notify(
                    NotificationKind::ConflictDetected,
                    format!(
                        "Slot {} already taken by appointment #{}",
                        payload.scheduled_at.format("%d/%m/%Y %H:%M"),
                        appointment_id
                    ),
                    format!(
                        "{}:{:?}:{}",
                        NotificationKind::ConflictDetected.as_str(),
                        payload.provider_id,
                        payload.scheduled_at
                    ),
                );
                Err(BookingError::SlotTaken {
                    appointment_id,
                    alternatives,
                })
            }
        }
    }

    /// Submit the wizard and pay with `method`. On success the wizard is reset; on a
    /// write failure the attempt is parked under a fresh id.
    #[instrument(skip(self, wizard))]
    pub async fn submit(&self, wizard: &mut BookingWizard, method: PaymentMethod) -> Result<SubmitOutcome, BookingError> {
        let (payload, warning) = self.preflight(wizard).await?;

        let mut machine = PaymentConfirmation::new(self.session.clone(), payload);
        machine.select_method(method)?;

        match machine.confirm().await {
            Ok(receipt) => {
                wizard.reset();
                Ok(SubmitOutcome::Confirmed { receipt, warning })
            }
            Err(BookingError::Write { step, source }) => {
                let attempt_id = Uuid::new_v4();
                let outcome = Self::failure(attempt_id, step, &machine, source.user_message());
                self.park(attempt_id, machine).await;
                info!("Booking attempt {} parked after failing at '{}'", attempt_id, step);
                Ok(outcome)
            }
            Err(other) => Err(other),
        }
    }

    /// Resume a parked attempt from its failed step. The attempt is held exclusively while
    /// its writes run.
    #[instrument(skip(self))]
    pub async fn retry(&self, attempt_id: Uuid) -> Result<SubmitOutcome, BookingError> {
        let mut machine = self.take(attempt_id).await?;

        match machine.retry().await {
            Ok(receipt) => {
                info!("Booking attempt {} recovered", attempt_id);
                Ok(SubmitOutcome::Confirmed { receipt, warning: None })
            }
            Err(BookingError::Write { step, source }) => {
                let outcome = Self::failure(attempt_id, step, &machine, source.user_message());
                self.park(attempt_id, machine).await;
                Ok(outcome)
            }
            Err(other) => {
                self.park(attempt_id, machine).await;
                Err(other)
            }
        }
    }

    /// Give up on a parked attempt. Reports the appointment left pending, if any.
    pub async fn abandon(&self, attempt_id: Uuid) -> Result<Option<AbandonedAttempt>, BookingError> {
        let mut machine = self.take(attempt_id).await?;
        machine.close()
    }

    pub async fn pending_attempts(&self) -> Vec<Uuid> {
        let mut attempts = self.attempts.lock().await;
        self.prune_expired(&mut attempts);
        attempts.keys().copied().collect()
    }

    /// Close every parked attempt. Called when the session is torn down.
    pub async fn close_all(&self) -> Vec<AbandonedAttempt> {
        let drained: Vec<_> = self.attempts.lock().await.drain().collect();
        drained
            .into_iter()
            .filter_map(|(attempt_id, mut parked)| Self::close_parked(attempt_id, &mut parked.machine))
            .collect()
    }

    async fn park(&self, attempt_id: Uuid, machine: PaymentConfirmation) {
        let mut attempts = self.attempts.lock().await;
        self.prune_expired(&mut attempts);
        attempts.insert(
            attempt_id,
            ParkedAttempt {
                machine,
                parked_at: Instant::now(),
            },
        );
    }

    async fn take(&self, attempt_id: Uuid) -> Result<PaymentConfirmation, BookingError> {
        let mut attempts = self.attempts.lock().await;
        self.prune_expired(&mut attempts);
        attempts
            .remove(&attempt_id)
            .map(|parked| parked.machine)
            .ok_or(BookingError::UnknownAttempt(attempt_id))
    }

    fn prune_expired(&self, attempts: &mut HashMap<Uuid, ParkedAttempt>) {
        let expired: Vec<Uuid> = attempts
            .iter()
            .filter(|(_, parked)| parked.parked_at.elapsed() >= self.attempt_ttl)
            .map(|(id, _)| *id)
            .collect();

        for attempt_id in expired {
            if let Some(mut parked) = attempts.remove(&attempt_id) {
                warn!("Booking attempt {} expired after {:?}", attempt_id, self.attempt_ttl);
                Self::close_parked(attempt_id, &mut parked.machine);
            }
        }
    }

    fn close_parked(attempt_id: Uuid, machine: &mut PaymentConfirmation) -> Option<AbandonedAttempt> {
        match machine.close() {
            Ok(abandoned) => abandoned,
            Err(e) => {
                warn!("Booking attempt {} could not be closed: {}", attempt_id, e);
                None
            }
        }
    }

    fn failure(attempt_id: Uuid, step: WriteStep, machine: &PaymentConfirmation, message: &str) -> SubmitOutcome {
        SubmitOutcome::PaymentFailed {
            attempt_id,
            failed_step: step,
            appointment_id: machine.appointment().map(|a| a.id),
            message: message.to_string(),
        }
    }
}
