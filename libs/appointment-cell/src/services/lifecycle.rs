// libs/appointment-cell/src/services/lifecycle.rs
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use scheduling_cell::RefreshTrigger;
use shared_database::AppointmentStore;
use shared_models::{Appointment, AppointmentPatch, AppointmentStatus, EntityId, StoreError};

use crate::models::{InvoiceDocument, LifecycleError};
use crate::services::invoice::{InvoiceDraft, InvoiceRenderer, InvoiceSource};
use crate::services::notifications::NotificationKind;
use crate::session::SessionContext;

/// Staff-side transitions of an appointment: `Pending -> Paid -> Completed`, with
/// `Cancelled` reachable from either non-terminal state.
pub struct AppointmentLifecycleService {
    session: Arc<SessionContext>,
    renderer: Arc<dyn InvoiceRenderer>,
}

impl AppointmentLifecycleService {
    pub fn new(session: Arc<SessionContext>, renderer: Arc<dyn InvoiceRenderer>) -> Self {
        Self { session, renderer }
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), LifecycleError> {
        debug!("Validating status transition from {:?} to {:?}", current_status, new_status);

        if !Self::get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {:?} -> {:?}", current_status, new_status);
            return Err(LifecycleError::StateConflict {
                from: current_status,
                to: new_status,
            });
        }
        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Pending => vec![AppointmentStatus::Paid, AppointmentStatus::Cancelled],
            AppointmentStatus::Paid => vec![AppointmentStatus::Completed, AppointmentStatus::Cancelled],
            // Terminal states - only audit notes from here on
            AppointmentStatus::Completed | AppointmentStatus::Cancelled => vec![],
        }
    }

    #[instrument(skip(self))]
    pub async fn mark_paid(&self, appointment_id: EntityId) -> Result<Appointment, LifecycleError> {
        self.transition(appointment_id, AppointmentStatus::Paid).await
    }

    /// Requires an invoice produced for this appointment during the current session.
    #[instrument(skip(self))]
    pub async fn mark_completed(&self, appointment_id: EntityId) -> Result<Appointment, LifecycleError> {
        self.transition(appointment_id, AppointmentStatus::Completed).await
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, appointment_id: EntityId) -> Result<Appointment, LifecycleError> {
        self.transition(appointment_id, AppointmentStatus::Cancelled).await
    }

    /// Append a timestamped audit note. Allowed in every status, terminal ones included.
    #[instrument(skip(self, note))]
    pub async fn add_note(&self, appointment_id: EntityId, note: &str) -> Result<Appointment, LifecycleError> {
        let note = note.trim();
        if note.is_empty() {
            return Err(LifecycleError::EmptyNote);
        }

        let current = self.fetch_current(appointment_id).await?;
        let stamped = format!("[{}] {}", self.session.clock.now().format("%Y-%m-%d %H:%M"), note);
        let notes = match current.notes.as_deref().map(str::trim) {
            Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, stamped),
            _ => stamped,
        };

        let patch = AppointmentPatch {
            notes: Some(notes),
            ..AppointmentPatch::default()
        };
        let updated = self
            .session
            .stores
            .appointments
            .update_appointment(appointment_id, &patch)
            .await?;

        self.session.snapshot.apply_local_patch(updated.clone());
        self.session.snapshot.refresh(RefreshTrigger::AfterWrite).await;
        info!("Note added to appointment {}", appointment_id);
        Ok(updated)
    }

    /// Render the invoice for a paid or completed appointment and record it for this session.
    #[instrument(skip(self))]
    pub async fn generate_invoice(&self, appointment_id: EntityId) -> Result<InvoiceDocument, LifecycleError> {
        let appointment = self.fetch_current(appointment_id).await?;
        if !matches!(appointment.status, AppointmentStatus::Paid | AppointmentStatus::Completed) {
            return Err(LifecycleError::NotInvoiceable(appointment.status));
        }

        let catalog = &self.session.catalog;
        let service = appointment
            .service
            .as_ref()
            .and_then(|r| r.as_full().cloned().or_else(|| catalog.service(r.id()).cloned()));
        let provider = appointment
            .provider
            .as_ref()
            .and_then(|r| r.as_full().cloned().or_else(|| catalog.provider(r.id()).cloned()));
        let payment = appointment
            .payment
            .as_ref()
            .and_then(|r| r.as_full().cloned())
            .or_else(|| self.session.recorded_payment(appointment_id));

        let source = InvoiceSource {
            appointment: &appointment,
            service: service.as_ref(),
            provider: provider.as_ref(),
            payment: payment.as_ref(),
        };
        let draft = InvoiceDraft::compose(&self.session.config.invoice_prefix, &source, self.session.clock.now());
        let document = draft
            .render(appointment_id, self.renderer.as_ref())
            .map_err(LifecycleError::RenderFailed)?;

        self.session.mark_invoiced(appointment_id);
        self.session.notifications.notify_appointment(
            NotificationKind::InvoiceIssued,
            appointment_id,
            format!("Factura {} emitida", document.number),
        );
        info!("Invoice {} generated for appointment {}", document.number, appointment_id);
        Ok(document)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn transition(&self, appointment_id: EntityId, to: AppointmentStatus) -> Result<Appointment, LifecycleError> {
        let current = self.fetch_current(appointment_id).await?;
        if let Err(err) = Self::validate_status_transition(current.status, to) {
            self.resync_if_stale(&current).await;
            return Err(err);
        }

        if to == AppointmentStatus::Completed && !self.session.has_invoice(appointment_id) {
            warn!("Completion of appointment {} refused: no invoice yet", appointment_id);
            return Err(LifecycleError::InvoiceRequired(appointment_id));
        }

        let updated = self
            .session
            .stores
            .appointments
            .update_appointment(appointment_id, &AppointmentPatch::status(to))
            .await?;

        info!("Appointment {} moved from {} to {}", appointment_id, current.status, to);

        self.session.snapshot.apply_local_patch(updated.clone());
        self.session.snapshot.refresh(RefreshTrigger::AfterWrite).await;

        let (kind, message) = match to {
            AppointmentStatus::Paid => (NotificationKind::AppointmentPaid, "marcada como pagada"),
            AppointmentStatus::Completed => (NotificationKind::AppointmentCompleted, "completada"),
            _ => (NotificationKind::AppointmentCancelled, "cancelada"),
        };
        self.session.notifications.notify_appointment(
            kind,
            appointment_id,
            format!("Cita #{} de {} {}", appointment_id, updated.client_name, message),
        );

        Ok(updated)
    }

    /// Read the appointment's current row from the backend. The snapshot may be up to a
    /// poll interval old or hold a provisional patch, so it never decides a transition.
    async fn fetch_current(&self, appointment_id: EntityId) -> Result<Appointment, LifecycleError> {
        match self.session.stores.appointments.get_appointment(appointment_id).await {
            Ok(current) => Ok(current),
            Err(StoreError::NotFound(_)) => Err(LifecycleError::NotFound(appointment_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Reload the snapshot when it disagrees with the backend about `current`.
    async fn resync_if_stale(&self, current: &Appointment) {
        let cached = self.session.snapshot.current().find(current.id).map(|a| a.status);
        if cached != Some(current.status) {
            debug!(
                "Snapshot has appointment {} as {:?}, backend has {}; reloading",
                current.id, cached, current.status
            );
            self.session.snapshot.refresh(RefreshTrigger::Manual).await;
        }
    }
}
