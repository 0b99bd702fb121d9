// libs/booking-cell/src/services/wizard.rs
//
// Three-step booking form: Selection -> Contact -> Review. Each step validates its own
// fields before moving forward; going back never validates.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};

use appointment_cell::SessionContext;
use scheduling_cell::{
    parse_date, parse_time, provider_slots, Availability, AvailabilityFilter, ConflictOutcome, SlotCandidate,
    SlotSequence,
};
use shared_models::{EntityId, Provider, Service};
use shared_utils::validation::{is_blank, is_valid_email, is_valid_phone};

use crate::models::{BookingError, BookingForm, BookingPayload, Field, FieldErrors, WizardNotice, WizardStep};

pub struct BookingWizard {
    session: Arc<SessionContext>,
    step: WizardStep,
    form: BookingForm,
    errors: FieldErrors,
    notices: Vec<WizardNotice>,
}

impl BookingWizard {
    pub fn new(session: Arc<SessionContext>) -> Self {
        Self {
            session,
            step: WizardStep::Selection,
            form: BookingForm::default(),
            errors: FieldErrors::new(),
            notices: Vec::new(),
        }
    }

    /// Load a complete form at once without snapping the time, so a bad time surfaces as
    /// a validation error instead of being silently replaced. A missing provider is still
    /// auto-selected from the eligible ones.
    pub fn from_form(session: Arc<SessionContext>, form: BookingForm) -> Self {
        let mut wizard = Self::new(session);
        let requested_provider = form.provider_id;
        wizard.form = form;

        if let Some(service_id) = wizard.form.service_id {
            let eligible = wizard.eligible_provider_ids(service_id);
            if eligible.is_empty() {
                wizard.form.provider_id = None;
                wizard.notices.push(WizardNotice::NoEligibleProviders { service_id });
            } else if requested_provider.is_none() {
                wizard.form.provider_id = eligible.first().copied();
                if let Some(provider_id) = wizard.form.provider_id {
                    wizard.notices.push(WizardNotice::ProviderAutoSelected { provider_id });
                }
            }
        }
        wizard
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn form(&self) -> &BookingForm {
        &self.form
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn notices(&self) -> &[WizardNotice] {
        &self.notices
    }

    pub fn bookable_services(&self) -> Vec<&Service> {
        self.session.catalog.bookable_services()
    }

    pub fn eligible_providers(&self) -> Vec<&Provider> {
        match self.form.service_id {
            Some(service_id) => self.session.catalog.eligible_providers(service_id),
            None => Vec::new(),
        }
    }

    // ==============================================================================
    // FIELD UPDATES
    // ==============================================================================

    /// Recompute eligible providers. An ineligible current provider is replaced by the
    /// first eligible one.
    pub fn set_service(&mut self, service_id: EntityId) {
        self.form.service_id = Some(service_id);
        self.errors.remove(&Field::Service);
        self.notices.clear();

        let eligible = self.eligible_provider_ids(service_id);
        let current_ok = self.form.provider_id.is_some_and(|id| eligible.contains(&id));

        if eligible.is_empty() {
            self.form.provider_id = None;
            self.notices.push(WizardNotice::NoEligibleProviders { service_id });
        } else if !current_ok {
            self.form.provider_id = eligible.first().copied();
            if let Some(provider_id) = self.form.provider_id {
                debug!("Auto-selected provider {} for service {}", provider_id, service_id);
                self.notices.push(WizardNotice::ProviderAutoSelected { provider_id });
            }
        }
        self.reconcile_time();
    }

    pub fn set_provider(&mut self, provider_id: Option<EntityId>) {
        self.form.provider_id = provider_id;
        self.errors.remove(&Field::Provider);
        self.reconcile_time();
    }

    pub fn set_date(&mut self, date: &str) {
        self.form.date = date.trim().to_string();
        self.errors.remove(&Field::Date);
        self.reconcile_time();
    }

    pub fn set_time(&mut self, time: &str) {
        self.form.time = time.trim().to_string();
        self.errors.remove(&Field::Time);
    }

    pub fn set_contact(&mut self, name: &str, email: &str, phone: &str) {
        self.form.name = name.to_string();
        self.form.email = email.to_string();
        self.form.phone = phone.to_string();
        self.errors.remove(&Field::Name);
        self.errors.remove(&Field::Email);
        self.errors.remove(&Field::Phone);
    }

    pub fn set_notes(&mut self, notes: Option<String>) {
        self.form.notes = notes.filter(|n| !is_blank(n));
    }

    // ==============================================================================
    // AVAILABILITY
    // ==============================================================================

    /// Times still free for the selected date and provider.
    pub fn available_times(&self) -> Availability {
        let Some(date) = self.selected_date() else {
            return if is_blank(&self.form.date) {
                Availability::NoDateSelected
            } else {
                Availability::FullyBooked
            };
        };

        let provider = self.form.provider_id.and_then(|id| self.session.catalog.provider(id));
        let day = provider_slots(&self.day_slots(), provider, date);
        let snapshot = self.session.snapshot.appointments();

        AvailabilityFilter::from_rules(&self.session.rules).filter(
            day,
            date,
            self.form.provider_id,
            &snapshot,
            self.session.clock.now(),
        )
    }

    /// Debounced live check of the current selection; `None` if superseded or incomplete.
    pub async fn check_selection(&self) -> Option<ConflictOutcome> {
        let candidate = self.candidate()?;
        self.session.validator.check_debounced(&candidate).await
    }

    pub fn candidate(&self) -> Option<SlotCandidate> {
        Some(SlotCandidate {
            provider_id: self.form.provider_id,
            date: self.selected_date()?,
            time: parse_time(&self.form.time)?,
        })
    }

    // ==============================================================================
    // NAVIGATION
    // ==============================================================================

    pub fn next(&mut self) -> Result<WizardStep, FieldErrors> {
        let errors = match self.step {
            WizardStep::Review => self.validate_all(),
            step => self.validate_step(step),
        };

        if !errors.is_empty() {
            debug!("Step {:?} blocked by {} field errors", self.step, errors.len());
            self.errors = errors.clone();
            return Err(errors);
        }

        self.errors.clear();
        self.step = match self.step {
            WizardStep::Selection => WizardStep::Contact,
            WizardStep::Contact | WizardStep::Review => WizardStep::Review,
        };
        Ok(self.step)
    }

    pub fn previous(&mut self) -> WizardStep {
        self.step = match self.step {
            WizardStep::Selection | WizardStep::Contact => WizardStep::Selection,
            WizardStep::Review => WizardStep::Contact,
        };
        self.step
    }

    pub fn validate_step(&self, step: WizardStep) -> FieldErrors {
        match step {
            WizardStep::Selection => self.validate_selection(),
            WizardStep::Contact => self.validate_contact(),
            WizardStep::Review => self.validate_all(),
        }
    }

    pub fn validate_all(&self) -> FieldErrors {
        let mut errors = self.validate_selection();
        errors.extend(self.validate_contact());
        errors
    }

    /// Re-validate everything and produce the payload handed to payment.
    pub fn submit_payload(&mut self) -> Result<BookingPayload, BookingError> {
        let errors = self.validate_all();
        if !errors.is_empty() {
            self.errors = errors.clone();
            if let Some(first) = errors.keys().next() {
                self.step = first.step();
            }
            return Err(BookingError::Validation(errors));
        }

        let (Some(service), Some(date), Some(time)) = (
            self.form.service_id.and_then(|id| self.session.catalog.bookable_service(id)),
            self.selected_date(),
            parse_time(&self.form.time),
        ) else {
            return Err(BookingError::Validation(self.validate_all()));
        };

        let phone = self.form.phone.trim();
        Ok(BookingPayload {
            service_id: service.id,
            service_name: service.name.clone(),
            price: service.price,
            provider_id: self.form.provider_id,
            scheduled_at: date.and_time(time),
            client_name: self.form.name.trim().to_string(),
            client_email: self.form.email.trim().to_string(),
            client_phone: (!phone.is_empty()).then(|| phone.to_string()),
            notes: self.form.notes.clone(),
        })
    }

    pub fn reset(&mut self) {
        self.step = WizardStep::Selection;
        self.form = BookingForm::default();
        self.errors.clear();
        self.notices.clear();
        self.session.validator.invalidate();
        info!("Booking wizard reset");
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    fn day_slots(&self) -> SlotSequence {
        SlotSequence::for_hours(self.session.rules.hours, self.session.rules.step_minutes)
    }

    fn selected_date(&self) -> Option<NaiveDate> {
        parse_date(&self.form.date)
    }

    fn eligible_provider_ids(&self, service_id: EntityId) -> Vec<EntityId> {
        self.session
            .catalog
            .eligible_providers(service_id)
            .iter()
            .map(|p| p.id)
            .collect()
    }

    /// Keep the chosen time only while it is still offered; otherwise move to the first
    /// free time or clear it.
    fn reconcile_time(&mut self) {
        let Some(current) = parse_time(&self.form.time) else {
            return;
        };
        let availability = self.available_times();
        if availability.contains(current) {
            return;
        }

        match availability.first() {
            Some(first) => {
                self.form.time = first.format("%H:%M").to_string();
                self.notices.push(WizardNotice::TimeSnapped { from: current, to: first });
            }
            None => {
                self.form.time.clear();
                self.notices.push(WizardNotice::TimeCleared { from: current });
            }
        }
    }

    fn validate_selection(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();

        match self.form.service_id {
            None => {
                errors.insert(Field::Service, "Choose a service".to_string());
            }
            Some(id) if self.session.catalog.bookable_service(id).is_none() => {
                errors.insert(Field::Service, "This service is not available".to_string());
            }
            Some(id) => {
                let eligible = self.eligible_provider_ids(id);
                match self.form.provider_id {
                    None if !eligible.is_empty() => {
                        errors.insert(Field::Provider, "Choose who will attend you".to_string());
                    }
                    Some(p) if !eligible.contains(&p) => {
                        errors.insert(Field::Provider, "This provider does not offer the service".to_string());
                    }
                    _ => {}
                }
            }
        }

        let date = if is_blank(&self.form.date) {
            errors.insert(Field::Date, "Choose a date".to_string());
            None
        } else {
            match self.selected_date() {
                None => {
                    errors.insert(Field::Date, "Invalid date".to_string());
                    None
                }
                Some(date) if date < self.session.clock.now().date() => {
                    errors.insert(Field::Date, "Choose today or a later date".to_string());
                    None
                }
                Some(date) => Some(date),
            }
        };

        if is_blank(&self.form.time) {
            errors.insert(Field::Time, "Choose a time".to_string());
        } else if let Some(message) = date.and_then(|date| self.time_problem(date)) {
            errors.insert(Field::Time, message);
        } else if date.is_none() && parse_time(&self.form.time).is_none() {
            errors.insert(Field::Time, "Invalid time".to_string());
        }

        errors
    }

    fn time_problem(&self, date: NaiveDate) -> Option<String> {
        let Some(time) = parse_time(&self.form.time) else {
            return Some("Invalid time".to_string());
        };
        let slots = self.day_slots();
        if !slots.within_hours(time) {
            let hours = self.session.rules.hours;
            return Some(format!(
                "We are open from {:02}:00 to {:02}:00",
                hours.open_hour, hours.close_hour
            ));
        }
        if !slots.contains(time) {
            return Some(format!(
                "Times are offered every {} minutes",
                self.session.rules.step_minutes
            ));
        }

        let filter = AvailabilityFilter::from_rules(&self.session.rules);
        if !filter.respects_lead_time(date, time, self.session.clock.now()) {
            return Some(format!(
                "Book at least {} minutes in advance",
                self.session.rules.lead_time.num_minutes()
            ));
        }

        let provider = self.form.provider_id.and_then(|id| self.session.catalog.provider(id));
        if !provider_slots(&slots, provider, date).contains(&time) {
            return Some("The provider does not work at that time".to_string());
        }

        if let Some(provider_id) = self.form.provider_id {
            let snapshot = self.session.snapshot.appointments();
            if AvailabilityFilter::occupied_times(&snapshot, date, Some(provider_id)).contains(&time) {
                return Some("That time is already booked".to_string());
            }
        }
        None
    }

    fn validate_contact(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();

        if is_blank(&self.form.name) {
            errors.insert(Field::Name, "Enter your name".to_string());
        }
        if is_blank(&self.form.email) {
            errors.insert(Field::Email, "Enter your email".to_string());
        } else if !is_valid_email(&self.form.email) {
            errors.insert(Field::Email, "Enter a valid email".to_string());
        }
        if !is_blank(&self.form.phone) && !is_valid_phone(&self.form.phone) {
            errors.insert(Field::Phone, "Enter a valid phone number".to_string());
        }

        errors
    }
}
