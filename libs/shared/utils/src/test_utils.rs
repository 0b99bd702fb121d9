use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};

use shared_database::{AppointmentStore, CatalogStore, PaymentStore};
use shared_models::{
    Appointment, AppointmentPatch, AppointmentStatus, EntityId, NewAppointment, NewPayment,
    Payment, Provider, ProviderServiceLink, Relation, Service, StoreError,
};

/// Collaborator calls that can be counted or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListAppointments,
    GetAppointment,
    CreateAppointment,
    UpdateAppointment,
    CreatePayment,
    ListServices,
    ListProviders,
    ListLinks,
}

/// In-memory stand-in for every persistence collaborator, with failure injection.
#[derive(Default)]
pub struct InMemoryBackend {
    appointments: Mutex<Vec<Appointment>>,
    payments: Mutex<Vec<Payment>>,
    services: Mutex<Vec<Service>>,
    providers: Mutex<Vec<Provider>>,
    links: Mutex<Vec<ProviderServiceLink>>,
    next_id: AtomicI64,
    failures: Mutex<HashMap<Operation, VecDeque<StoreError>>>,
    calls: Mutex<HashMap<Operation, usize>>,
    list_delay: Mutex<Option<Duration>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(100),
            ..Self::default()
        }
    }

    pub fn with_catalog(
        self,
        services: Vec<Service>,
        providers: Vec<Provider>,
        links: Vec<ProviderServiceLink>,
    ) -> Self {
        *lock(&self.services) = services;
        *lock(&self.providers) = providers;
        *lock(&self.links) = links;
        self
    }

    pub fn with_appointments(self, appointments: Vec<Appointment>) -> Self {
        *lock(&self.appointments) = appointments;
        self
    }

    /// Queue an error returned by the next call to `operation`.
    pub fn fail_next(&self, operation: Operation, error: StoreError) {
        lock(&self.failures).entry(operation).or_default().push_back(error);
    }

    /// Make `list_appointments` sleep before answering.
    pub fn set_list_delay(&self, delay: Duration) {
        *lock(&self.list_delay) = Some(delay);
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        lock(&self.calls).get(&operation).copied().unwrap_or(0)
    }

    pub fn appointments(&self) -> Vec<Appointment> {
        lock(&self.appointments).clone()
    }

    pub fn appointment(&self, id: EntityId) -> Option<Appointment> {
        lock(&self.appointments).iter().find(|a| a.id == id).cloned()
    }

    pub fn payments(&self) -> Vec<Payment> {
        lock(&self.payments).clone()
    }

    /// Insert or replace an appointment behind the stores' back, as another client would.
    pub fn put_appointment(&self, appointment: Appointment) {
        let mut appointments = lock(&self.appointments);
        appointments.retain(|a| a.id != appointment.id);
        appointments.push(appointment);
    }

    fn enter(&self, operation: Operation) -> Result<(), StoreError> {
        *lock(&self.calls).entry(operation).or_insert(0) += 1;
        match lock(&self.failures).get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn next_id(&self) -> EntityId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl AppointmentStore for InMemoryBackend {
    async fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError> {
        let delay = *lock(&self.list_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.enter(Operation::ListAppointments)?;
        Ok(self.appointments())
    }

    async fn get_appointment(&self, id: EntityId) -> Result<Appointment, StoreError> {
        self.enter(Operation::GetAppointment)?;
        self.appointment(id)
            .ok_or_else(|| StoreError::NotFound(format!("appointment {}", id)))
    }

    async fn create_appointment(&self, payload: &NewAppointment) -> Result<Appointment, StoreError> {
        self.enter(Operation::CreateAppointment)?;
        let appointment = Appointment {
            id: self.next_id(),
            scheduled_at: payload.scheduled_at,
            client_name: payload.client_name.clone(),
            client_email: payload.client_email.clone(),
            client_phone: payload.client_phone.clone(),
            status: payload.status,
            notes: payload.notes.clone(),
            created_at: Some(Utc::now()),
            updated_at: Some(Utc::now()),
            deleted_at: None,
            provider: payload.provider.map(Relation::Stub),
            service: Some(Relation::Stub(payload.service)),
            payment: None,
        };
        lock(&self.appointments).push(appointment.clone());
        Ok(appointment)
    }

    async fn update_appointment(
        &self,
        id: EntityId,
        patch: &AppointmentPatch,
    ) -> Result<Appointment, StoreError> {
        self.enter(Operation::UpdateAppointment)?;
        let mut appointments = lock(&self.appointments);
        let appointment = appointments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("appointment {}", id)))?;

        if let Some(status) = patch.status {
            appointment.status = status;
        }
        if let Some(notes) = &patch.notes {
            appointment.notes = Some(notes.clone());
        }
        if let Some(payment) = patch.payment {
            appointment.payment = Some(Relation::Stub(payment));
        }
        appointment.updated_at = Some(Utc::now());
        Ok(appointment.clone())
    }
}

#[async_trait]
impl PaymentStore for InMemoryBackend {
    async fn create_payment(&self, payload: &NewPayment) -> Result<Payment, StoreError> {
        self.enter(Operation::CreatePayment)?;
        let payment = Payment {
            id: self.next_id(),
            amount: payload.amount,
            method: payload.method.clone(),
            status: payload.status,
            transaction_ref: payload.transaction_ref.clone(),
            paid_at: payload.paid_at,
            appointment: Relation::Stub(payload.appointment),
            deleted_at: None,
        };
        lock(&self.payments).push(payment.clone());
        Ok(payment)
    }
}

#[async_trait]
impl CatalogStore for InMemoryBackend {
    async fn list_services(&self) -> Result<Vec<Service>, StoreError> {
        self.enter(Operation::ListServices)?;
        Ok(lock(&self.services).clone())
    }

    async fn list_providers(&self) -> Result<Vec<Provider>, StoreError> {
        self.enter(Operation::ListProviders)?;
        Ok(lock(&self.providers).clone())
    }

    async fn list_provider_service_links(&self) -> Result<Vec<ProviderServiceLink>, StoreError> {
        self.enter(Operation::ListLinks)?;
        Ok(lock(&self.links).clone())
    }
}

// ==============================================================================
// FIXTURES
// ==============================================================================

pub mod fixtures {
    use super::*;

    /// Parse `YYYY-MM-DD HH:MM` into a local timestamp. Test input only.
    pub fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M")
            .unwrap_or_else(|e| panic!("bad fixture timestamp {}: {}", value, e))
    }

    pub fn service(id: EntityId, name: &str, price: f64) -> Service {
        Service {
            id,
            name: name.to_string(),
            price,
            duration_minutes: 30,
            active: true,
        }
    }

    pub fn provider(id: EntityId, name: &str, services: &[EntityId]) -> Provider {
        Provider {
            id,
            name: name.to_string(),
            working_hours: None,
            days_off: Vec::new(),
            services: services.to_vec(),
            deleted_at: None,
        }
    }

    pub fn link(id: EntityId, provider: EntityId, service: EntityId) -> ProviderServiceLink {
        ProviderServiceLink {
            id,
            provider: Relation::Stub(provider),
            service: Relation::Stub(service),
            deleted_at: None,
        }
    }

    pub fn appointment(
        id: EntityId,
        provider: EntityId,
        scheduled_at: &str,
        status: AppointmentStatus,
    ) -> Appointment {
        Appointment {
            id,
            scheduled_at: at(scheduled_at),
            client_name: "Cliente".to_string(),
            client_email: "cliente@example.com".to_string(),
            client_phone: None,
            status,
            notes: None,
            created_at: None,
            updated_at: None,
            deleted_at: None,
            provider: Some(Relation::Stub(provider)),
            service: Some(Relation::Stub(1)),
            payment: None,
        }
    }
}
