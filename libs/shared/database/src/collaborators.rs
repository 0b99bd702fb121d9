use async_trait::async_trait;

use shared_models::{
    Appointment, AppointmentPatch, EntityId, NewAppointment, NewPayment, Payment, Provider,
    ProviderServiceLink, Service, StoreError,
};

/// Appointment persistence. Implementations must report authorization, validation and
/// network failures as distinct [`StoreError`] variants.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError>;

    /// The current row for `id`, read from the backend. [`StoreError::NotFound`] when absent.
    async fn get_appointment(&self, id: EntityId) -> Result<Appointment, StoreError>;

    async fn create_appointment(&self, payload: &NewAppointment) -> Result<Appointment, StoreError>;

    async fn update_appointment(
        &self,
        id: EntityId,
        patch: &AppointmentPatch,
    ) -> Result<Appointment, StoreError>;
}

/// Payment persistence. Not idempotent: callers must not repeat a create that succeeded.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create_payment(&self, payload: &NewPayment) -> Result<Payment, StoreError>;
}

/// Read-only catalog, loaded once per session.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_services(&self) -> Result<Vec<Service>, StoreError>;

    async fn list_providers(&self) -> Result<Vec<Provider>, StoreError>;

    async fn list_provider_service_links(&self) -> Result<Vec<ProviderServiceLink>, StoreError>;
}
