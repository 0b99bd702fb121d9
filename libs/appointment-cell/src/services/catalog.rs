use std::collections::HashSet;

use tracing::{debug, info};

use shared_database::CatalogStore;
use shared_models::{EntityId, Provider, ProviderServiceLink, Service, StoreError};

/// Services, providers and their links, read once per session.
#[derive(Debug, Clone, Default)]
pub struct CatalogCache {
    services: Vec<Service>,
    providers: Vec<Provider>,
    links: Vec<ProviderServiceLink>,
}

impl CatalogCache {
    pub fn new(services: Vec<Service>, providers: Vec<Provider>, links: Vec<ProviderServiceLink>) -> Self {
        Self {
            services,
            providers,
            links,
        }
    }

    /// Fetch the three collections concurrently; any failure fails the load.
    pub async fn load(store: &dyn CatalogStore) -> Result<Self, StoreError> {
        let (services, providers, links) = futures::try_join!(
            store.list_services(),
            store.list_providers(),
            store.list_provider_service_links(),
        )?;

        info!(
            "Catalog loaded: {} services, {} providers, {} links",
            services.len(),
            providers.len(),
            links.len()
        );
        Ok(Self::new(services, providers, links))
    }

    /// Services offered for new bookings.
    pub fn bookable_services(&self) -> Vec<&Service> {
        self.services.iter().filter(|s| s.active).collect()
    }

    /// Any service, including inactive ones still referenced by old appointments.
    pub fn service(&self, id: EntityId) -> Option<&Service> {
        self.services.iter().find(|s| s.id == id)
    }

    pub fn bookable_service(&self, id: EntityId) -> Option<&Service> {
        self.service(id).filter(|s| s.active)
    }

    pub fn provider(&self, id: EntityId) -> Option<&Provider> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    /// Providers able to perform `service_id`, via an active link or their own service list.
    /// Keeps catalog order.
    pub fn eligible_providers(&self, service_id: EntityId) -> Vec<&Provider> {
        let linked: HashSet<EntityId> = self
            .links
            .iter()
            .filter(|link| link.is_active() && link.service.id() == service_id)
            .map(|link| link.provider.id())
            .collect();

        let eligible: Vec<&Provider> = self
            .providers
            .iter()
            .filter(|p| p.deleted_at.is_none())
            .filter(|p| linked.contains(&p.id) || p.services.contains(&service_id))
            .collect();

        debug!("Service {} has {} eligible providers", service_id, eligible.len());
        eligible
    }

    pub fn is_eligible(&self, provider_id: EntityId, service_id: EntityId) -> bool {
        self.eligible_providers(service_id)
            .iter()
            .any(|p| p.id == provider_id)
    }
}
