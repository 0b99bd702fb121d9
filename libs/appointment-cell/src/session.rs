// libs/appointment-cell/src/session.rs
//
// Explicitly owned per-session state: catalog cache, appointment snapshot, conflict
// validator, notification center and the invoices produced so far. Built once by
// `init`, released by `teardown`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use scheduling_cell::{
    Clock, ConflictValidator, RefreshOutcome, RefreshTrigger, SchedulingRules, SchedulingState,
    SnapshotRefresher,
};
use shared_config::AppConfig;
use shared_database::{AppointmentStore, CatalogStore, PaymentStore};
use shared_models::{EntityId, Payment, StoreError};

use crate::services::catalog::CatalogCache;
use crate::services::notifications::NotificationCenter;

/// The persistence collaborators a session talks to.
#[derive(Clone)]
pub struct SessionStores {
    pub appointments: Arc<dyn AppointmentStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub catalog: Arc<dyn CatalogStore>,
}

impl SessionStores {
    /// One backend serving every collaborator role.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: AppointmentStore + PaymentStore + CatalogStore + 'static,
    {
        Self {
            appointments: store.clone(),
            payments: store.clone(),
            catalog: store,
        }
    }
}

pub struct SessionContext {
    pub config: AppConfig,
    pub rules: SchedulingRules,
    pub clock: Arc<dyn Clock>,
    pub stores: SessionStores,
    pub catalog: CatalogCache,
    pub snapshot: Arc<SnapshotRefresher>,
    pub validator: Arc<ConflictValidator>,
    pub notifications: Arc<NotificationCenter>,
    invoiced: Mutex<HashSet<EntityId>>,
    payments: Mutex<HashMap<EntityId, Payment>>,
}

impl SessionContext {
    /// Load the catalog (fatal on failure) and take a first snapshot (logged on failure).
    pub async fn init(config: AppConfig, stores: SessionStores, clock: Arc<dyn Clock>) -> Result<Arc<Self>, StoreError> {
        let catalog = CatalogCache::load(stores.catalog.as_ref()).await?;
        let session = Arc::new(Self::with_catalog(config, stores, clock, catalog));

        if let RefreshOutcome::Failed(e) = session.snapshot.refresh(RefreshTrigger::Manual).await {
            warn!("Session started without appointments: {}", e);
        }
        info!("Session initialised");
        Ok(session)
    }

    /// Assemble a session around an already loaded catalog. No I/O.
    pub fn with_catalog(config: AppConfig, stores: SessionStores, clock: Arc<dyn Clock>, catalog: CatalogCache) -> Self {
        let rules = SchedulingRules::from_config(&config);
        let snapshot = Arc::new(SnapshotRefresher::new(
            stores.appointments.clone(),
            Duration::from_millis(config.snapshot_min_interval_ms),
        ));
        let validator = Arc::new(ConflictValidator::new(
            stores.appointments.clone(),
            rules,
            clock.clone(),
            Duration::from_millis(config.conflict_debounce_ms),
        ));

        Self {
            config,
            rules,
            clock,
            stores,
            catalog,
            snapshot,
            validator,
            notifications: Arc::new(NotificationCenter::new()),
            invoiced: Mutex::new(HashSet::new()),
            payments: Mutex::new(HashMap::new()),
        }
    }

    pub fn start_polling(&self) {
        self.snapshot
            .start_polling(Duration::from_secs(self.config.snapshot_poll_seconds));
    }

    /// Stop timers, drop pending checks and forget session-scoped records.
    pub fn teardown(&self) {
        self.snapshot.stop_polling();
        self.validator.invalidate();
        self.notifications.reset();
        self.invoiced.lock().unwrap_or_else(|p| p.into_inner()).clear();
        self.payments.lock().unwrap_or_else(|p| p.into_inner()).clear();
        info!("Session torn down");
    }

    pub fn scheduling_state(&self) -> Arc<SchedulingState> {
        Arc::new(SchedulingState {
            rules: self.rules,
            snapshot: self.snapshot.clone(),
            validator: self.validator.clone(),
            clock: self.clock.clone(),
            providers: Arc::new(
                self.catalog
                    .providers()
                    .iter()
                    .map(|provider| (provider.id, provider.clone()))
                    .collect(),
            ),
        })
    }

    pub fn mark_invoiced(&self, appointment_id: EntityId) {
        self.invoiced
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(appointment_id);
    }

    pub fn has_invoice(&self, appointment_id: EntityId) -> bool {
        self.invoiced
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&appointment_id)
    }

    /// Remember a payment created during this session so invoices can show its details.
    pub fn record_payment(&self, appointment_id: EntityId, payment: Payment) {
        self.payments
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(appointment_id, payment);
    }

    pub fn recorded_payment(&self, appointment_id: EntityId) -> Option<Payment> {
        self.payments
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&appointment_id)
            .cloned()
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.snapshot.stop_polling();
    }
}
