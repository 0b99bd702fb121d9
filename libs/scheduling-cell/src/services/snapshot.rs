// libs/scheduling-cell/src/services/snapshot.rs
//
// Appointment snapshot shared by the availability filter and the staff dashboard.
// One refresh routine serves every trigger; it is reentrancy-guarded and throttled.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use shared_database::AppointmentStore;
use shared_models::{Appointment, EntityId, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Timer,
    Visibility,
    Manual,
    AfterWrite,
}

impl RefreshTrigger {
    fn bypasses_throttle(&self) -> bool {
        matches!(self, RefreshTrigger::Manual | RefreshTrigger::AfterWrite)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Refreshed { count: usize },
    SkippedInFlight,
    SkippedThrottled,
    Failed(StoreError),
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentSnapshot {
    pub appointments: Arc<Vec<Appointment>>,
    pub fetched_at: Option<DateTime<Utc>>,
    /// Ids carrying a local patch that the backend has not confirmed yet.
    pub provisional: HashSet<EntityId>,
    pub last_error: Option<StoreError>,
}

impl AppointmentSnapshot {
    pub fn find(&self, id: EntityId) -> Option<&Appointment> {
        self.appointments.iter().find(|apt| apt.id == id)
    }

    pub fn is_provisional(&self, id: EntityId) -> bool {
        self.provisional.contains(&id)
    }
}

pub struct SnapshotRefresher {
    store: Arc<dyn AppointmentStore>,
    snapshot: RwLock<AppointmentSnapshot>,
    in_flight: AtomicBool,
    last_started: Mutex<Option<Instant>>,
    min_interval: Duration,
    poller: Mutex<Option<JoinHandle<()>>>,
}

/// Clears the in-flight flag however the refresh future ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SnapshotRefresher {
    pub fn new(store: Arc<dyn AppointmentStore>, min_interval: Duration) -> Self {
        Self {
            store,
            snapshot: RwLock::new(AppointmentSnapshot::default()),
            in_flight: AtomicBool::new(false),
            last_started: Mutex::new(None),
            min_interval,
            poller: Mutex::new(None),
        }
    }

    pub fn current(&self) -> AppointmentSnapshot {
        self.snapshot.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn appointments(&self) -> Arc<Vec<Appointment>> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(|p| p.into_inner()).appointments)
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Reload the appointment collection. At most one reload runs at a time; timer and
    /// visibility triggers are additionally throttled to `min_interval`.
    #[instrument(skip(self))]
    pub async fn refresh(&self, trigger: RefreshTrigger) -> RefreshOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Refresh already in flight, skipping {:?}", trigger);
            return RefreshOutcome::SkippedInFlight;
        }
        let _guard = InFlightGuard(&self.in_flight);

        {
            let mut last_started = self.last_started.lock().unwrap_or_else(|p| p.into_inner());
            let now = Instant::now();
            if !trigger.bypasses_throttle() {
                if let Some(previous) = *last_started {
                    if now.duration_since(previous) < self.min_interval {
                        debug!("Refresh throttled for {:?}", trigger);
                        return RefreshOutcome::SkippedThrottled;
                    }
                }
            }
            *last_started = Some(now);
        }

        match self.store.list_appointments().await {
            Ok(appointments) => {
                let count = appointments.len();
                let mut snapshot = self.snapshot.write().unwrap_or_else(|p| p.into_inner());
                *snapshot = AppointmentSnapshot {
                    appointments: Arc::new(appointments),
                    fetched_at: Some(Utc::now()),
                    provisional: HashSet::new(),
                    last_error: None,
                };
                debug!("Snapshot refreshed with {} appointments", count);
                RefreshOutcome::Refreshed { count }
            }
            Err(e) => {
                warn!("Snapshot refresh failed, keeping previous data: {}", e);
                self.snapshot.write().unwrap_or_else(|p| p.into_inner()).last_error = Some(e.clone());
                RefreshOutcome::Failed(e)
            }
        }
    }

    /// Replace one appointment in place after a staff action succeeded. The patch is
    /// provisional: the next full reload overwrites it.
    pub fn apply_local_patch(&self, updated: Appointment) {
        let mut snapshot = self.snapshot.write().unwrap_or_else(|p| p.into_inner());
        let mut appointments: Vec<Appointment> = snapshot.appointments.as_ref().clone();
        match appointments.iter_mut().find(|apt| apt.id == updated.id) {
            Some(existing) => *existing = updated.clone(),
            None => appointments.push(updated.clone()),
        }
        snapshot.appointments = Arc::new(appointments);
        snapshot.provisional.insert(updated.id);
    }

    /// Start periodic reloads. The task holds only a weak reference and ends by itself
    /// once the refresher is dropped.
    pub fn start_polling(self: &Arc<Self>, every: Duration) {
        if every.is_zero() {
            warn!("Snapshot polling not started: the interval must be greater than zero");
            return;
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(refresher) = weak.upgrade() else {
                    break;
                };
                refresher.refresh(RefreshTrigger::Timer).await;
            }
        });

        let previous = self
            .poller
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        info!("Snapshot polling started every {:?}", every);
    }

    pub fn stop_polling(&self) {
        if let Some(handle) = self.poller.lock().unwrap_or_else(|p| p.into_inner()).take() {
            handle.abort();
            info!("Snapshot polling stopped");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }
}

impl Drop for SnapshotRefresher {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_models::AppointmentStatus;
    use shared_utils::test_utils::fixtures::appointment;
    use shared_utils::test_utils::{InMemoryBackend, Operation};

    fn refresher(backend: &Arc<InMemoryBackend>) -> Arc<SnapshotRefresher> {
        Arc::new(SnapshotRefresher::new(backend.clone(), Duration::from_secs(2)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_refresh_is_throttled_but_manual_is_not() {
        let backend = Arc::new(InMemoryBackend::new());
        let refresher = refresher(&backend);

        assert_eq!(refresher.refresh(RefreshTrigger::Timer).await, RefreshOutcome::Refreshed { count: 0 });
        assert_eq!(refresher.refresh(RefreshTrigger::Visibility).await, RefreshOutcome::SkippedThrottled);
        assert_eq!(refresher.refresh(RefreshTrigger::Manual).await, RefreshOutcome::Refreshed { count: 0 });

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(refresher.refresh(RefreshTrigger::Timer).await, RefreshOutcome::Refreshed { count: 0 });
        assert_eq!(backend.call_count(Operation::ListAppointments), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_refresh_is_skipped() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.set_list_delay(Duration::from_millis(300));
        let refresher = refresher(&backend);

        let slow = {
            let refresher = refresher.clone();
            tokio::spawn(async move { refresher.refresh(RefreshTrigger::Manual).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(refresher.is_refreshing());
        assert_eq!(refresher.refresh(RefreshTrigger::Manual).await, RefreshOutcome::SkippedInFlight);

        assert_eq!(slow.await.unwrap(), RefreshOutcome::Refreshed { count: 0 });
        assert!(!refresher.is_refreshing());
        assert_eq!(backend.call_count(Operation::ListAppointments), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_data() {
        let backend = Arc::new(InMemoryBackend::new().with_appointments(vec![appointment(
            1,
            7,
            "2025-01-15 10:00",
            AppointmentStatus::Pending,
        )]));
        let refresher = refresher(&backend);
        refresher.refresh(RefreshTrigger::Manual).await;

        backend.fail_next(Operation::ListAppointments, StoreError::Network("down".into()));
        let outcome = refresher.refresh(RefreshTrigger::Manual).await;

        assert!(matches!(outcome, RefreshOutcome::Failed(StoreError::Network(_))));
        let snapshot = refresher.current();
        assert_eq!(snapshot.appointments.len(), 1);
        assert!(snapshot.last_error.is_some());
    }

    #[tokio::test]
    async fn test_local_patch_is_provisional_until_reload() {
        let backend = Arc::new(InMemoryBackend::new().with_appointments(vec![appointment(
            1,
            7,
            "2025-01-15 10:00",
            AppointmentStatus::Pending,
        )]));
        let refresher = refresher(&backend);
        refresher.refresh(RefreshTrigger::Manual).await;

        let mut paid = appointment(1, 7, "2025-01-15 10:00", AppointmentStatus::Paid);
        paid.notes = Some("cash".into());
        refresher.apply_local_patch(paid);

        let snapshot = refresher.current();
        assert_eq!(snapshot.find(1).map(|a| a.status), Some(AppointmentStatus::Paid));
        assert!(snapshot.is_provisional(1));

        refresher.refresh(RefreshTrigger::AfterWrite).await;
        let snapshot = refresher.current();
        assert_eq!(snapshot.find(1).map(|a| a.status), Some(AppointmentStatus::Pending));
        assert!(!snapshot.is_provisional(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_reloads_until_stopped() {
        let backend = Arc::new(InMemoryBackend::new());
        let refresher = refresher(&backend);

        refresher.start_polling(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(125)).await;
        assert!(refresher.is_polling());
        assert_eq!(backend.call_count(Operation::ListAppointments), 3);

        refresher.stop_polling();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!refresher.is_polling());
        assert_eq!(backend.call_count(Operation::ListAppointments), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_does_not_start_polling() {
        let backend = Arc::new(InMemoryBackend::new());
        let refresher = refresher(&backend);

        refresher.start_polling(Duration::ZERO);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(!refresher.is_polling());
        assert_eq!(backend.call_count(Operation::ListAppointments), 0);
    }
}
