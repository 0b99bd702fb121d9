use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::{debug, instrument, warn};

use shared_database::AppointmentStore;
use shared_models::Appointment;

use crate::models::{ConflictOutcome, SchedulingRules, SlotCandidate};
use crate::services::availability::AvailabilityFilter;
use crate::services::clock::Clock;
use crate::services::slots::SlotSequence;

const MAX_ALTERNATIVES: usize = 3;

/// Checks a candidate slot against the live appointment set. Checks are debounced and
/// every new request supersedes the ones still pending.
pub struct ConflictValidator {
    store: Arc<dyn AppointmentStore>,
    rules: SchedulingRules,
    clock: Arc<dyn Clock>,
    debounce: Duration,
    generation: AtomicU64,
}

impl ConflictValidator {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        rules: SchedulingRules,
        clock: Arc<dyn Clock>,
        debounce: Duration,
    ) -> Self {
        Self {
            store,
            rules,
            clock,
            debounce,
            generation: AtomicU64::new(0),
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Pure check of `candidate` against `appointments`.
    ///
    /// Without a provider there is nothing to collide with. On conflict up to three free
    /// times on the same day are suggested, nearest to the requested time first.
    pub fn evaluate(
        &self,
        candidate: &SlotCandidate,
        appointments: &[Appointment],
        now: NaiveDateTime,
    ) -> ConflictOutcome {
        let Some(provider_id) = candidate.provider_id else {
            return ConflictOutcome::Available;
        };

        let clash = appointments.iter().find(|apt| {
            apt.occupies_slot()
                && apt.provider_id() == Some(provider_id)
                && apt.scheduled_at == candidate.instant()
        });

        let Some(existing) = clash else {
            return ConflictOutcome::Available;
        };

        let filter = AvailabilityFilter::new(self.rules.lead_time);
        let day = SlotSequence::for_hours(self.rules.hours, self.rules.step_minutes);
        let mut free = filter
            .filter(day, candidate.date, Some(provider_id), appointments, now)
            .times()
            .to_vec();

        let requested = candidate.time;
        free.sort_by_key(|time| (*time - requested).num_minutes().abs());
        free.truncate(MAX_ALTERNATIVES);
        free.sort();

        warn!(
            "Slot {} for provider {} already held by appointment {}",
            candidate.instant(),
            provider_id,
            existing.id
        );

        ConflictOutcome::Conflict {
            appointment_id: existing.id,
            alternatives: free,
        }
    }

    /// Fetch the live appointment set and check immediately. Supersedes any pending
    /// debounced check. A failed fetch yields `Indeterminate` rather than an error.
    #[instrument(skip(self))]
    pub async fn check_now(&self, candidate: &SlotCandidate) -> ConflictOutcome {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.fetch_and_evaluate(candidate).await
    }

    /// Wait out the debounce window, then check. Returns `None` when a newer request
    /// arrived in the meantime, so only the latest selection produces a result.
    pub async fn check_debounced(&self, candidate: &SlotCandidate) -> Option<ConflictOutcome> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.debounce).await;

        if self.generation.load(Ordering::SeqCst) != ticket {
            debug!("Conflict check for {} superseded before fetch", candidate.instant());
            return None;
        }

        let outcome = self.fetch_and_evaluate(candidate).await;

        if self.generation.load(Ordering::SeqCst) != ticket {
            debug!("Conflict check for {} superseded after fetch", candidate.instant());
            return None;
        }
        Some(outcome)
    }

    /// Drop whatever check is pending, e.g. when the form is cleared.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    async fn fetch_and_evaluate(&self, candidate: &SlotCandidate) -> ConflictOutcome {
        if candidate.provider_id.is_none() {
            return ConflictOutcome::Available;
        }

        match self.store.list_appointments().await {
            Ok(appointments) => self.evaluate(candidate, &appointments, self.clock.now()),
            Err(e) => {
                warn!("Conflict check could not load appointments: {}", e);
                ConflictOutcome::Indeterminate {
                    reason: e.user_message().to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use shared_models::{AppointmentStatus, StoreError};
    use shared_utils::test_utils::fixtures::{appointment, at};
    use shared_utils::test_utils::InMemoryBackend;

    use crate::services::clock::FixedClock;

    fn candidate(provider: Option<i64>, date: &str, time: &str) -> SlotCandidate {
        SlotCandidate {
            provider_id: provider,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            time: NaiveTime::parse_from_str(time, "%H:%M").unwrap(),
        }
    }

    fn validator(backend: Arc<InMemoryBackend>) -> ConflictValidator {
        ConflictValidator::new(
            backend,
            SchedulingRules::default(),
            Arc::new(FixedClock::new(at("2025-01-14 09:00"))),
            Duration::from_millis(500),
        )
    }

    #[test]
    fn test_evaluate_reports_exact_match_with_nearest_alternatives() {
        let backend = Arc::new(InMemoryBackend::new());
        let v = validator(backend);
        let existing = vec![
            appointment(1, 7, "2025-01-15 10:00", AppointmentStatus::Pending),
            appointment(2, 7, "2025-01-15 10:30", AppointmentStatus::Paid),
        ];

        let outcome = v.evaluate(&candidate(Some(7), "2025-01-15", "10:00"), &existing, at("2025-01-14 09:00"));

        let t = |s: &str| NaiveTime::parse_from_str(s, "%H:%M").unwrap();
        assert_eq!(
            outcome,
            ConflictOutcome::Conflict {
                appointment_id: 1,
                alternatives: vec![t("09:00"), t("09:30"), t("11:00")],
            }
        );
    }

    #[test]
    fn test_evaluate_ignores_cancelled_other_provider_and_no_provider() {
        let v = validator(Arc::new(InMemoryBackend::new()));
        let existing = vec![
            appointment(1, 7, "2025-01-15 10:00", AppointmentStatus::Cancelled),
            appointment(2, 8, "2025-01-15 10:00", AppointmentStatus::Pending),
        ];
        let now = at("2025-01-14 09:00");

        assert_eq!(v.evaluate(&candidate(Some(7), "2025-01-15", "10:00"), &existing, now), ConflictOutcome::Available);
        assert_eq!(v.evaluate(&candidate(None, "2025-01-15", "10:00"), &existing, now), ConflictOutcome::Available);
    }

    #[tokio::test]
    async fn test_check_now_is_indeterminate_when_fetch_fails() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.fail_next(
            shared_utils::test_utils::Operation::ListAppointments,
            StoreError::Network("timeout".into()),
        );
        let v = validator(backend);

        let outcome = v.check_now(&candidate(Some(7), "2025-01-15", "10:00")).await;
        assert!(matches!(outcome, ConflictOutcome::Indeterminate { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_latest_debounced_check_reports() {
        let backend = Arc::new(InMemoryBackend::new().with_appointments(vec![appointment(
            1,
            7,
            "2025-01-15 10:00",
            AppointmentStatus::Pending,
        )]));
        let v = Arc::new(validator(backend.clone()));

        let first = {
            let v = v.clone();
            tokio::spawn(async move { v.check_debounced(&candidate(Some(7), "2025-01-15", "10:00")).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = {
            let v = v.clone();
            tokio::spawn(async move { v.check_debounced(&candidate(Some(7), "2025-01-15", "11:00")).await })
        };

        assert_eq!(first.await.unwrap(), None);
        assert_eq!(second.await.unwrap(), Some(ConflictOutcome::Available));
        assert_eq!(backend.call_count(shared_utils::test_utils::Operation::ListAppointments), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_cancels_pending_check() {
        let v = Arc::new(validator(Arc::new(InMemoryBackend::new())));
        let pending = {
            let v = v.clone();
            tokio::spawn(async move { v.check_debounced(&candidate(Some(7), "2025-01-15", "10:00")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        v.invalidate();
        assert_eq!(pending.await.unwrap(), None);
    }
}
