use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;

use shared_models::{Appointment, EntityId, Provider};

use crate::models::{Availability, SchedulingRules};
use crate::services::slots::SlotSequence;

/// Accepts `YYYY-MM-DD` (form input) and `DD/MM/YYYY` (typed by staff).
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%d/%m/%Y"))
        .ok()
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

pub struct AvailabilityFilter {
    lead_time: Duration,
}

impl AvailabilityFilter {
    pub fn new(lead_time: Duration) -> Self {
        Self { lead_time }
    }

    pub fn from_rules(rules: &SchedulingRules) -> Self {
        Self::new(rules.lead_time)
    }

    /// Time-of-day values held by active appointments on `date`, optionally for one provider.
    pub fn occupied_times(
        snapshot: &[Appointment],
        date: NaiveDate,
        provider_id: Option<EntityId>,
    ) -> BTreeSet<NaiveTime> {
        snapshot
            .iter()
            .filter(|apt| apt.occupies_slot() && apt.date() == date)
            .filter(|apt| provider_id.is_none() || apt.provider_id() == provider_id)
            .map(Appointment::time)
            .collect()
    }

    /// Earliest instant a booking made at `now` may start.
    pub fn earliest_bookable(&self, now: NaiveDateTime) -> NaiveDateTime {
        now + self.lead_time
    }

    pub fn respects_lead_time(&self, date: NaiveDate, time: NaiveTime, now: NaiveDateTime) -> bool {
        date.and_time(time) >= self.earliest_bookable(now)
    }

    /// Remove occupied slots and, when `date` is today, slots earlier than `now + lead time`.
    /// Other dates are not cut; rejecting past dates is left to booking validation.
    ///
    /// `provider_id = None` means "any provider" and is only meant for display.
    pub fn filter<I>(
        &self,
        slots: I,
        date: NaiveDate,
        provider_id: Option<EntityId>,
        snapshot: &[Appointment],
        now: NaiveDateTime,
    ) -> Availability
    where
        I: IntoIterator<Item = NaiveTime>,
    {
        let occupied = Self::occupied_times(snapshot, date, provider_id);

        let remaining: BTreeSet<NaiveTime> = slots
            .into_iter()
            .filter(|slot| !occupied.contains(slot))
            .filter(|slot| date != now.date() || self.respects_lead_time(date, *slot, now))
            .collect();

        debug!(
            "Availability for {} (provider {:?}): {} free, {} occupied",
            date,
            provider_id,
            remaining.len(),
            occupied.len()
        );

        if remaining.is_empty() {
            Availability::FullyBooked
        } else {
            Availability::Open(remaining.into_iter().collect())
        }
    }

    /// Same as [`filter`](Self::filter) for raw form input. A blank date means nothing is
    /// selected yet; an unparseable one leaves every slot unavailable.
    pub fn filter_raw<I>(
        &self,
        slots: I,
        date: &str,
        provider_id: Option<EntityId>,
        snapshot: &[Appointment],
        now: NaiveDateTime,
    ) -> Availability
    where
        I: IntoIterator<Item = NaiveTime>,
    {
        if date.trim().is_empty() {
            return Availability::NoDateSelected;
        }
        match parse_date(date) {
            Some(date) => self.filter(slots, date, provider_id, snapshot, now),
            None => {
                debug!("Unparseable date '{}', treating every slot as unavailable", date);
                Availability::FullyBooked
            }
        }
    }

    /// Whether a single raw (date, time) pair could be booked right now.
    pub fn is_bookable_raw(
        &self,
        slots: &SlotSequence,
        date: &str,
        time: &str,
        provider_id: Option<EntityId>,
        snapshot: &[Appointment],
        now: NaiveDateTime,
    ) -> bool {
        match (parse_date(date), parse_time(time)) {
            (Some(date), Some(time)) => {
                slots.contains(time)
                    && self.respects_lead_time(date, time, now)
                    && !Self::occupied_times(snapshot, date, provider_id).contains(&time)
            }
            _ => false,
        }
    }
}

/// Clip the day's slots to a provider's own schedule: nothing on a day off, and only
/// times inside their working-hours window when one is set.
pub fn provider_slots(slots: &SlotSequence, provider: Option<&Provider>, date: NaiveDate) -> Vec<NaiveTime> {
    match provider {
        None => slots.to_vec(),
        Some(provider) if provider.is_day_off(date) => Vec::new(),
        Some(provider) => slots
            .iter()
            .filter(|slot| provider.working_hours.map_or(true, |hours| hours.contains(*slot)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_models::{AppointmentStatus, WorkingHours};
    use shared_utils::test_utils::fixtures::{appointment, at, provider};

    use crate::services::slots::generate_slots;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_lead_time_drops_slots_starting_too_soon() {
        let filter = AvailabilityFilter::new(Duration::minutes(30));
        let availability = filter.filter(generate_slots(8, 20, 30), day("2025-01-15"), None, &[], at("2025-01-15 14:10"));

        assert!(!availability.contains(t(14, 0)));
        assert!(!availability.contains(t(14, 30)));
        assert!(availability.contains(t(15, 0)));
        assert_eq!(availability.first(), Some(t(15, 0)));
    }

    #[test]
    fn test_occupied_slot_only_blocks_its_provider() {
        let filter = AvailabilityFilter::new(Duration::minutes(30));
        let snapshot = vec![appointment(1, 7, "2025-01-15 10:00", AppointmentStatus::Pending)];
        let now = at("2025-01-14 12:00");

        let for_seven = filter.filter(generate_slots(8, 20, 30), day("2025-01-15"), Some(7), &snapshot, now);
        let for_eight = filter.filter(generate_slots(8, 20, 30), day("2025-01-15"), Some(8), &snapshot, now);

        assert!(!for_seven.contains(t(10, 0)));
        assert_eq!(for_seven.times().len(), 24);
        assert!(for_eight.contains(t(10, 0)));
        assert_eq!(for_eight.times().len(), 25);
    }

    #[test]
    fn test_cancelled_and_deleted_appointments_free_their_slot() {
        let filter = AvailabilityFilter::new(Duration::minutes(30));
        let mut deleted = appointment(2, 7, "2025-01-15 11:00", AppointmentStatus::Pending);
        deleted.deleted_at = Some(chrono::Utc::now());
        let snapshot = vec![
            appointment(1, 7, "2025-01-15 10:00", AppointmentStatus::Cancelled),
            deleted,
        ];

        let availability =
            filter.filter(generate_slots(8, 20, 30), day("2025-01-15"), Some(7), &snapshot, at("2025-01-14 12:00"));
        assert!(availability.contains(t(10, 0)));
        assert!(availability.contains(t(11, 0)));
    }

    #[test]
    fn test_raw_dates_distinguish_blank_from_garbage() {
        let filter = AvailabilityFilter::new(Duration::minutes(30));
        let now = at("2025-01-14 12:00");

        assert_eq!(filter.filter_raw(generate_slots(8, 20, 30), "  ", None, &[], now), Availability::NoDateSelected);
        assert_eq!(filter.filter_raw(generate_slots(8, 20, 30), "15-01", None, &[], now), Availability::FullyBooked);
        assert_eq!(
            filter.filter_raw(generate_slots(8, 20, 30), "15/01/2025", None, &[], now).times().len(),
            25
        );
    }

    #[test]
    fn test_lead_time_only_cuts_today() {
        let filter = AvailabilityFilter::new(Duration::minutes(30));
        let snapshot = vec![appointment(1, 7, "2025-01-10 10:00", AppointmentStatus::Pending)];
        let now = at("2025-01-14 12:00");

        let past = filter.filter(generate_slots(8, 20, 30), day("2025-01-10"), Some(7), &snapshot, now);
        assert_eq!(past.times().len(), 24);
        assert!(!past.contains(t(10, 0)));

        let tomorrow = filter.filter(generate_slots(8, 20, 30), day("2025-01-15"), None, &[], now);
        assert_eq!(tomorrow.first(), Some(t(8, 0)));

        let today = filter.filter(generate_slots(8, 20, 30), day("2025-01-14"), None, &[], now);
        assert_eq!(today.first(), Some(t(12, 30)));
    }

    #[test]
    fn test_past_day_is_not_bookable() {
        let filter = AvailabilityFilter::new(Duration::minutes(30));
        let slots = generate_slots(8, 20, 30);
        assert!(!filter.is_bookable_raw(&slots, "2025-01-10", "10:00", None, &[], at("2025-01-14 12:00")));
    }

    #[test]
    fn test_output_is_ascending_and_deduplicated() {
        let filter = AvailabilityFilter::new(Duration::zero());
        let slots = vec![t(11, 0), t(9, 0), t(11, 0), t(10, 0)];
        let availability = filter.filter(slots, day("2025-01-15"), None, &[], at("2025-01-14 12:00"));
        assert_eq!(availability.times(), &[t(9, 0), t(10, 0), t(11, 0)]);
    }

    #[test]
    fn test_is_bookable_raw_checks_grid_lead_time_and_occupancy() {
        let filter = AvailabilityFilter::new(Duration::minutes(30));
        let slots = generate_slots(8, 20, 30);
        let snapshot = vec![appointment(1, 7, "2025-01-15 10:00", AppointmentStatus::Paid)];
        let now = at("2025-01-15 09:00");

        assert!(filter.is_bookable_raw(&slots, "2025-01-15", "10:30", Some(7), &snapshot, now));
        assert!(!filter.is_bookable_raw(&slots, "2025-01-15", "10:00", Some(7), &snapshot, now));
        assert!(!filter.is_bookable_raw(&slots, "2025-01-15", "09:15", Some(7), &snapshot, now));
        assert!(filter.is_bookable_raw(&slots, "2025-01-15", "09:30", Some(7), &snapshot, now));
        assert!(!filter.is_bookable_raw(&slots, "2025-01-15", "09:00", Some(7), &snapshot, now));
        assert!(!filter.is_bookable_raw(&slots, "2025-01-15", "nope", Some(7), &snapshot, now));
    }

    #[test]
    fn test_provider_schedule_narrows_the_day() {
        let slots = generate_slots(8, 20, 30);
        let mut ana = provider(7, "Ana", &[1]);
        ana.working_hours = Some(WorkingHours { start: t(10, 0), end: t(12, 0) });
        ana.days_off = vec!["domingo".to_string()];

        let wednesday = provider_slots(&slots, Some(&ana), day("2025-01-15"));
        assert_eq!(wednesday.first(), Some(&t(10, 0)));
        assert!(wednesday.iter().all(|slot| *slot >= t(10, 0) && *slot <= t(12, 0)));

        assert!(provider_slots(&slots, Some(&ana), day("2025-01-19")).is_empty());
        assert_eq!(provider_slots(&slots, None, day("2025-01-19")).len(), 25);
    }
}
