use chrono::{NaiveTime, Timelike};

use shared_config::BusinessHours;

const LAST_MINUTE_OF_DAY: u32 = 23 * 60 + 59;

/// The day's bookable start times: `open` to `close` inclusive, every `step` minutes.
///
/// The sequence is a plain value; iterating it twice yields the same times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSequence {
    open_minute: u32,
    close_minute: u32,
    step_minutes: u32,
}

impl SlotSequence {
    pub fn new(open_hour: u32, close_hour: u32, step_minutes: u32) -> Self {
        Self {
            open_minute: open_hour.saturating_mul(60),
            close_minute: close_hour.saturating_mul(60).min(LAST_MINUTE_OF_DAY),
            step_minutes,
        }
    }

    pub fn for_hours(hours: BusinessHours, step_minutes: u32) -> Self {
        Self::new(hours.open_hour, hours.close_hour, step_minutes)
    }

    pub fn is_empty(&self) -> bool {
        self.step_minutes == 0 || self.close_minute < self.open_minute
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        ((self.close_minute - self.open_minute) / self.step_minutes) as usize + 1
    }

    pub fn iter(&self) -> SlotIter {
        SlotIter {
            next_minute: self.open_minute,
            close_minute: self.close_minute,
            step_minutes: self.step_minutes,
            exhausted: self.is_empty(),
        }
    }

    /// Whether `time` falls between opening and closing, grid or not.
    pub fn within_hours(&self, time: NaiveTime) -> bool {
        if self.is_empty() {
            return false;
        }
        let minute = time.hour() * 60 + time.minute();
        let exact = time.second() == 0 && time.nanosecond() == 0;
        minute >= self.open_minute
            && (minute < self.close_minute || (minute == self.close_minute && exact))
    }

    /// Whether `time` is one of the generated slots.
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.within_hours(time)
            && time.second() == 0
            && (time.hour() * 60 + time.minute() - self.open_minute) % self.step_minutes == 0
    }

    pub fn to_vec(&self) -> Vec<NaiveTime> {
        self.iter().collect()
    }
}

impl IntoIterator for SlotSequence {
    type Item = NaiveTime;
    type IntoIter = SlotIter;

    fn into_iter(self) -> SlotIter {
        self.iter()
    }
}

impl IntoIterator for &SlotSequence {
    type Item = NaiveTime;
    type IntoIter = SlotIter;

    fn into_iter(self) -> SlotIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct SlotIter {
    next_minute: u32,
    close_minute: u32,
    step_minutes: u32,
    exhausted: bool,
}

impl Iterator for SlotIter {
    type Item = NaiveTime;

    fn next(&mut self) -> Option<NaiveTime> {
        if self.exhausted || self.next_minute > self.close_minute {
            return None;
        }
        let minute = self.next_minute;
        match minute.checked_add(self.step_minutes) {
            Some(next) => self.next_minute = next,
            None => self.exhausted = true,
        }
        NaiveTime::from_hms_opt(minute / 60, minute % 60, 0)
    }
}

/// Slots for a business day. `close_hour < open_hour` yields an empty sequence.
pub fn generate_slots(open_hour: u32, close_hour: u32, step_minutes: u32) -> SlotSequence {
    SlotSequence::new(open_hour, close_hour, step_minutes)
}
