// libs/scheduling-cell/src/models.rs
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_config::{AppConfig, BusinessHours, MAX_LEAD_TIME_MINUTES};
use shared_models::{AppError, EntityId, StoreError};

// ==============================================================================
// SCHEDULING RULES
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingRules {
    pub hours: BusinessHours,
    pub step_minutes: u32,
    pub lead_time: Duration,
}

impl SchedulingRules {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            hours: config.business_hours,
            step_minutes: config.slot_interval_minutes,
            lead_time: Duration::minutes(config.min_lead_time_minutes.clamp(0, MAX_LEAD_TIME_MINUTES)),
        }
    }
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

// ==============================================================================
// WIRE FORMAT
// ==============================================================================

/// Times of day travel as `HH:MM`, the same shape as the slot grid. `HH:MM:SS` is
/// accepted on input.
pub mod hh_mm {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    use crate::services::availability::parse_time;

    pub fn format(time: &NaiveTime) -> String {
        time.format("%H:%M").to_string()
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_time(&raw).ok_or_else(|| de::Error::custom(format!("invalid time '{}'", raw)))
    }

    pub fn serialize_list<S: Serializer>(times: &[NaiveTime], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(times.iter().map(format))
    }
}

// ==============================================================================
// AVAILABILITY
// ==============================================================================

/// Result of filtering the day's slots for one provider (or for "any provider").
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "times", rename_all = "snake_case")]
pub enum Availability {
    NoDateSelected,
    FullyBooked,
    Open(#[serde(serialize_with = "hh_mm::serialize_list")] Vec<NaiveTime>),
}

impl Availability {
    pub fn times(&self) -> &[NaiveTime] {
        match self {
            Availability::Open(times) => times,
            _ => &[],
        }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.times().contains(&time)
    }

    pub fn first(&self) -> Option<NaiveTime> {
        self.times().first().copied()
    }
}

// ==============================================================================
// CONFLICT DETECTION MODELS
// ==============================================================================

/// The slot a client is about to book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCandidate {
    pub provider_id: Option<EntityId>,
    pub date: NaiveDate,
    #[serde(with = "hh_mm")]
    pub time: NaiveTime,
}

impl SlotCandidate {
    pub fn instant(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ConflictOutcome {
    Available,
    /// An active appointment already holds the exact provider and instant.
    Conflict {
        appointment_id: EntityId,
        #[serde(serialize_with = "hh_mm::serialize_list")]
        alternatives: Vec<NaiveTime>,
    },
    /// The live appointment set could not be fetched; a warning, never a block.
    Indeterminate { reason: String },
}

impl ConflictOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ConflictOutcome::Conflict { .. })
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid time: {0}")]
    InvalidTime(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<SchedulingError> for AppError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::InvalidDate(_) | SchedulingError::InvalidTime(_) => {
                AppError::ValidationError(err.to_string())
            }
            SchedulingError::Store(store) => store.into(),
        }
    }
}
