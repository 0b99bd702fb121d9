use std::env;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::str::FromStr;
use tracing::warn;

/// Longest accepted booking lead time: one week.
pub const MAX_LEAD_TIME_MINUTES: i64 = 7 * 24 * 60;

/// Opening window of the shop, in whole hours of local time. `close_hour` is inclusive:
/// a slot starting exactly at the closing hour is still bookable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    pub open_hour: u32,
    pub close_hour: u32,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            open_hour: 8,
            close_hour: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub business_hours: BusinessHours,
    pub slot_interval_minutes: u32,
    pub min_lead_time_minutes: i64,
    pub conflict_debounce_ms: u64,
    pub snapshot_poll_seconds: u64,
    pub snapshot_min_interval_ms: u64,
    pub attempt_ttl_minutes: u64,
    pub invoice_prefix: String,
    pub api_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            business_hours: BusinessHours::default(),
            slot_interval_minutes: 30,
            min_lead_time_minutes: 30,
            conflict_debounce_ms: 500,
            snapshot_poll_seconds: 60,
            snapshot_min_interval_ms: 2_000,
            attempt_ttl_minutes: 30,
            invoice_prefix: "FAC".to_string(),
            api_port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            business_hours: business_hours_from_env(defaults.business_hours),
            slot_interval_minutes: bounded_var("SLOT_INTERVAL_MINUTES", defaults.slot_interval_minutes, 1..=720),
            min_lead_time_minutes: bounded_var(
                "MIN_LEAD_TIME_MINUTES",
                defaults.min_lead_time_minutes,
                0..=MAX_LEAD_TIME_MINUTES,
            ),
            conflict_debounce_ms: bounded_var("CONFLICT_DEBOUNCE_MS", defaults.conflict_debounce_ms, 0..=60_000),
            snapshot_poll_seconds: bounded_var("SNAPSHOT_POLL_SECONDS", defaults.snapshot_poll_seconds, 1..=3_600),
            snapshot_min_interval_ms: bounded_var(
                "SNAPSHOT_MIN_INTERVAL_MS",
                defaults.snapshot_min_interval_ms,
                0..=600_000,
            ),
            attempt_ttl_minutes: bounded_var("ATTEMPT_TTL_MINUTES", defaults.attempt_ttl_minutes, 1..=1_440),
            invoice_prefix: env::var("INVOICE_PREFIX")
                .unwrap_or_else(|_| {
                    warn!("INVOICE_PREFIX not set, using default");
                    defaults.invoice_prefix.clone()
                }),
            api_port: parsed_var("API_PORT", defaults.api_port),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }
}

fn business_hours_from_env(defaults: BusinessHours) -> BusinessHours {
    let hours = BusinessHours {
        open_hour: bounded_var("BUSINESS_OPEN_HOUR", defaults.open_hour, 0..=23),
        close_hour: bounded_var("BUSINESS_CLOSE_HOUR", defaults.close_hour, 0..=23),
    };
    if hours.close_hour < hours.open_hour {
        warn!(
            "BUSINESS_CLOSE_HOUR {} is before BUSINESS_OPEN_HOUR {}, using default hours",
            hours.close_hour, hours.open_hour
        );
        return defaults;
    }
    hours
}

/// Like [`parsed_var`], but a value outside `range` also falls back to `default`.
fn bounded_var<T>(name: &str, default: T, range: RangeInclusive<T>) -> T
where
    T: FromStr + Display + PartialOrd + Copy,
{
    let value = parsed_var(name, default);
    if range.contains(&value) {
        return value;
    }
    warn!(
        "{} = {} is outside {}..={}, using default {}",
        name,
        value,
        range.start(),
        range.end(),
        default
    );
    default
}

fn parsed_var<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", name, raw, default);
            default
        }),
        Err(_) => {
            warn!("{} not set, using default {}", name, default);
            default
        }
    }
}
