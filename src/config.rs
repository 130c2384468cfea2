use std::env;

use anyhow::Context;
use chrono::{FixedOffset, Offset, Utc};

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub booking: BookingSettings,
}

/// Knobs used by the schedule/booking handlers.
#[derive(Clone, Copy, Debug)]
pub struct BookingSettings {
    /// Days after the start date shown in a doctor's schedule view.
    pub schedule_window_days: i64,
    /// Cancelled bookings older than this are purged by the cleanup endpoint.
    pub cancelled_retention_days: i64,
    pub default_max_number: i32,
    pub clinic_offset: FixedOffset,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            schedule_window_days: 3,
            cancelled_retention_days: 7,
            default_max_number: 5,
            clinic_offset: Utc.fix(),
        }
    }
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

const MAX_WINDOW_DAYS: i64 = 366;
const MAX_RETENTION_DAYS: i64 = 3650;

/// Offsets must stay strictly inside one day.
fn clinic_offset_from_minutes(minutes: i32) -> anyhow::Result<FixedOffset> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .with_context(|| format!("CLINIC_UTC_OFFSET_MINUTES out of range: {minutes}"))
}

impl BookingSettings {
    fn validate(self) -> anyhow::Result<Self> {
        if !(0..=MAX_WINDOW_DAYS).contains(&self.schedule_window_days) {
            anyhow::bail!(
                "SCHEDULE_WINDOW_DAYS must be between 0 and {MAX_WINDOW_DAYS} (got {})",
                self.schedule_window_days
            );
        }
        if !(0..=MAX_RETENTION_DAYS).contains(&self.cancelled_retention_days) {
            anyhow::bail!(
                "CANCELLED_RETENTION_DAYS must be between 0 and {MAX_RETENTION_DAYS} (got {})",
                self.cancelled_retention_days
            );
        }
        if self.default_max_number < 1 {
            anyhow::bail!("DEFAULT_MAX_NUMBER must be >= 1");
        }
        Ok(self)
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let db_max_connections = parsed_or("DB_MAX_CONNECTIONS", 10u32);

        let defaults = BookingSettings::default();
        let clinic_offset =
            clinic_offset_from_minutes(parsed_or("CLINIC_UTC_OFFSET_MINUTES", 0i32))?;

        let booking = BookingSettings {
            schedule_window_days: parsed_or("SCHEDULE_WINDOW_DAYS", defaults.schedule_window_days),
            cancelled_retention_days: parsed_or(
                "CANCELLED_RETENTION_DAYS",
                defaults.cancelled_retention_days,
            ),
            default_max_number: parsed_or("DEFAULT_MAX_NUMBER", defaults.default_max_number),
            clinic_offset,
        }
        .validate()?;

        Ok(Self {
            database_url,
            bind_addr,
            db_max_connections,
            booking,
        })
    }
}
