use std::env;
use std::fmt;

use chrono::FixedOffset;

use crate::engine::DayPartition;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub calendar: CalendarConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("HAULCHECK_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let utc_offset_minutes = env::var("HAULCHECK_UTC_OFFSET_MINUTES")
            .unwrap_or_else(|_| "0".to_string())
            .parse::<i32>()
            .map_err(|_| ConfigError::InvalidUtcOffset)?;
        FixedOffset::east_opt(utc_offset_minutes * 60).ok_or(ConfigError::InvalidUtcOffset)?;

        let log_level = env::var("HAULCHECK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            calendar: CalendarConfig { utc_offset_minutes },
            telemetry: TelemetryConfig { log_level },
        })
    }
}

/// Local-time settings driving day and week partitioning.
#[derive(Debug, Clone)]
pub struct CalendarConfig {
    pub utc_offset_minutes: i32,
}

impl CalendarConfig {
    pub fn day_partition(&self) -> Result<DayPartition, ConfigError> {
        DayPartition::with_offset_minutes(self.utc_offset_minutes)
            .ok_or(ConfigError::InvalidUtcOffset)
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidUtcOffset,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidUtcOffset => write!(
                f,
                "HAULCHECK_UTC_OFFSET_MINUTES must be a whole number of minutes within a day"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("HAULCHECK_ENV");
        env::remove_var("HAULCHECK_UTC_OFFSET_MINUTES");
        env::remove_var("HAULCHECK_LOG_LEVEL");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.calendar.utc_offset_minutes, 0);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn rejects_unparseable_offset() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("HAULCHECK_UTC_OFFSET_MINUTES", "not-a-number");
        assert!(AppConfig::load().is_err());
        reset_env();
    }

    #[test]
    fn paris_winter_offset_builds_a_partition() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("HAULCHECK_UTC_OFFSET_MINUTES", "60");
        let config = AppConfig::load().expect("config loads");
        config.calendar.day_partition().expect("partition builds");
        reset_env();
    }
}
