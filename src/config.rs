use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub dispatch: DispatchConfig,
}

/// Deadline windows and the retry cap for the assignment lifecycle.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// Partner must accept within this window.
    pub acceptance_window: Duration,
    /// Accepted order must be picked up within this window.
    pub pickup_window: Duration,
    /// Total delivery window, counted from pickup.
    pub delivery_window: Duration,
    /// An order that would start this many attempts is cancelled instead of
    /// re-queued.
    pub max_attempts: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            acceptance_window: Duration::from_secs(75),
            pickup_window: Duration::from_secs(300),
            delivery_window: Duration::from_secs(1200),
            max_attempts: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let defaults = DispatchConfig::default();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            dispatch: DispatchConfig {
                acceptance_window: Duration::from_secs(parse_or_default(
                    "ACCEPTANCE_WINDOW_SECS",
                    defaults.acceptance_window.as_secs(),
                )?),
                pickup_window: Duration::from_secs(parse_or_default(
                    "PICKUP_WINDOW_SECS",
                    defaults.pickup_window.as_secs(),
                )?),
                delivery_window: Duration::from_secs(parse_or_default(
                    "DELIVERY_WINDOW_SECS",
                    defaults.delivery_window.as_secs(),
                )?),
                max_attempts: parse_or_default("MAX_ASSIGNMENT_ATTEMPTS", defaults.max_attempts)?,
            },
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
