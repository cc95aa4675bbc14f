use std::time::Duration;

use chrono::FixedOffset;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub max_connections: u32,
    pub fetch_timeout: Duration,
    pub zone: FixedOffset,
    pub recent_limit: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let database_url = match lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
            Some(url) => url,
            None => format!(
                "postgres://{}:{}@{}:{}/{}?sslmode={}",
                value("DB_USER", "postgres"),
                value("DB_PASS", "postgres"),
                value("DB_HOST", "localhost"),
                value("DB_PORT", "5432"),
                value("DB_NAME", "survey"),
                value("DB_SSLMODE", "disable"),
            ),
        };

        let max_connections = parse(
            "SURVEY_DB_MAX_CONNECTIONS",
            value("SURVEY_DB_MAX_CONNECTIONS", "5"),
            "a positive integer",
        )
        .and_then(|n: u32| positive("SURVEY_DB_MAX_CONNECTIONS", n))?;

        let timeout_secs: u64 = parse(
            "SURVEY_FETCH_TIMEOUT_SECS",
            value("SURVEY_FETCH_TIMEOUT_SECS", "30"),
            "a positive integer",
        )
        .and_then(|n: u64| positive("SURVEY_FETCH_TIMEOUT_SECS", n))?;

        let offset_raw = value("SURVEY_UTC_OFFSET_MINUTES", "0");
        let offset_minutes: i32 = parse(
            "SURVEY_UTC_OFFSET_MINUTES",
            offset_raw.clone(),
            "minutes east of UTC within ±24h",
        )?;
        let zone = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::Invalid {
                key: "SURVEY_UTC_OFFSET_MINUTES",
                expected: "minutes east of UTC within ±24h",
                value: offset_raw,
            })?;

        let recent_limit = parse(
            "SURVEY_RECENT_LIMIT",
            value("SURVEY_RECENT_LIMIT", "10"),
            "a non-negative integer",
        )?;

        Ok(Self {
            database_url,
            max_connections,
            fetch_timeout: Duration::from_secs(timeout_secs),
            zone,
            recent_limit,
        })
    }
}

fn parse<T: std::str::FromStr>(
    key: &'static str,
    raw: String,
    expected: &'static str,
) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        expected,
        value: raw,
    })
}

fn positive<T: Default + PartialOrd + ToString>(key: &'static str, n: T) -> Result<T, ConfigError> {
    if n > T::default() {
        Ok(n)
    } else {
        Err(ConfigError::Invalid {
            key,
            expected: "a positive integer",
            value: n.to_string(),
        })
    }
}
