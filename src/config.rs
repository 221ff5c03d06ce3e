use std::{env, fmt::Display, ops::RangeInclusive, path::PathBuf, str::FromStr};

use tracing::{info, warn};

use crate::engine::{Policy, DEFAULT_GAP_MINUTES, DEFAULT_MAX_DAYS_AHEAD};

const DEFAULT_ADMIN_PASSWORD: &str = "coffee123";

/// Accepted gap: one minute up to one week.
const GAP_MINUTES_RANGE: RangeInclusive<i64> = 1..=7 * 24 * 60;
/// Accepted booking window: one day up to ten years.
const MAX_DAYS_AHEAD_RANGE: RangeInclusive<i64> = 1..=3650;

/// Server settings, read once from `CAFEBOOK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub password: String,
    pub admin_user: String,
    pub admin_password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub gap_minutes: i64,
    pub max_days_ahead: i64,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let admin_password = env::var("CAFEBOOK_ADMIN_PASSWORD").unwrap_or_else(|_| {
            warn!("CAFEBOOK_ADMIN_PASSWORD not set, using the built-in default; change it");
            DEFAULT_ADMIN_PASSWORD.to_string()
        });

        Self {
            bind: try_load("CAFEBOOK_BIND", "0.0.0.0".to_string()),
            port: try_load("CAFEBOOK_PORT", 5433),
            data_dir: PathBuf::from(try_load("CAFEBOOK_DATA_DIR", "./data".to_string())),
            password: try_load("CAFEBOOK_PASSWORD", "cafebook".to_string()),
            admin_user: try_load("CAFEBOOK_ADMIN_USER", "admin".to_string()),
            admin_password,
            max_connections: try_load("CAFEBOOK_MAX_CONNECTIONS", 256),
            compact_threshold: try_load("CAFEBOOK_COMPACT_THRESHOLD", 1000),
            gap_minutes: try_load_in(
                "CAFEBOOK_GAP_MINUTES",
                GAP_MINUTES_RANGE,
                DEFAULT_GAP_MINUTES,
            ),
            max_days_ahead: try_load_in(
                "CAFEBOOK_MAX_DAYS_AHEAD",
                MAX_DAYS_AHEAD_RANGE,
                DEFAULT_MAX_DAYS_AHEAD,
            ),
            metrics_port: try_load_opt("CAFEBOOK_METRICS_PORT"),
            tls_cert: env::var("CAFEBOOK_TLS_CERT").ok(),
            tls_key: env::var("CAFEBOOK_TLS_KEY").ok(),
        }
    }

    pub fn policy(&self) -> Policy {
        Policy::new(self.gap_minutes, self.max_days_ahead)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => parse_or(key, &raw, default),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}

fn try_load_in(key: &str, range: RangeInclusive<i64>, default: i64) -> i64 {
    let value = try_load(key, default);
    in_range_or(key, value, range, default)
}

fn in_range_or(key: &str, value: i64, range: RangeInclusive<i64>, default: i64) -> i64 {
    if range.contains(&value) {
        value
    } else {
        warn!(
            "{key} value {value} outside {}..={}, using default: {default}",
            range.start(),
            range.end()
        );
        default
    }
}

fn try_load_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = env::var(key).ok()?;
    raw.trim()
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, ignoring");
        })
        .ok()
}

fn parse_or<T>(key: &str, raw: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    raw.trim().parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
        default
    })
}
