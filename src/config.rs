use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use crate::executor::RetryPolicy;
use crate::limits::*;
use crate::model::*;

/// Startup configuration. Read from `SEATGATE_*` environment variables by `main`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Initial capacity per resource; resource ids are 1..=len.
    pub capacities: Vec<Seats>,
    pub workers: u32,
    pub table_slots: usize,
    pub retry_budget: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub think_time: Duration,
    pub seats_min: Seats,
    pub seats_max: Seats,
    pub run_duration: Duration,
    pub seed: Option<u64>,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacities: vec![500],
            workers: 4,
            table_slots: 5,
            retry_budget: 10,
            backoff_min: Duration::from_millis(20),
            backoff_max: Duration::from_millis(80),
            think_time: Duration::from_millis(500),
            seats_min: 5,
            seats_max: 10,
            run_duration: Duration::from_secs(60),
            seed: None,
            metrics_port: None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { key: &'static str, value: String },
    OutOfRange { key: &'static str, reason: &'static str },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { key, value } => write!(f, "invalid value for {key}: {value:?}"),
            ConfigError::OutOfRange { key, reason } => write!(f, "{key} out of range: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let d = Self::default();

        let capacities = match opt::<String>(&lookup, "SEATGATE_CAPACITIES")? {
            Some(list) => list
                .split(',')
                .map(|s| parse_value::<Seats>("SEATGATE_CAPACITIES", s.trim()))
                .collect::<Result<Vec<_>, _>>()?,
            None => {
                let count: usize = env_or(&lookup, "SEATGATE_RESOURCES", 1)?;
                let capacity: Seats = env_or(&lookup, "SEATGATE_CAPACITY", d.capacities[0])?;
                vec![capacity; count]
            }
        };

        let config = Self {
            capacities,
            workers: env_or(&lookup, "SEATGATE_WORKERS", d.workers)?,
            table_slots: env_or(&lookup, "SEATGATE_TABLE_SLOTS", d.table_slots)?,
            retry_budget: env_or(&lookup, "SEATGATE_RETRY_BUDGET", d.retry_budget)?,
            backoff_min: ms_or(&lookup, "SEATGATE_BACKOFF_MIN_MS", d.backoff_min)?,
            backoff_max: ms_or(&lookup, "SEATGATE_BACKOFF_MAX_MS", d.backoff_max)?,
            think_time: ms_or(&lookup, "SEATGATE_THINK_TIME_MS", d.think_time)?,
            seats_min: env_or(&lookup, "SEATGATE_SEATS_MIN", d.seats_min)?,
            seats_max: env_or(&lookup, "SEATGATE_SEATS_MAX", d.seats_max)?,
            run_duration: Duration::from_secs(env_or(
                &lookup,
                "SEATGATE_RUN_SECS",
                d.run_duration.as_secs(),
            )?),
            seed: opt(&lookup, "SEATGATE_SEED")?,
            metrics_port: opt(&lookup, "SEATGATE_METRICS_PORT")?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let check = |ok: bool, key: &'static str, reason: &'static str| {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::OutOfRange { key, reason })
            }
        };
        check(!self.capacities.is_empty(), "SEATGATE_RESOURCES", "need at least one resource")?;
        check(self.capacities.len() <= MAX_RESOURCES, "SEATGATE_RESOURCES", "too many resources")?;
        check(
            self.capacities.iter().all(|&c| c <= MAX_CAPACITY),
            "SEATGATE_CAPACITY",
            "capacity too large",
        )?;
        check(self.workers >= 1, "SEATGATE_WORKERS", "need at least one worker")?;
        check(self.workers <= MAX_WORKERS, "SEATGATE_WORKERS", "too many workers")?;
        check(self.table_slots >= 1, "SEATGATE_TABLE_SLOTS", "need at least one slot")?;
        check(self.table_slots <= MAX_TABLE_SLOTS, "SEATGATE_TABLE_SLOTS", "too many slots")?;
        check(self.retry_budget <= MAX_RETRY_BUDGET, "SEATGATE_RETRY_BUDGET", "budget too large")?;
        check(
            self.backoff_min <= self.backoff_max,
            "SEATGATE_BACKOFF_MIN_MS",
            "min backoff above max backoff",
        )?;
        check(self.backoff_max <= MAX_BACKOFF, "SEATGATE_BACKOFF_MAX_MS", "backoff too long")?;
        check(self.think_time <= MAX_THINK_TIME, "SEATGATE_THINK_TIME_MS", "think time too long")?;
        check(self.seats_min >= 1, "SEATGATE_SEATS_MIN", "must book at least one seat")?;
        check(self.seats_min <= self.seats_max, "SEATGATE_SEATS_MIN", "min seats above max seats")?;
        check(self.run_duration <= MAX_RUN_DURATION, "SEATGATE_RUN_SECS", "run too long")?;
        Ok(())
    }

    /// `(id, capacity)` pairs; ids start at 1.
    pub fn resources(&self) -> Vec<(ResourceId, Seats)> {
        (1..).zip(self.capacities.iter().copied()).collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            budget: self.retry_budget,
            backoff_min: self.backoff_min,
            backoff_max: self.backoff_max,
        }
    }

    pub fn seat_range(&self) -> RangeInclusive<Seats> {
        self.seats_min..=self.seats_max
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn opt<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key).map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => parse_value(key, &v).map(Some),
        _ => Ok(None),
    }
}

fn env_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    Ok(opt(lookup, key)?.unwrap_or(default))
}

fn ms_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    Ok(opt::<u64>(lookup, key)?.map_or(default, Duration::from_millis))
}
