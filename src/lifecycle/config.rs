//! # Device Configuration
//!
//! [`DeviceConfig`] collects every tunable the device and its dispatcher use.
//! Defaults describe the stock mock robot: client id `MockRobot`, topics
//! under `robots/`, three seconds of simulated work, one publish attempt and no
//! duplicate suppression.
//!
//! ## Environment Variables
//!
//! [`DeviceConfig::from_env`] overlays these on the defaults:
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `ROBOT_CLIENT_ID` | Client id reported in logs |
//! | `ROBOT_TOPIC_ROOT` | First topic segment (default `robots`) |
//! | `ROBOT_WORK_MS` | Simulated work per order, in milliseconds |
//! | `ROBOT_PUBLISH_ATTEMPTS` | Completion publish attempts (1 = no retry) |
//! | `ROBOT_PUBLISH_BACKOFF_MS` | First retry delay (read on its own; default 200) |
//! | `ROBOT_PUBLISH_MAX_BACKOFF_MS` | Retry delay cap (default 5000) |
//! | `ROBOT_DEDUP_CAPACITY` | Tokens remembered for duplicate suppression (0 = off) |
//! | `ROBOT_DISPATCH_TIMEOUT_MS` | How long the dispatcher waits for a completion |

use crate::model::TopicScheme;
use crate::order_handler::{DuplicatePolicy, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CLIENT_ID: &str = "MockRobot";
pub const DEFAULT_WORK_DURATION: Duration = Duration::from_secs(3);
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(200);
const DEFAULT_RETRY_MAX_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got '{value}'")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub client_id: String,
    pub topics: TopicScheme,
    pub work_duration: Duration,
    pub publish_retry: RetryPolicy,
    pub duplicates: DuplicatePolicy,
    pub dispatch_timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            topics: TopicScheme::default(),
            work_duration: DEFAULT_WORK_DURATION,
            publish_retry: RetryPolicy::default(),
            duplicates: DuplicatePolicy::default(),
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }
}

impl DeviceConfig {
    /// Defaults overlaid with `ROBOT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each `ROBOT_*` key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(client_id) = lookup("ROBOT_CLIENT_ID") {
            config.client_id = client_id;
        }
        if let Some(root) = lookup("ROBOT_TOPIC_ROOT") {
            if root.is_empty() || root.contains(['/', '+', '#']) {
                return Err(ConfigError::InvalidValue {
                    key: "ROBOT_TOPIC_ROOT".into(),
                    value: root,
                    expected: "a single non-wildcard topic segment",
                });
            }
            config.topics = TopicScheme::new(root);
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "ROBOT_WORK_MS", "milliseconds")? {
            config.work_duration = Duration::from_millis(ms);
        }

        let attempts = parse::<u32, _>(&lookup, "ROBOT_PUBLISH_ATTEMPTS", "a positive integer")?;
        let initial = parse::<u64, _>(&lookup, "ROBOT_PUBLISH_BACKOFF_MS", "milliseconds")?;
        let max = parse::<u64, _>(&lookup, "ROBOT_PUBLISH_MAX_BACKOFF_MS", "milliseconds")?;
        if attempts.is_some() || initial.is_some() || max.is_some() {
            config.publish_retry = RetryPolicy::exponential(
                attempts.unwrap_or(config.publish_retry.max_attempts),
                initial.map(Duration::from_millis).unwrap_or(DEFAULT_RETRY_BACKOFF),
                max.map(Duration::from_millis).unwrap_or(DEFAULT_RETRY_MAX_BACKOFF),
            );
        }

        if let Some(capacity) = parse::<usize, _>(&lookup, "ROBOT_DEDUP_CAPACITY", "a non-negative integer")? {
            config.duplicates = match capacity {
                0 => DuplicatePolicy::Republish,
                capacity => DuplicatePolicy::Suppress { capacity },
            };
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "ROBOT_DISPATCH_TIMEOUT_MS", "milliseconds")? {
            config.dispatch_timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn parse<T, F>(lookup: &F, key: &str, expected: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
            expected,
        }),
    }
}
