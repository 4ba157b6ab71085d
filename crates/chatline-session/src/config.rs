//! Environment-backed session configuration.

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use chatline_core::cipher::DEFAULT_KEY;
use thiserror::Error;

use crate::backoff::BackoffPolicy;

const DEFAULT_ENDPOINT: &str = "ws://localhost:8080";
const DEFAULT_RECONNECT_BASE_MS: u64 = 1_000;
const DEFAULT_RECONNECT_CAP: u32 = 5;
const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 60_000;
const DEFAULT_HEARTBEAT_WINDOW_MS: u64 = 3 * 60 * 60 * 1_000;
const DEFAULT_SEND_RETRY_BASE_MS: u64 = 1_000;
const DEFAULT_SEND_MAX_RETRIES: u32 = 3;

/// Errors produced while parsing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid {key}='{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Backend endpoint, for example `ws://localhost:8080`.
    pub endpoint: String,
    /// Key for the content cipher.
    pub cipher_key: String,
    /// Reconnect backoff after abnormal closes.
    pub reconnect: BackoffPolicy,
    /// Period of the liveness probe.
    pub heartbeat_interval: Duration,
    /// Connected time after which the heartbeat stops.
    pub heartbeat_window: Duration,
    /// Base delay of outbound retries while disconnected.
    pub send_retry_base: Duration,
    /// Retry budget of one outbound message.
    pub send_max_retries: u32,
    /// Directory for persisted client state; `None` uses the platform default.
    pub state_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            cipher_key: DEFAULT_KEY.to_owned(),
            reconnect: BackoffPolicy::new(
                Duration::from_millis(DEFAULT_RECONNECT_BASE_MS),
                DEFAULT_RECONNECT_CAP,
            ),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            heartbeat_window: Duration::from_millis(DEFAULT_HEARTBEAT_WINDOW_MS),
            send_retry_base: Duration::from_millis(DEFAULT_SEND_RETRY_BASE_MS),
            send_max_retries: DEFAULT_SEND_MAX_RETRIES,
            state_dir: None,
        }
    }
}

impl SessionConfig {
    /// Parse configuration from `CHATLINE_*` environment variables.
    ///
    /// # Errors
    /// Returns error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let endpoint = optional_trimmed("CHATLINE_ENDPOINT", &mut lookup)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned());
        let cipher_key = optional_trimmed("CHATLINE_CIPHER_KEY", &mut lookup)
            .unwrap_or_else(|| DEFAULT_KEY.to_owned());

        let reconnect_base_ms =
            parse_or("CHATLINE_RECONNECT_BASE_MS", DEFAULT_RECONNECT_BASE_MS, &mut lookup)?;
        let reconnect_cap = parse_or("CHATLINE_RECONNECT_CAP", DEFAULT_RECONNECT_CAP, &mut lookup)?;
        let heartbeat_interval_ms = parse_or(
            "CHATLINE_HEARTBEAT_INTERVAL_MS",
            DEFAULT_HEARTBEAT_INTERVAL_MS,
            &mut lookup,
        )?;
        let heartbeat_window_ms = parse_or(
            "CHATLINE_HEARTBEAT_WINDOW_MS",
            DEFAULT_HEARTBEAT_WINDOW_MS,
            &mut lookup,
        )?;
        let send_retry_base_ms =
            parse_or("CHATLINE_SEND_RETRY_BASE_MS", DEFAULT_SEND_RETRY_BASE_MS, &mut lookup)?;
        let send_max_retries =
            parse_or("CHATLINE_SEND_MAX_RETRIES", DEFAULT_SEND_MAX_RETRIES, &mut lookup)?;
        let state_dir = optional_trimmed("CHATLINE_STATE_DIR", &mut lookup).map(PathBuf::from);

        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                key: "CHATLINE_ENDPOINT",
                value: endpoint,
                reason: "must be a ws:// or wss:// URL".to_owned(),
            });
        }
        if heartbeat_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CHATLINE_HEARTBEAT_INTERVAL_MS",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if reconnect_cap > 20 {
            return Err(ConfigError::InvalidValue {
                key: "CHATLINE_RECONNECT_CAP",
                value: reconnect_cap.to_string(),
                reason: "must be at most 20".to_owned(),
            });
        }

        Ok(Self {
            endpoint,
            cipher_key,
            reconnect: BackoffPolicy::new(Duration::from_millis(reconnect_base_ms), reconnect_cap),
            heartbeat_interval: Duration::from_millis(heartbeat_interval_ms),
            heartbeat_window: Duration::from_millis(heartbeat_window_ms),
            send_retry_base: Duration::from_millis(send_retry_base_ms),
            send_max_retries,
            state_dir,
        })
    }

    /// Retry policy of outbound sends: `base * 2^n`, uncapped within the budget.
    #[must_use]
    pub fn send_retry(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.send_retry_base, self.send_max_retries)
    }
}

fn optional_trimmed<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_or<T, F>(key: &'static str, default: T, lookup: &mut F) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed(key, lookup) else {
        return Ok(default);
    };
    value.parse::<T>().map_err(|err| ConfigError::InvalidValue {
        key,
        reason: err.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<SessionConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        SessionConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        assert_eq!(from_pairs(&[]).unwrap(), SessionConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = from_pairs(&[
            ("CHATLINE_ENDPOINT", " wss://chat.example.org/ws "),
            ("CHATLINE_RECONNECT_BASE_MS", "250"),
            ("CHATLINE_SEND_MAX_RETRIES", "5"),
            ("CHATLINE_STATE_DIR", "/tmp/chatline"),
        ])
        .unwrap();

        assert_eq!(config.endpoint, "wss://chat.example.org/ws");
        assert_eq!(config.reconnect.base(), Duration::from_millis(250));
        assert_eq!(config.send_max_retries, 5);
        assert_eq!(config.state_dir, Some(PathBuf::from("/tmp/chatline")));
    }

    #[test]
    fn rejects_unparseable_numbers() {
        let err = from_pairs(&[("CHATLINE_HEARTBEAT_INTERVAL_MS", "soon")]).unwrap_err();
        let ConfigError::InvalidValue { key, value, .. } = err;
        assert_eq!(key, "CHATLINE_HEARTBEAT_INTERVAL_MS");
        assert_eq!(value, "soon");
    }

    #[test]
    fn rejects_non_websocket_endpoint() {
        assert!(from_pairs(&[("CHATLINE_ENDPOINT", "http://localhost")]).is_err());
    }

    #[test]
    fn rejects_zero_heartbeat_interval() {
        assert!(from_pairs(&[("CHATLINE_HEARTBEAT_INTERVAL_MS", "0")]).is_err());
    }
}
