//! Tuning constants, backoff policy, and connection configuration.
//!
//! The retry budgets here are deliberately independent: connect-level
//! (bounded, exponential), send-level (bounded, linear), status-level
//! (bounded, linear) and busy-level (bounded only by the phase deadline,
//! exponential with a cap). They never share counters.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::PedError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Attempts per command exchange before `SendExhausted`.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Attempts per connection establishment before `ConnectExhausted`.
pub const MAX_CONNECTION_RETRY_ATTEMPTS: u32 = 3;

/// Base unit for every backoff schedule.
pub const BASE_BACKOFF_DELAY_MS: u64 = 1000;

/// Ceiling for exponential backoff.
pub const MAX_BACKOFF_DELAY_MS: u64 = 30_000;

/// Single-read receive buffer; the gateway sends one frame per reply.
pub const RECV_BUFFER_BYTES: usize = 16 * 1024;

/// Pause between idle-gate polls while the PED is not yet idle.
pub const IDLE_GATE_SLEEP: Duration = Duration::from_secs(3);

/// Default pause between poll-loop iterations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default transaction phase deadline.
pub const DEFAULT_BASE_TIMEOUT: Duration = Duration::from_secs(120);

/// Phase deadline for X/Z report transactions.
pub const REPORT_TIMEOUT: Duration = Duration::from_secs(60);

/// Phase deadline once an `updateTransaction` has been sent.
pub const EXTENDED_TIMEOUT: Duration = Duration::from_secs(150);

/// Tighter safety threshold applied before the first update has been sent.
pub const PRE_UPDATE_SAFETY_THRESHOLD: Duration = Duration::from_secs(90);

/// Fixed pause after the gateway reports "Command timed out" (error 101).
pub const COMMAND_TIMEOUT_SLEEP: Duration = Duration::from_secs(15);

/// Default wire-log path.
pub const DEFAULT_LOG_PATH: &str = "ngenius.log";

// 2^5 * base already exceeds the cap, so larger exponents are pointless.
const MAX_BACKOFF_EXPONENT: u32 = 5;

// ---------------------------------------------------------------------------
// Backoff policy
// ---------------------------------------------------------------------------

/// Exponential backoff for 1-based attempt `k`: `base * 2^(k-1)`, capped at
/// [`MAX_BACKOFF_DELAY_MS`]. Yields 1s, 2s, 4s, 8s, 16s, 30s, 30s, ...
pub fn exponential_backoff(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    Duration::from_millis((BASE_BACKOFF_DELAY_MS << exp).min(MAX_BACKOFF_DELAY_MS))
}

/// Linear backoff for 1-based attempt `k`: `base * k`. Yields 1s, 2s, 3s.
pub fn linear_backoff(attempt: u32) -> Duration {
    Duration::from_millis(BASE_BACKOFF_DELAY_MS * u64::from(attempt))
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection settings for one PED behind an NGPAS gateway.
///
/// Hosts usually persist this as a JSON settings object; see
/// [`PedConfig::from_value`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PedConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_log_path")]
    pub log_path: String,
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_read_timeout_ms() -> u64 {
    10_000
}

fn default_log_path() -> String {
    DEFAULT_LOG_PATH.to_string()
}

impl PedConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            log_path: default_log_path(),
        }
    }

    /// Build from a JSON settings object (`{"host": ..., "port": ...}`).
    pub fn from_value(details: &serde_json::Value) -> Result<Self, PedError> {
        serde_json::from_value(details.clone()).map_err(|e| PedError::Config(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let delays: Vec<u64> = (1..=8)
            .map(|k| exponential_backoff(k).as_millis() as u64)
            .collect();
        assert_eq!(delays, [1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]);
    }

    #[test]
    fn test_connect_backoff_first_three_attempts() {
        let delays: Vec<u64> = (1..=3)
            .map(|k| exponential_backoff(k).as_millis() as u64)
            .collect();
        assert_eq!(delays, [1000, 2000, 4000]);
    }

    #[test]
    fn test_linear_backoff_sequence() {
        let delays: Vec<u64> = (1..=3)
            .map(|k| linear_backoff(k).as_millis() as u64)
            .collect();
        assert_eq!(delays, [1000, 2000, 3000]);
    }

    #[test]
    fn test_config_from_value_defaults() {
        let details = serde_json::json!({"host": "192.168.1.50", "port": 5000});
        let config = PedConfig::from_value(&details).unwrap();
        assert_eq!(config.host, "192.168.1.50");
        assert_eq!(config.port, 5000);
        assert_eq!(config.connect_timeout_ms, 5000);
        assert_eq!(config.read_timeout_ms, 10_000);
        assert_eq!(config.log_path, "ngenius.log");
    }

    #[test]
    fn test_config_from_value_overrides() {
        let details = serde_json::json!({
            "host": "ped.local",
            "port": 6000,
            "connectTimeoutMs": 2500,
            "readTimeoutMs": 20000,
            "logPath": "/var/log/ped.log",
        });
        let config = PedConfig::from_value(&details).unwrap();
        assert_eq!(config.connect_timeout_ms, 2500);
        assert_eq!(config.read_timeout_ms, 20_000);
        assert_eq!(config.log_path, "/var/log/ped.log");
    }

    #[test]
    fn test_config_from_value_missing_host_errors() {
        let details = serde_json::json!({"port": 5000});
        assert!(PedConfig::from_value(&details).is_err());
    }
}
