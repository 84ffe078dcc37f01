// Timeouts, topics, ramp and link configuration
use std::path::Path;

use serde::Deserialize;

use crate::protocol::{FrameKey, KeyError};

// Control loop frequency (100 Hz = 10 ms ramp cadence)
pub const LOOP_HZ: u64 = 100;

// Receiver watchdog: emergency stop after this much link silence
pub const WATCHDOG_TIMEOUT_MS: u64 = 2000;

// Status publishing interval (both sides)
pub const STATUS_INTERVAL_MS: u64 = 5000;

// Motor ramp: PWM units per update, and update interval
pub const RAMP_STEP: u8 = 10;
pub const RAMP_INTERVAL_MS: u16 = 10;

// Speed used for movement commands when no speed was ever set (0-255)
pub const DEFAULT_SPEED: u8 = 200;

// Transmitter keepalive: repeat the last command while the command source is alive
pub const KEEPALIVE_MS: u64 = 500;
pub const SOURCE_TIMEOUT_MS: u64 = 1000;

// Zenoh topics
pub const TOPIC_CMD: &str = "tank/cmd"; // command requests -> transmitter
pub const TOPIC_TX_STATUS: &str = "tank/state/transmitter";
pub const TOPIC_RX_STATUS: &str = "tank/state/receiver";

// Radio modem serial defaults (LoRa UART module in transparent mode)
pub const RADIO_PORT: &str = "/dev/ttyUSB0";
pub const RADIO_BAUDRATE: u32 = 115_200;

// Identifier reported in transmitter status messages
pub const TANK_ID: &str = "tank_001";

/// Error raised while loading or validating the runtime configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("No link key configured (use --key or TANK_LINK_KEY)")]
    MissingKey,

    #[error("Invalid link key: {0}")]
    Key(#[from] KeyError),
}

/// Tunable knobs shared by transmitter and receiver.
///
/// Every field has a default taken from the constants above, so a config
/// file only needs to name the values it changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub loop_hz: u64,
    pub ramp_step: u8,
    pub ramp_interval_ms: u16,
    pub watchdog_timeout_ms: u64,
    pub status_interval_ms: u64,
    pub default_speed: u8,
    pub keepalive_ms: u64,
    pub source_timeout_ms: u64,
    /// Accept any authenticated frame after this much silence (transmitter reboot recovery).
    ///
    /// Unset by default: a rebooted transmitter restarts its sequence at 0
    /// and the receiver rejects it as stale until it passes the last
    /// accepted value. Recovering from a transmitter reboot then needs
    /// either a receiver restart or this window set.
    pub resync_after_ms: Option<u64>,
    pub radio_port: String,
    pub radio_baudrate: u32,
    /// Serial port of the H-bridge board; motors are simulated when unset
    pub motor_port: Option<String>,
    pub tank_id: String,
    /// 64 hex characters
    pub key: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            loop_hz: LOOP_HZ,
            ramp_step: RAMP_STEP,
            ramp_interval_ms: RAMP_INTERVAL_MS,
            watchdog_timeout_ms: WATCHDOG_TIMEOUT_MS,
            status_interval_ms: STATUS_INTERVAL_MS,
            default_speed: DEFAULT_SPEED,
            keepalive_ms: KEEPALIVE_MS,
            source_timeout_ms: SOURCE_TIMEOUT_MS,
            resync_after_ms: None,
            radio_port: RADIO_PORT.to_string(),
            radio_baudrate: RADIO_BAUDRATE,
            motor_port: None,
            tank_id: TANK_ID.to_string(),
            key: None,
        }
    }
}

impl RuntimeConfig {
    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let config: Self = serde_json::from_str(text)?;
        Ok(config.normalized())
    }

    /// Clamp knobs that must be non-zero
    pub fn normalized(mut self) -> Self {
        self.ramp_step = self.ramp_step.max(1);
        self.ramp_interval_ms = self.ramp_interval_ms.max(1);
        self.loop_hz = self.loop_hz.clamp(1, 1000);
        self
    }

    pub fn loop_period_ms(&self) -> u64 {
        (1000 / self.loop_hz.max(1)).max(1)
    }

    pub fn frame_key(&self) -> Result<FrameKey, ConfigError> {
        let hex = self.key.as_deref().ok_or(ConfigError::MissingKey)?;
        Ok(FrameKey::from_hex(hex)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = RuntimeConfig::default();
        assert_eq!(config.watchdog_timeout_ms, 2000);
        assert_eq!(config.status_interval_ms, 5000);
        assert_eq!(config.default_speed, 200);
        assert_eq!(config.ramp_step, 10);
        assert_eq!(config.ramp_interval_ms, 10);
        assert_eq!(config.loop_period_ms(), 10);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json(r#"{"ramp_step": 4, "watchdog_timeout_ms": 1500}"#)
            .expect("valid json");
        assert_eq!(config.ramp_step, 4);
        assert_eq!(config.watchdog_timeout_ms, 1500);
        assert_eq!(config.default_speed, DEFAULT_SPEED);
        assert!(config.motor_port.is_none());
    }

    #[test]
    fn test_zero_ramp_knobs_are_clamped() {
        let config = RuntimeConfig::from_json(r#"{"ramp_step": 0, "ramp_interval_ms": 0}"#)
            .expect("valid json");
        assert_eq!(config.ramp_step, 1);
        assert_eq!(config.ramp_interval_ms, 1);
    }

    #[test]
    fn test_missing_key_is_reported() {
        let config = RuntimeConfig::default();
        assert!(matches!(config.frame_key(), Err(ConfigError::MissingKey)));
    }

    #[test]
    fn test_key_from_config() {
        let config = RuntimeConfig {
            key: Some("11".repeat(32)),
            ..RuntimeConfig::default()
        };
        assert!(config.frame_key().is_ok());
    }
}
