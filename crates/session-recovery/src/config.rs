//! Recovery configuration and presets
//!
//! [`RecoveryConfig`] is immutable once handed to the orchestrator. It controls
//! retry bounds, backoff, the health-check cadence and the timeout budget of
//! every restoration step.
//!
//! # Usage Examples
//!
//! ```rust
//! use softphone_session_recovery::config::RecoveryConfig;
//! use std::time::Duration;
//!
//! let config = RecoveryConfig::new()
//!     .with_max_attempts(3)
//!     .with_base_retry_delay(Duration::from_millis(500))
//!     .with_health_check_interval(Duration::from_secs(5));
//!
//! assert_eq!(config.max_attempts, 3);
//! assert_eq!(config.retry_delay(1), Duration::from_millis(500));
//! assert_eq!(config.retry_delay(2), Duration::from_secs(1));
//! ```
//!
//! ## Loading from TOML
//!
//! ```rust
//! use softphone_session_recovery::config::RecoveryConfig;
//! use std::time::Duration;
//!
//! let config = RecoveryConfig::from_toml_str(r#"
//!     max_attempts = 8
//!     base_retry_delay_ms = 250
//!     call_control_timeout_ms = 20000
//! "#).unwrap();
//!
//! assert_eq!(config.max_attempts, 8);
//! assert_eq!(config.base_retry_delay, Duration::from_millis(250));
//! // Unspecified keys keep their defaults
//! assert_eq!(config.transport_timeout, Duration::from_secs(10));
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RecoveryError, RecoveryResult};

/// Serialize `Duration` fields as integer milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Configuration for the recovery orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Attempts allowed before recovery gives up and requires intervention
    pub max_attempts: u32,

    /// Delay before the first retry; doubles per consecutive failure
    #[serde(rename = "base_retry_delay_ms", with = "duration_ms")]
    pub base_retry_delay: Duration,

    /// Upper bound for the backoff delay
    #[serde(rename = "max_retry_delay_ms", with = "duration_ms")]
    pub max_retry_delay: Duration,

    /// How often the health aggregator polls every service
    #[serde(rename = "health_check_interval_ms", with = "duration_ms")]
    pub health_check_interval: Duration,

    /// Poll interval used while waiting for a service condition
    #[serde(rename = "condition_poll_interval_ms", with = "duration_ms")]
    pub condition_poll_interval: Duration,

    /// Budget for the transport to report connected
    #[serde(rename = "transport_timeout_ms", with = "duration_ms")]
    pub transport_timeout: Duration,

    /// Budget for call control to report connected and registered
    #[serde(rename = "call_control_timeout_ms", with = "duration_ms")]
    pub call_control_timeout: Duration,

    /// Budget for the presence service connect call
    #[serde(rename = "presence_timeout_ms", with = "duration_ms")]
    pub presence_timeout: Duration,

    /// Budget for the whole restore phase
    #[serde(rename = "restore_phase_timeout_ms", with = "duration_ms")]
    pub restore_phase_timeout: Duration,

    /// Budget for the best-effort agent profile refresh on completion
    #[serde(rename = "profile_refresh_timeout_ms", with = "duration_ms")]
    pub profile_refresh_timeout: Duration,

    /// Capacity of the broadcast channel carrying recovery events
    pub event_channel_capacity: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(2),
            condition_poll_interval: Duration::from_millis(200),
            transport_timeout: Duration::from_secs(10),
            call_control_timeout: Duration::from_secs(15),
            presence_timeout: Duration::from_secs(10),
            restore_phase_timeout: Duration::from_secs(45),
            profile_refresh_timeout: Duration::from_secs(5),
            event_channel_capacity: 64,
        }
    }
}

impl RecoveryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fast retries for desk phones on a reliable LAN
    ///
    /// Short timeouts and a low backoff ceiling, at the cost of more
    /// attempts against a server that is genuinely down.
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 8,
            base_retry_delay: Duration::from_millis(250),
            max_retry_delay: Duration::from_secs(5),
            health_check_interval: Duration::from_secs(1),
            transport_timeout: Duration::from_secs(5),
            call_control_timeout: Duration::from_secs(8),
            presence_timeout: Duration::from_secs(5),
            restore_phase_timeout: Duration::from_secs(20),
            ..Self::default()
        }
    }

    /// Slow retries for mobile or metered links
    pub fn conservative() -> Self {
        Self {
            max_attempts: 4,
            base_retry_delay: Duration::from_secs(3),
            max_retry_delay: Duration::from_secs(120),
            health_check_interval: Duration::from_secs(10),
            transport_timeout: Duration::from_secs(20),
            call_control_timeout: Duration::from_secs(30),
            presence_timeout: Duration::from_secs(20),
            restore_phase_timeout: Duration::from_secs(90),
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_retry_delay(mut self, delay: Duration) -> Self {
        self.base_retry_delay = delay;
        self
    }

    pub fn with_max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = delay;
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    pub fn with_condition_poll_interval(mut self, interval: Duration) -> Self {
        self.condition_poll_interval = interval;
        self
    }

    pub fn with_transport_timeout(mut self, timeout: Duration) -> Self {
        self.transport_timeout = timeout;
        self
    }

    pub fn with_call_control_timeout(mut self, timeout: Duration) -> Self {
        self.call_control_timeout = timeout;
        self
    }

    pub fn with_presence_timeout(mut self, timeout: Duration) -> Self {
        self.presence_timeout = timeout;
        self
    }

    pub fn with_restore_phase_timeout(mut self, timeout: Duration) -> Self {
        self.restore_phase_timeout = timeout;
        self
    }

    pub fn with_profile_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.profile_refresh_timeout = timeout;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Backoff delay to wait after the given (1-based) failed attempt
    ///
    /// `min(base_retry_delay * 2^(attempt - 1), max_retry_delay)`. Attempt 0
    /// is treated as attempt 1.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_retry_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_retry_delay)
    }

    /// Check the configuration for values the orchestrator cannot work with
    pub fn validate(&self) -> RecoveryResult<()> {
        if self.max_attempts == 0 {
            return Err(RecoveryError::invalid_config("max_attempts", "must be greater than zero"));
        }
        if self.base_retry_delay > self.max_retry_delay {
            return Err(RecoveryError::invalid_config(
                "base_retry_delay",
                "must not exceed max_retry_delay",
            ));
        }

        let non_zero = [
            ("health_check_interval", self.health_check_interval),
            ("condition_poll_interval", self.condition_poll_interval),
            ("transport_timeout", self.transport_timeout),
            ("call_control_timeout", self.call_control_timeout),
            ("presence_timeout", self.presence_timeout),
            ("restore_phase_timeout", self.restore_phase_timeout),
            ("profile_refresh_timeout", self.profile_refresh_timeout),
        ];
        for (field, value) in non_zero {
            if value.is_zero() {
                return Err(RecoveryError::invalid_config(field, "must be non-zero"));
            }
        }

        if self.event_channel_capacity == 0 {
            return Err(RecoveryError::invalid_config(
                "event_channel_capacity",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document; missing keys keep their defaults
    pub fn from_toml_str(input: &str) -> RecoveryResult<Self> {
        let config: Self = toml::from_str(input)
            .map_err(|e| RecoveryError::invalid_config("toml", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> RecoveryResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RecoveryError::invalid_config(path.display().to_string(), e.to_string())
        })?;
        Self::from_toml_str(&contents)
    }
}
