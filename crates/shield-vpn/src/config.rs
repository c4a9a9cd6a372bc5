//! Tunnel Configuration
//!
//! Provides the configuration handed to the tunnel engine for one
//! connection attempt, and the tuning knobs of the lifecycle controller.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Username/password pair for engines that do not autologin
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Create a new credential pair
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration for a single tunnel session
///
/// The payload is opaque to this crate; only the engine interprets it
/// (for OpenVPN engines it is the `.ovpn` file body).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfiguration {
    payload: Vec<u8>,
    credentials: Option<Credentials>,
    label: Option<String>,
}

impl TunnelConfiguration {
    /// Create a configuration from an engine payload
    pub fn new(payload: impl Into<Vec<u8>>) -> Result<Self, ConfigError> {
        let payload = payload.into();
        if payload.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(ConfigError::EmptyPayload);
        }

        Ok(Self {
            payload,
            credentials: None,
            label: None,
        })
    }

    /// Attach credentials
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Attach a display label (server name)
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Raw engine payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Embedded credentials, if any
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Display label, if any
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// Upper bound for every controller delay and timeout (one day)
const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Lifecycle controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Settle delay the engine waits before reconnecting (seconds)
    pub reconnect_delay_secs: u64,
    /// Reconnect when the device regains Wi-Fi while connected
    pub reconnect_on_wifi_regain: bool,
    /// Maximum time a negotiation may take (seconds)
    pub negotiation_timeout_secs: u64,
    /// Maximum time to wait for the engine to confirm teardown (seconds)
    pub teardown_timeout_secs: u64,
    /// Capacity of the command queue
    pub command_buffer: usize,
}

impl ControllerConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn negotiation_timeout(&self) -> Duration {
        Duration::from_secs(self.negotiation_timeout_secs)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_secs(self.teardown_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.negotiation_timeout_secs) {
            return Err(ConfigError::InvalidTimeout("negotiation"));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.teardown_timeout_secs) {
            return Err(ConfigError::InvalidTimeout("teardown"));
        }
        if self.reconnect_delay_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::InvalidTimeout("reconnect delay"));
        }
        if self.command_buffer == 0 {
            return Err(ConfigError::InvalidBuffer);
        }
        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: 5,
            reconnect_on_wifi_regain: true,
            negotiation_timeout_secs: 30,
            teardown_timeout_secs: 10,
            command_buffer: 32,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Tunnel configuration payload is empty")]
    EmptyPayload,

    #[error("Invalid {0}: must be at most 86400 seconds (timeouts also non-zero)")]
    InvalidTimeout(&'static str),

    #[error("Command buffer must be non-zero")]
    InvalidBuffer,
}
