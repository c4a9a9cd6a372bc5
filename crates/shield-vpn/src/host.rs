//! Host OS tunnel integration
//!
//! The OS facility that owns the virtual interface. The controller hands
//! it the engine's network settings before declaring a session connected.

use crate::engine::NetworkSettings;

/// OS tunnel facility
pub trait TunnelHost: Send + 'static {
    /// Install network settings for the tunnel interface
    fn set_network_settings(&mut self, settings: &NetworkSettings) -> Result<(), HostError>;

    /// Remove previously installed settings
    fn clear_network_settings(&mut self) {}
}

/// Host errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Host refused network settings: {0}")]
pub struct HostError(pub String);
