//! Tunnel State
//!
//! The lifecycle states of a tunnel session and the edges allowed
//! between them.
//!
//! ```text
//! Idle          -> Connecting
//! Connecting    -> Connected | Failed | Disconnecting
//! Connected     -> Reconnecting | Disconnecting | Failed
//! Reconnecting  -> Connected | Failed | Disconnecting
//! Disconnecting -> Idle
//! Failed        -> Idle
//! ```
//!
//! `Failed` is left only by an explicit `start` (through `Idle`) or `stop`.

use std::fmt;
use std::time::Instant;

/// Tunnel lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelState {
    /// No session
    Idle,
    /// Engine is negotiating a new session
    Connecting,
    /// Network settings applied, tunnel is up
    Connected,
    /// Engine is re-establishing an existing session
    Reconnecting,
    /// Teardown requested, waiting for the engine to confirm
    Disconnecting,
    /// Session failed; holds a human-readable reason
    Failed(String),
}

impl TunnelState {
    /// Check if the tunnel is usable
    pub fn is_connected(&self) -> bool {
        matches!(self, TunnelState::Connected)
    }

    /// Check if a session is being negotiated
    pub fn is_negotiating(&self) -> bool {
        matches!(self, TunnelState::Connecting | TunnelState::Reconnecting)
    }

    /// Check if the state is a failure
    pub fn is_failed(&self) -> bool {
        matches!(self, TunnelState::Failed(_))
    }

    /// Check if an engine session is bound to this state
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TunnelState::Connecting
                | TunnelState::Connected
                | TunnelState::Reconnecting
                | TunnelState::Disconnecting
        )
    }

    /// Check if `start` is accepted from this state
    pub fn accepts_start(&self) -> bool {
        matches!(self, TunnelState::Idle | TunnelState::Failed(_))
    }

    /// Check whether `self -> next` is an edge of the state machine
    pub fn can_transition_to(&self, next: &TunnelState) -> bool {
        use TunnelState::*;

        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Connected)
                | (Connecting, Failed(_))
                | (Connecting, Disconnecting)
                | (Connected, Reconnecting)
                | (Connected, Disconnecting)
                | (Connected, Failed(_))
                | (Reconnecting, Connected)
                | (Reconnecting, Failed(_))
                | (Reconnecting, Disconnecting)
                | (Disconnecting, Idle)
                | (Failed(_), Idle)
        )
    }
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelState::Idle => write!(f, "idle"),
            TunnelState::Connecting => write!(f, "connecting"),
            TunnelState::Connected => write!(f, "connected"),
            TunnelState::Reconnecting => write!(f, "reconnecting"),
            TunnelState::Disconnecting => write!(f, "disconnecting"),
            TunnelState::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Snapshot of the session published to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelStatus {
    /// Current state
    pub state: TunnelState,
    /// Label of the active configuration (usually the server name)
    pub label: Option<String>,
    /// When the tunnel last came up
    pub connected_since: Option<Instant>,
}

impl TunnelStatus {
    pub(crate) fn idle() -> Self {
        Self {
            state: TunnelState::Idle,
            label: None,
            connected_since: None,
        }
    }

    /// Check if the tunnel is usable
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }
}

impl Default for TunnelStatus {
    fn default() -> Self {
        Self::idle()
    }
}
