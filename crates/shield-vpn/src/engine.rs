//! Tunnel Engine
//!
//! Capability interface of the external component that performs the
//! actual encrypted negotiation and packet tunneling (an OpenVPN adapter,
//! a WireGuard backend, or a mock in tests).
//!
//! # Contract
//!
//! 1. The controller calls [`TunnelEngine::attach`] once, handing the
//!    engine an [`EngineEvents`] handle.
//! 2. `apply` evaluates a configuration synchronously.
//! 3. `connect`, `disconnect` and `reconnect` only *request* work; the
//!    outcome is reported later through [`EngineEvents`], from any thread.
//! 4. Network settings must be acknowledged: the engine waits on the
//!    returned [`SettingsAck`] before routing traffic.

use crate::config::{Credentials, TunnelConfiguration};
use crate::controller::TunnelError;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Result of evaluating a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigEvaluation {
    /// Engine can authenticate without a username/password
    pub autologin: bool,
}

impl ConfigEvaluation {
    /// Check if the engine needs credentials before connecting
    pub fn requires_credentials(&self) -> bool {
        !self.autologin
    }
}

/// Network settings generated by the engine (addresses, routes, DNS)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSettings {
    /// Address of the remote tunnel endpoint
    pub remote_address: String,
    /// Interface addresses with prefix length
    pub addresses: Vec<(IpAddr, u8)>,
    /// Routes sent through the tunnel
    pub included_routes: Vec<(IpAddr, u8)>,
    /// DNS servers to use inside the tunnel
    pub dns_servers: Vec<IpAddr>,
    /// Tunnel MTU
    pub mtu: Option<u16>,
}

/// Errors reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Engine rejected request: {0}")]
    Rejected(String),

    #[error("Connection lost")]
    ConnectionLost,

    #[error("{0}")]
    Other(String),
}

/// External tunnel engine
///
/// All methods are invoked from the controller task, one at a time.
pub trait TunnelEngine: Send + 'static {
    /// Receive the event handle used to report asynchronous outcomes
    fn attach(&mut self, events: EngineEvents);

    /// Apply a configuration for the next session
    fn apply(&mut self, config: &TunnelConfiguration) -> Result<ConfigEvaluation, EngineError>;

    /// Provide username/password for the next session
    fn provide_credentials(&mut self, credentials: &Credentials) -> Result<(), EngineError>;

    /// Begin negotiating the session
    fn connect(&mut self);

    /// Tear down the session; completion is reported with `disconnected`
    fn disconnect(&mut self);

    /// Re-establish the session after `after` has elapsed
    fn reconnect(&mut self, after: Duration);
}

/// Event reported by the engine
#[derive(Debug)]
pub(crate) enum EngineEvent {
    NetworkSettings {
        settings: NetworkSettings,
        ack: oneshot::Sender<Result<(), TunnelError>>,
    },
    Failed(EngineError),
    Disconnected,
}

/// Handle the engine uses to report back to the controller
///
/// Cheap to clone and safe to use from any thread. Log lines travel on
/// their own queue so they never hold back state-changing work.
#[derive(Debug, Clone)]
pub struct EngineEvents {
    tx: mpsc::UnboundedSender<EngineEvent>,
    log_tx: mpsc::UnboundedSender<String>,
}

/// Receiving ends owned by the controller task
pub(crate) struct EngineReceivers {
    pub events: mpsc::UnboundedReceiver<EngineEvent>,
    pub logs: mpsc::UnboundedReceiver<String>,
}

impl EngineEvents {
    pub(crate) fn channel() -> (Self, EngineReceivers) {
        let (tx, events) = mpsc::unbounded_channel();
        let (log_tx, logs) = mpsc::unbounded_channel();
        (Self { tx, log_tx }, EngineReceivers { events, logs })
    }

    /// Report generated network settings
    ///
    /// The returned ack resolves once the settings have been applied to
    /// the host (or refused).
    pub fn network_settings(&self, settings: NetworkSettings) -> SettingsAck {
        let (ack, rx) = oneshot::channel();
        if self
            .tx
            .send(EngineEvent::NetworkSettings { settings, ack })
            .is_err()
        {
            debug!("Controller gone, network settings dropped");
        }
        SettingsAck(rx)
    }

    /// Report a session failure
    pub fn failed(&self, error: EngineError) {
        self.send(EngineEvent::Failed(error));
    }

    /// Report that the session has been torn down
    pub fn disconnected(&self) {
        self.send(EngineEvent::Disconnected);
    }

    /// Forward an engine log line
    pub fn log(&self, message: impl Into<String>) {
        if self.log_tx.send(message.into()).is_err() {
            debug!("Controller gone, engine log dropped");
        }
    }

    fn send(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            debug!("Controller gone, engine event dropped");
        }
    }
}

/// Pending acknowledgement of reported network settings
#[derive(Debug)]
pub struct SettingsAck(oneshot::Receiver<Result<(), TunnelError>>);

impl SettingsAck {
    /// Wait for the controller's verdict
    pub async fn wait(self) -> Result<(), TunnelError> {
        self.0.await.unwrap_or(Err(TunnelError::ControllerClosed))
    }

    /// Blocking variant for engines calling back on their own threads
    pub fn blocking_wait(self) -> Result<(), TunnelError> {
        self.0.blocking_recv().unwrap_or(Err(TunnelError::ControllerClosed))
    }
}
