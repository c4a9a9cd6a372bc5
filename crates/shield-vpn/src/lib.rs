//! Shield VPN - Tunnel Lifecycle
//!
//! Drives an external tunnel engine (OpenVPN adapter, WireGuard backend)
//! through a serialized state machine. The cryptographic tunnel itself is
//! not implemented here; the engine is reached through the
//! [`TunnelEngine`] capability trait.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  commands   ┌──────────────────────┐  apply/connect  ┌──────────────┐
//! │ UI / deep    │────────────▶│  TunnelController     │────────────────▶│ TunnelEngine │
//! │ links        │◀────────────│  (single actor task)  │◀────────────────│  (external)  │
//! └──────────────┘   status    └──────────┬───────────┘  EngineEvents   └──────────────┘
//!                                  ▲      │ network settings
//!                      path events │      ▼
//!                 ┌────────────────┴──┐ ┌──────────────┐
//!                 │ReachabilityMonitor│ │  TunnelHost   │
//!                 └───────────────────┘ └──────────────┘
//! ```
//!
//! # Reconnect policy
//!
//! Only regaining Wi-Fi (from cellular or no network) while connected
//! triggers a reconnect, after a settle delay of 5 seconds by default.
//! Every other failure is reported to the caller, who decides whether
//! to retry.

mod config;
mod controller;
mod deep_link;
mod engine;
mod host;
mod reachability;
mod state;

pub use config::{ConfigError, ControllerConfig, Credentials, TunnelConfiguration};
pub use controller::{PendingStart, TunnelController, TunnelError};
pub use deep_link::DeepLink;
pub use engine::{
    ConfigEvaluation, EngineError, EngineEvents, NetworkSettings, SettingsAck, TunnelEngine,
};
pub use host::{HostError, TunnelHost};
pub use reachability::{NetworkPathStatus, PathListener, PathProbe, ReachabilityMonitor};
pub use state::{TunnelState, TunnelStatus};
