//! Shield Network Layer
//!
//! Talks to the VPN reseller backend over HTTPS.
//!
//! Architecture:
//! 1. `HttpClient`: hyper HTTP/1.1 over rustls, one connection per request
//! 2. `ResellerClient`: typed endpoints, bearer auth, JSON envelopes
//! 3. `ProvisioningService`: validates a fixed credential pair into an account

mod client;
mod models;
mod provisioning;
mod reseller;

pub use client::{ClientStats, HttpClient, HttpClientConfig, HttpError, Response};
pub use models::{
    AccountRecord, OvpnConfigPayload, ServerDescriptor, UsernameCheck, ValidateResponse,
};
pub use provisioning::{Account, ProvisioningError, ProvisioningService};
pub use reseller::{ResellerClient, ResellerConfig, ResellerError};
