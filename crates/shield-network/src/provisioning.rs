//! Account provisioning
//!
//! Turns a configured credential pair into a usable reseller account.
//! Nothing is cached: every call re-validates against the backend.

use crate::reseller::{ResellerClient, ResellerError};
use shield_vpn::Credentials;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Provisioning errors
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// The backend answered but did not accept the credentials
    #[error("Provisioning rejected ({code}): {message}")]
    Rejected { code: i64, message: String },

    #[error(transparent)]
    Reseller(#[from] ResellerError),
}

/// A validated account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub username: String,
}

/// Obtains an account for a fixed credential pair
#[derive(Debug, Clone)]
pub struct ProvisioningService {
    client: Arc<ResellerClient>,
    credentials: Credentials,
}

impl ProvisioningService {
    pub fn new(client: Arc<ResellerClient>, credentials: Credentials) -> Self {
        Self { client, credentials }
    }

    /// Validate the configured pair and return the account it names
    pub async fn account(&self) -> Result<Account, ProvisioningError> {
        let username = self.credentials.username.as_str();
        let response = self
            .client
            .validate(username, &self.credentials.password)
            .await?;

        match response.account_id() {
            Some(id) => {
                info!("Provisioned account {} ({})", id, username);
                Ok(Account {
                    id,
                    username: username.to_string(),
                })
            }
            None => {
                let code = parse_code(&response.code);
                warn!("Provisioning rejected ({}): {}", response.code, response.message);
                Err(ProvisioningError::Rejected {
                    code,
                    message: response.message,
                })
            }
        }
    }
}

/// Backend codes are strings; non-numeric ones map to 0
fn parse_code(code: &str) -> i64 {
    code.trim().parse().unwrap_or(0)
}
