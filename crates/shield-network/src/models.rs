//! Reseller API wire models
//!
//! Shapes of the JSON bodies exchanged with the reseller backend. Most
//! responses wrap their payload in a `{"data": ...}` envelope; account
//! validation does not.

use serde::{Deserialize, Deserializer, Serialize};
use shield_vpn::{ConfigError, Credentials, TunnelConfiguration};

/// `{"data": ...}` response wrapper
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

/// Request body for account validation and creation
#[derive(Serialize)]
pub(crate) struct AccountCredentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Result of validating a username/password pair
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ValidateResponse {
    pub success: bool,
    pub message: String,
    /// Account id, present on successful validation
    #[serde(default)]
    pub id: Option<i64>,
    /// Backend result code
    #[serde(deserialize_with = "code_as_string")]
    pub code: String,
}

impl ValidateResponse {
    /// Account id of a successful validation
    pub fn account_id(&self) -> Option<i64> {
        if self.success { self.id } else { None }
    }
}

/// The backend sends `code` as a string; tolerate a bare number too
fn code_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Text(String),
        Number(i64),
    }

    Ok(match Code::deserialize(deserializer)? {
        Code::Text(text) => text,
        Code::Number(n) => n.to_string(),
    })
}

/// A VPN server offered by the reseller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub id: i64,
    pub name: String,
    pub ip: String,
    pub country_code: String,
    pub city: String,
    pub capacity: i64,
}

/// Username availability message
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UsernameCheck {
    pub message: String,
}

/// A newly created reseller account
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountRecord {
    pub id: i64,
    pub username: String,
    pub status: String,
    #[serde(rename = "expired_at", default)]
    pub expires_at: Option<String>,
}

/// An OpenVPN configuration file generated for one server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OvpnConfigPayload {
    pub download_url: String,
    pub file_body: String,
    pub file_name: String,
}

impl OvpnConfigPayload {
    /// Build the configuration the tunnel controller consumes
    ///
    /// The session is labelled with the file name so observers can show
    /// which server is in use.
    pub fn into_tunnel_configuration(
        self,
        credentials: Option<Credentials>,
    ) -> Result<TunnelConfiguration, ConfigError> {
        let mut config = TunnelConfiguration::new(self.file_body)?.with_label(self.file_name);
        if let Some(credentials) = credentials {
            config = config.with_credentials(credentials);
        }
        Ok(config)
    }
}
