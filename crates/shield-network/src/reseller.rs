//! Reseller API client
//!
//! Typed access to the VPN reseller backend: account validation and
//! creation, the server catalogue, and per-server OpenVPN configuration.
//! Every call is a single attempt; retry policy belongs to the caller.

use crate::client::{HttpClient, HttpClientConfig, HttpError};
use crate::models::{
    AccountCredentials, AccountRecord, Envelope, OvpnConfigPayload, ServerDescriptor,
    UsernameCheck, ValidateResponse,
};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

const JSON: &str = "application/json";

/// Reseller client errors
#[derive(Debug, Error)]
pub enum ResellerError {
    /// Non-2xx response; carries the response body verbatim
    #[error("{0}")]
    Server(String),

    #[error("Decode failed: {0}")]
    Decode(serde_json::Error),

    #[error("Encode failed: {0}")]
    Encode(serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] HttpError),

    #[error("No reseller API token configured")]
    MissingToken,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reseller backend settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResellerConfig {
    /// Backend origin
    pub base_url: String,
    /// Version prefix prepended to every endpoint path
    pub api_prefix: String,
    /// Bearer token
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// User-Agent header
    pub user_agent: String,
}

impl Default for ResellerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.vpnresellers.com".to_string(),
            api_prefix: "v3_2/".to_string(),
            token: None,
            timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: format!("shield/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl fmt::Debug for ResellerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResellerConfig")
            .field("base_url", &self.base_url)
            .field("api_prefix", &self.api_prefix)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl ResellerConfig {
    /// Set the bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Base URL of all endpoints, always ending in `/`
    fn endpoint_root(&self) -> Result<Url, ResellerError> {
        let mut base = self.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let mut prefix = self.api_prefix.trim_matches('/').to_string();
        if !prefix.is_empty() {
            prefix.push('/');
        }

        Url::parse(&base)
            .and_then(|url| url.join(&prefix))
            .map_err(|e| HttpError::InvalidUrl(e.to_string()).into())
    }
}

/// Client for the reseller HTTP API
pub struct ResellerClient {
    http: HttpClient,
    root: Url,
    token: String,
}

impl fmt::Debug for ResellerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResellerClient")
            .field("root", &self.root.as_str())
            .finish_non_exhaustive()
    }
}

impl ResellerClient {
    /// Create a client; fails without a non-empty token
    pub fn new(config: ResellerConfig) -> Result<Self, ResellerError> {
        let token = config
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ResellerError::MissingToken)?;
        let root = config.endpoint_root()?;

        let http = HttpClient::new(HttpClientConfig {
            timeout: Duration::from_secs(config.timeout_secs),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            user_agent: config.user_agent.clone(),
            ..Default::default()
        });

        info!("Reseller client ready ({})", root);

        Ok(Self { http, root, token })
    }

    /// Validate a username/password pair
    pub async fn validate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ValidateResponse, ResellerError> {
        let body = AccountCredentials { username, password };
        self.request(Method::POST, "accounts/validate", &[], Some(&body))
            .await
    }

    /// Validate a pair and return its account id
    pub async fn login(&self, username: &str, password: &str) -> Result<i64, ResellerError> {
        let response = self.validate(username, password).await?;
        match response.account_id() {
            Some(id) => Ok(id),
            None => Err(ResellerError::Server(response.message)),
        }
    }

    /// Server catalogue, in backend order
    pub async fn list_servers(&self) -> Result<Vec<ServerDescriptor>, ResellerError> {
        let envelope: Envelope<Vec<ServerDescriptor>> =
            self.request::<_, ()>(Method::GET, "servers", &[], None).await?;
        Ok(envelope.data)
    }

    /// Ask whether a username is available
    pub async fn check_username(&self, username: &str) -> Result<UsernameCheck, ResellerError> {
        let envelope: Envelope<UsernameCheck> = self
            .request::<_, ()>(
                Method::GET,
                "accounts/check_username",
                &[("username", username.to_string())],
                None,
            )
            .await?;
        Ok(envelope.data)
    }

    /// Create a new account
    pub async fn create_account(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AccountRecord, ResellerError> {
        let body = AccountCredentials { username, password };
        let envelope: Envelope<AccountRecord> = self
            .request(Method::POST, "accounts", &[], Some(&body))
            .await?;
        Ok(envelope.data)
    }

    /// Fetch the OpenVPN configuration for a server
    ///
    /// The backend scopes configurations to the token, not the account;
    /// `account_id` is only recorded in logs.
    pub async fn openvpn_config(
        &self,
        account_id: i64,
        server_id: i64,
        port_id: Option<i64>,
    ) -> Result<OvpnConfigPayload, ResellerError> {
        debug!(
            "Fetching OpenVPN config for account {} (server {}, port {:?})",
            account_id, server_id, port_id
        );

        let mut query = vec![("server_id", server_id.to_string())];
        if let Some(port_id) = port_id {
            query.push(("port_id", port_id.to_string()));
        }

        let envelope: Envelope<OvpnConfigPayload> = self
            .request::<_, ()>(Method::GET, "configuration", &query, None)
            .await?;
        Ok(envelope.data)
    }

    /// Write a configuration file into `dir` and return its path
    pub fn save_config(
        payload: &OvpnConfigPayload,
        dir: impl AsRef<Path>,
    ) -> Result<PathBuf, ResellerError> {
        let name = payload.file_name.as_str();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(ResellerError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unsafe config file name: {:?}", name),
            )));
        }

        let path = dir.as_ref().join(name);
        std::fs::write(&path, payload.file_body.as_bytes())?;
        info!("Saved OpenVPN config to {}", path.display());
        Ok(path)
    }

    /// Build, send and decode one API call
    async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T, ResellerError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let mut url = self
            .root
            .join(path)
            .map_err(|e| HttpError::InvalidUrl(e.to_string()))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(url.as_str())
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, JSON);

        let payload = match body {
            Some(body) => {
                builder = builder.header(CONTENT_TYPE, JSON);
                serde_json::to_vec(body).map_err(ResellerError::Encode)?
            }
            None => Vec::new(),
        };

        let request = builder
            .body(Full::new(Bytes::from(payload)))
            .map_err(|e| HttpError::InvalidUrl(e.to_string()))?;

        debug!("Reseller {} {}", method, url);
        let response = self.http.send(request).await?;

        if !response.is_success() {
            let text = response.text();
            warn!("Reseller {} {} failed with {}: {}", method, url.path(), response.status, text);
            return Err(ResellerError::Server(text));
        }

        serde_json::from_slice(&response.body).map_err(|e| {
            warn!("Reseller {} {} decode failed ({}): {}", method, url.path(), e, response.text());
            ResellerError::Decode(e)
        })
    }
}
