//! Front-end configuration
//!
//! Loaded from a TOML file, then secrets are overlaid from the
//! environment so they never have to live on disk.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shield_network::ResellerConfig;
use shield_vpn::Credentials;
use std::fmt;
use std::path::Path;

/// Complete front-end configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShieldConfig {
    pub reseller: ResellerConfig,
    pub provisioning: ProvisioningConfig,
}

/// Fixed account used by provisioning
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl fmt::Debug for ProvisioningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisioningConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ProvisioningConfig {
    /// The credential pair, when both halves are configured
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Credentials::new(username, password)),
            _ => None,
        }
    }
}

/// Secrets taken from the environment
#[derive(Default)]
pub struct Secrets {
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ShieldConfig {
    /// Load from a TOML file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parse TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay secrets; set values win over the file
    pub fn with_secrets(mut self, secrets: Secrets) -> Self {
        if secrets.token.is_some() {
            self.reseller.token = secrets.token;
        }
        if secrets.username.is_some() {
            self.provisioning.username = secrets.username;
        }
        if secrets.password.is_some() {
            self.provisioning.password = secrets.password;
        }
        self
    }

    /// Render the effective configuration without secrets
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = ShieldConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.reseller.base_url, "https://api.vpnresellers.com");
        assert!(config.reseller.token.is_none());
        assert!(config.provisioning.credentials().is_none());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shield.toml");
        std::fs::write(
            &path,
            r#"
[reseller]
base_url = "http://127.0.0.1:9000"
timeout_secs = 5

[provisioning]
username = "adminIos"
"#,
        )
        .unwrap();

        let config = ShieldConfig::load(&path).unwrap();
        assert_eq!(config.reseller.base_url, "http://127.0.0.1:9000");
        assert_eq!(config.reseller.timeout_secs, 5);
        assert_eq!(config.reseller.api_prefix, "v3_2/");
        assert_eq!(config.provisioning.username.as_deref(), Some("adminIos"));
    }

    #[test]
    fn test_malformed_file_rejected() {
        assert!(ShieldConfig::from_toml("[reseller]\ntimeout_secs = \"soon\"\n").is_err());
    }

    #[test]
    fn test_secrets_overlay() {
        let config = ShieldConfig::from_toml("[provisioning]\nusername = \"file-user\"\n")
            .unwrap()
            .with_secrets(Secrets {
                token: Some("tok".to_string()),
                username: None,
                password: Some("pw".to_string()),
            });

        assert_eq!(config.reseller.token.as_deref(), Some("tok"));
        let credentials = config.provisioning.credentials().unwrap();
        assert_eq!(credentials.username, "file-user");
        assert_eq!(credentials.password, "pw");
    }

    #[test]
    fn test_rendered_config_has_no_secrets() {
        let config = ShieldConfig::default().with_secrets(Secrets {
            token: Some("secret-token".to_string()),
            username: Some("admin".to_string()),
            password: Some("secret-password".to_string()),
        });

        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("secret-token"));
        assert!(!rendered.contains("secret-password"));
        assert!(!rendered.contains("[controller]"));
    }
}
