//! Command-line argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Shield - VPN reseller account and configuration tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (TOML); defaults apply when it does not exist
    #[arg(long, short, default_value = "shield.toml")]
    pub config: PathBuf,

    /// Reseller API bearer token
    #[arg(long, env = "SHIELD_RESELLER_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Username of the provisioning account
    #[arg(long, env = "SHIELD_PROVISION_USERNAME")]
    pub username: Option<String>,

    /// Password of the provisioning account
    #[arg(long, env = "SHIELD_PROVISION_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the provisioning account and print its id
    Account,
    /// List the servers offered by the reseller
    Servers,
    /// Check whether a username is available
    CheckUsername {
        username: String,
    },
    /// Create a new reseller account
    CreateAccount {
        username: String,
        /// Password for the new account
        #[arg(long, env = "SHIELD_NEW_ACCOUNT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Fetch the OpenVPN configuration for a server
    Config {
        /// Server id from `servers`
        #[arg(long)]
        server_id: i64,
        /// Port id, for servers that require one
        #[arg(long)]
        port_id: Option<i64>,
        /// Directory to save the `.ovpn` file in; printed when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the effective configuration (secrets omitted)
    ShowConfig,
}
