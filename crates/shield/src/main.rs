//! Shield: VPN reseller front end
//!
//! Main entry point. Initializes the global allocator, sets up logging,
//! loads configuration and runs one reseller operation.

mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Args, Commands};
use config::{Secrets, ShieldConfig};
use shield_network::{ProvisioningService, ResellerClient};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const DEFAULT_LOG_FILTER: &str = "shield=info,shield_vpn=info,shield_network=info";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let config = ShieldConfig::load(&args.config)?.with_secrets(Secrets {
        token: args.token,
        username: args.username,
        password: args.password,
    });

    info!("Shield {} starting", env!("CARGO_PKG_VERSION"));

    if let Commands::ShowConfig = args.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let client = Arc::new(
        ResellerClient::new(config.reseller.clone())
            .context("set SHIELD_RESELLER_TOKEN or pass --token")?,
    );

    match args.command {
        Commands::Account => {
            let account = provisioning(&config, client)?.account().await?;
            println!("{}\t{}", account.id, account.username);
        }
        Commands::Servers => {
            for server in client.list_servers().await? {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    server.id,
                    server.name,
                    server.country_code,
                    server.city,
                    server.ip,
                    server.capacity
                );
            }
        }
        Commands::CheckUsername { username } => {
            println!("{}", client.check_username(&username).await?.message);
        }
        Commands::CreateAccount { username, password } => {
            let account = client.create_account(&username, &password).await?;
            println!(
                "{}\t{}\t{}\t{}",
                account.id,
                account.username,
                account.status,
                account.expires_at.as_deref().unwrap_or("-")
            );
        }
        Commands::Config {
            server_id,
            port_id,
            out,
        } => {
            let service = provisioning(&config, client.clone())?;
            let account = service.account().await?;
            let payload = client.openvpn_config(account.id, server_id, port_id).await?;

            // Make sure the payload is something the tunnel can start with
            let tunnel = payload
                .clone()
                .into_tunnel_configuration(config.provisioning.credentials())?;
            info!(
                "Configuration {} ready ({} bytes)",
                tunnel.label().unwrap_or("unnamed"),
                tunnel.payload().len()
            );

            match out {
                Some(dir) => {
                    let path = ResellerClient::save_config(&payload, &dir)?;
                    println!("{}", path.display());
                }
                None => print!("{}", payload.file_body),
            }
        }
        Commands::ShowConfig => {}
    }

    Ok(())
}

fn provisioning(config: &ShieldConfig, client: Arc<ResellerClient>) -> Result<ProvisioningService> {
    let credentials = config
        .provisioning
        .credentials()
        .context("set SHIELD_PROVISION_USERNAME and SHIELD_PROVISION_PASSWORD")?;
    Ok(ProvisioningService::new(client, credentials))
}
