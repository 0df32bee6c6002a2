//! busyflag - presence-driven busy flag
//!
//! Hosts the switch accessory from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use busyflag::accessory::{AccessoryContext, PresenceAccessory};
use busyflag::auth::{AuthConfig, AuthManager, AzureAdClient, TokenStore, GRAPH_RESOURCE};
use busyflag::config::PresenceConfig;
use busyflag::presence::{canonicalize, PresenceClient};

#[derive(Parser)]
#[command(name = "busyflag")]
#[command(about = "Drive a busy flag from Microsoft Teams presence", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Switch the accessory on and keep polling; type on/off/status to toggle
    Run,

    /// Sign in with the device code flow
    Login {
        /// Fetch a new token even if a cached one is still valid
        #[arg(short, long)]
        force: bool,
    },

    /// Clear cached credentials
    Logout,

    /// Show current authentication status
    Status,

    /// Fetch presence once and show how it maps
    Presence,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = PresenceConfig::load(cli.config.as_deref())?;

    // Initialize logging
    let filter = if cli.verbose || config.debug {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let auth = build_auth(&config)?;

    match cli.command {
        Commands::Run => run(config, auth).await?,
        Commands::Login { force } => {
            tracing::info!("Starting authentication flow...");
            match auth.ensure_access_token(GRAPH_RESOURCE, true, force).await {
                Some(_) => println!("Login successful."),
                None => bail!("Login failed, see log for details."),
            }
        }
        Commands::Logout => {
            auth.logout()?;
            println!("Logged out.");
        }
        Commands::Status => status(&auth),
        Commands::Presence => presence(&config, &auth).await?,
    }

    Ok(())
}

fn build_auth(config: &PresenceConfig) -> Result<Arc<AuthManager>> {
    let auth_config = AuthConfig::new(config.app_id.clone()).with_authority(config.authority.clone());
    let client = AzureAdClient::new(&auth_config)?;
    let store = TokenStore::new(config.persist_dir()?);
    tracing::debug!("Persisting tokens under {}", store.dir().display());
    Ok(Arc::new(AuthManager::new(
        config.app_id.clone(),
        store,
        Arc::new(client),
    )))
}

async fn run(config: PresenceConfig, auth: Arc<AuthManager>) -> Result<()> {
    let ctx = AccessoryContext::new(concat!("busyflag-cli/", env!("CARGO_PKG_VERSION")));
    let accessory = PresenceAccessory::new(&ctx, config, auth);
    accessory.set_status(true, || tracing::debug!("Switch on acknowledged"));

    println!("Accessory running. Type 'on', 'off' or 'status' (Ctrl-C to stop).");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(cmd)) => match cmd.trim() {
                    "on" => accessory.set_status(true, || println!("Switched on.")),
                    "off" => accessory.set_status(false, || println!("Switched off.")),
                    "status" => println!(
                        "Switch: {}, poller: {:?}",
                        if accessory.is_on() { "on" } else { "off" },
                        accessory.phase()
                    ),
                    "" => {}
                    other => println!("Unknown command: {}. Use: on, off, status", other),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                break;
            }
        }
    }

    accessory.set_status(false, || {});
    Ok(())
}

fn status(auth: &AuthManager) {
    let status = auth.status();

    println!("Connected:   {}", if status.connected { "yes" } else { "no" });
    if status.has_refresh_token {
        println!("Refresh tok: present");
    } else {
        println!("Refresh tok: none");
    }

    for (resource, expires_on, valid) in &status.tokens {
        println!(
            "Token:       {} ({})",
            resource,
            if *valid { "valid" } else { "expired" }
        );
        println!("  expires_at: {}", expires_on);
    }

    if status.tokens.is_empty() {
        println!("Token:       none");
        println!("\nRun 'busyflag login' to authenticate.");
    }
}

async fn presence(config: &PresenceConfig, auth: &AuthManager) -> Result<()> {
    let Some(token) = auth.ensure_access_token(GRAPH_RESOURCE, false, false).await else {
        bail!("No valid token. Run 'busyflag login'.");
    };

    let client = PresenceClient::new(reqwest::Client::new(), &config.graph_url);
    tracing::debug!("Fetching presence from {}", client.url());
    let presence = client.fetch(&token).await?;

    println!("\nPresence Status:");
    println!(
        "  Availability: {}",
        presence.availability.as_deref().unwrap_or("(none)")
    );
    println!(
        "  Activity:     {}",
        presence.activity.as_deref().unwrap_or("(none)")
    );
    println!(
        "  Flag state:   {}",
        canonicalize(presence.availability.as_deref())
    );

    Ok(())
}
