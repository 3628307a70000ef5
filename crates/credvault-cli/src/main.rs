//! CLI entry point for credvault.
//!
//! This binary provides the `credvault` command with subcommands for storing
//! and retrieving credentials and inspecting the effective configuration.

mod cli;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use credvault::{CredentialVault, SqliteSecretBackend, VaultConfig, VaultError};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

/// Environment variable consulted when `--master-password` is omitted.
const ENV_MASTER_PASSWORD: &str = "CREDVAULT_MASTER_PASSWORD";

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    init_tracing("info");

    let cli = Cli::parse();
    let mut config = VaultConfig::load(&cli.config)
        .and_then(|c| c.apply_overrides(|name| std::env::var(name).ok()))
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    if let Some(db) = cli.db {
        config = config.with_database_path(db);
    }

    match cli.command {
        Commands::Store {
            username,
            password,
            master_password,
        } => cmd_store(&config, &username, &password, master_password).await,
        Commands::Retrieve {
            username,
            master_password,
        } => cmd_retrieve(&config, &username, master_password).await,
        Commands::Config => cmd_config(&config),
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn cmd_store(
    config: &VaultConfig,
    username: &str,
    password: &str,
    master_password: Option<String>,
) -> Result<()> {
    let master = resolve_master_password(master_password)?;
    let vault = open_vault(config)?;
    let cancel = cancel_on_ctrl_c();

    let secret_id = vault
        .store(username, password, &master, &cancel)
        .await
        .context("failed to store secret")?;

    println!("{secret_id}");
    Ok(())
}

async fn cmd_retrieve(
    config: &VaultConfig,
    username: &str,
    master_password: Option<String>,
) -> Result<()> {
    let master = resolve_master_password(master_password)?;
    let vault = open_vault(config)?;
    let cancel = cancel_on_ctrl_c();

    let credentials = match vault.retrieve(username, &master, &cancel).await {
        Ok(credentials) => credentials,
        Err(e @ VaultError::SecretNotFound { .. }) => {
            return Err(anyhow::Error::new(e).context(format!("no secret stored for {username}")));
        }
        Err(e @ VaultError::InvalidMasterPassword { .. }) => {
            return Err(anyhow::Error::new(e).context("master password rejected"));
        }
        Err(e) => return Err(anyhow::Error::new(e).context("failed to retrieve secret")),
    };

    let output = serde_json::json!({
        "username": credentials.username(),
        "password": credentials.password(),
        "kind": credentials.kind(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn cmd_config(config: &VaultConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("failed to render config")?;
    print!("{rendered}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn open_vault(config: &VaultConfig) -> Result<CredentialVault<SqliteSecretBackend>> {
    let backend = SqliteSecretBackend::open(&config.database_path).with_context(|| {
        format!(
            "failed to open secret database at {}",
            config.database_path.display()
        )
    })?;
    info!(path = %config.database_path.display(), "secret store ready");

    CredentialVault::with_config(backend, config).context("invalid vault configuration")
}

fn resolve_master_password(flag: Option<String>) -> Result<String> {
    flag.or_else(|| std::env::var(ENV_MASTER_PASSWORD).ok())
        .filter(|m| !m.is_empty())
        .ok_or_else(|| {
            anyhow!(
                "a master password is required: pass --master-password or set {ENV_MASTER_PASSWORD}"
            )
        })
}

/// A token that fires when the user presses Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    token
}
