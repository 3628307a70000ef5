//! CLI argument definitions for credvault.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// credvault -- master-password credential vault.
#[derive(Parser)]
#[command(
    name = "credvault",
    version,
    about = "credvault -- master-password credential vault",
    long_about = "Stores username/password pairs encrypted under a key derived from a \
                  master password, one fresh salt per secret."
)]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, short, global = true, default_value = "config/credvault.toml")]
    pub config: PathBuf,

    /// Override the SQLite database path from the configuration.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Encrypt and store a credential pair.
    Store {
        /// Login identifier to store (also selects the secret id).
        #[arg(long, short)]
        username: String,

        /// Password to store.
        #[arg(long, short)]
        password: String,

        /// Master password. Falls back to `CREDVAULT_MASTER_PASSWORD`.
        #[arg(long, short)]
        master_password: Option<String>,
    },

    /// Decrypt and print a stored credential pair as JSON.
    Retrieve {
        /// Login identifier to look up.
        #[arg(long, short)]
        username: String,

        /// Master password. Falls back to `CREDVAULT_MASTER_PASSWORD`.
        #[arg(long, short)]
        master_password: Option<String>,
    },

    /// Print the effective configuration as TOML.
    Config,
}
