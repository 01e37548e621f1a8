//! CLI argument definitions for wadesk.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// wadesk -- integration credential maintenance.
#[derive(Parser)]
#[command(
    name = "wadesk",
    version,
    about = "wadesk -- integration credential maintenance",
    long_about = "Encrypts, inspects, and repairs the WhatsApp and calendar integration \
                  credentials stored for each tenant."
)]
pub struct Cli {
    /// Path to the config file with the `[vault]` section.
    #[arg(long, global = true, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Environment variable holding the encryption key.
    #[arg(long, global = true)]
    pub key_env: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a new random 32-byte key as 64 hex characters.
    GenerateKey,

    /// Encrypt a secret and print the stored blob.
    Encrypt {
        /// The secret to encrypt.
        plaintext: String,
    },

    /// Decrypt a stored blob and print the secret.
    Decrypt {
        /// An `IV:TAG:CIPHERTEXT` blob.
        blob: String,
    },

    /// Print the audit hash of a secret.
    Hash {
        /// The secret to fingerprint.
        plaintext: String,
    },

    /// Classify every stored credential without changing anything.
    Classify {
        /// Credential database; defaults to `[vault] database`.
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Reset malformed or corrupt credentials to the sentinel.
    Repair {
        /// Credential database; defaults to `[vault] database`.
        #[arg(long)]
        db: Option<PathBuf>,

        /// Report what would change without writing.
        #[arg(long)]
        dry_run: bool,

        /// Also reset legacy plaintext values.
        #[arg(long)]
        reset_legacy: bool,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}
