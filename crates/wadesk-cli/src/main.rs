//! CLI entry point for wadesk.
//!
//! This binary provides the `wadesk` command: key generation, one-off
//! encrypt/decrypt/hash of secrets, and the classify and repair passes over
//! the credential database.

mod cli;
mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wadesk_vault::store::CredentialRepository;
use wadesk_vault::{
    CredentialCodec, IntegrationKind, RepairOptions, RepairReport, SqliteCredentialStore, classify,
    codec, crypto, repair_credentials,
};

use crate::cli::{Cli, Commands};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the key may come from the real environment.
    dotenvy::dotenv().ok();
    init_tracing("info");

    let cli = Cli::parse();
    let vault_config = config::load_vault_config(&cli.config);
    let key_env = cli.key_env.unwrap_or(vault_config.key_env);

    match cli.command {
        Commands::GenerateKey => cmd_generate_key(),
        Commands::Encrypt { plaintext } => cmd_encrypt(&key_env, &plaintext),
        Commands::Decrypt { blob } => cmd_decrypt(&key_env, &blob),
        Commands::Hash { plaintext } => {
            println!("{}", crypto::hash_for_audit(&plaintext));
            Ok(())
        }
        Commands::Classify { db } => {
            let db = db.unwrap_or(vault_config.database);
            cmd_classify(&key_env, db).await
        }
        Commands::Repair {
            db,
            dry_run,
            reset_legacy,
            json,
        } => {
            let db = db.unwrap_or(vault_config.database);
            let options = RepairOptions {
                dry_run,
                reset_legacy,
            };
            cmd_repair(&key_env, db, options, json).await
        }
    }
}

/// Load the codec from `key_env` and install it as the process-wide codec.
///
/// The returned handle is `'static`, so blocking tasks can borrow it directly.
fn load_codec(key_env: &str) -> Result<&'static CredentialCodec> {
    let loaded = CredentialCodec::from_env_var(key_env)
        .with_context(|| format!("failed to load encryption key from {key_env}"))?;
    Ok(codec::init_global(loaded)?)
}

fn ensure_database(db: &Path) -> Result<()> {
    ensure!(
        db.exists(),
        "credential database not found: {}",
        db.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommands: key and secret helpers
// ---------------------------------------------------------------------------

fn cmd_generate_key() -> Result<()> {
    let key = crypto::generate_key()?;
    println!("{}", hex::encode(key));
    Ok(())
}

fn cmd_encrypt(key_env: &str, plaintext: &str) -> Result<()> {
    let codec = load_codec(key_env)?;
    let blob = codec.encrypt(plaintext).context("encryption failed")?;
    info!(secret_sha256 = %crypto::hash_for_audit(plaintext), "encrypted secret");
    println!("{blob}");
    Ok(())
}

fn cmd_decrypt(key_env: &str, blob: &str) -> Result<()> {
    let codec = load_codec(key_env)?;
    let plaintext = codec.decrypt(blob).context("decryption failed")?;
    println!("{plaintext}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommands: database passes
// ---------------------------------------------------------------------------

async fn cmd_classify(key_env: &str, db: PathBuf) -> Result<()> {
    ensure_database(&db)?;
    let codec = load_codec(key_env)?;

    let rows = tokio::task::spawn_blocking(move || -> wadesk_vault::Result<Vec<String>> {
        let store = SqliteCredentialStore::open(&db)?;
        let mut rows = Vec::new();
        for kind in IntegrationKind::ALL {
            for record in store.list(kind)? {
                let class = classify(record.credentials.as_deref(), codec);
                rows.push(format!(
                    "{kind}\t{}\t{}\t{}\t{}",
                    record.id,
                    record.tenant_id,
                    record.status,
                    class.label()
                ));
            }
        }
        Ok(rows)
    })
    .await
    .context("classify task failed")?
    .context("classify pass failed")?;

    for row in &rows {
        println!("{row}");
    }
    info!(count = rows.len(), "classified credential records");
    Ok(())
}

async fn cmd_repair(key_env: &str, db: PathBuf, options: RepairOptions, json: bool) -> Result<()> {
    ensure_database(&db)?;
    let codec = load_codec(key_env)?;

    let report = tokio::task::spawn_blocking(move || -> wadesk_vault::Result<RepairReport> {
        let store = SqliteCredentialStore::open(&db)?;
        repair_credentials(&store, codec, options)
    })
    .await
    .context("repair task failed")?
    .context("repair pass failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &RepairReport) {
    let verb = if report.dry_run { "would fix" } else { "fixed" };
    println!(
        "{verb} {} record(s) (whatsapp: {}, calendar: {})",
        report.fixed, report.fixed_whatsapp, report.fixed_calendar
    );
    println!(
        "scanned {}, skipped {}, failed {}, already reset {}",
        report.scanned, report.skipped, report.failed, report.already_reset
    );
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Logs go to stderr so command output on stdout stays pipeable.
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
