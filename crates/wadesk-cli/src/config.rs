//! CLI configuration.
//!
//! Reads the `[vault]` section from `config/default.toml`. Falls back to
//! defaults if the file is missing or the section is absent; command-line
//! flags override both.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use wadesk_vault::config::ENCRYPTION_KEY_ENV;

/// Settings from the `[vault]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Credential database path.
    pub database: PathBuf,
    /// Environment variable holding the encryption key.
    pub key_env: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("data/credentials.db"),
            key_env: ENCRYPTION_KEY_ENV.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    vault: VaultConfig,
}

/// Load the `[vault]` section from `path`.
pub fn load_vault_config(path: &Path) -> VaultConfig {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return VaultConfig::default();
        }
    };

    parse_vault_config(&content).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "invalid config file, using defaults");
        VaultConfig::default()
    })
}

fn parse_vault_config(content: &str) -> Result<VaultConfig, toml::de::Error> {
    Ok(toml::from_str::<ConfigFile>(content)?.vault)
}
