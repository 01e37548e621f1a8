//! The credential codec: a configured key plus encrypt/decrypt.
//!
//! [`CredentialCodec`] is immutable once built and holds nothing but the key,
//! so it is `Send + Sync` and can be shared freely. The key sits in a
//! [`SecretBox`], zeroed on drop and redacted from `Debug` output.
//!
//! A process normally builds one from the environment at startup and
//! installs it with [`init_global`]; code that has no handle of its own
//! reaches it through [`global`].

use std::sync::{Arc, OnceLock};

use secrecy::{ExposeSecret, SecretBox};

use crate::blob::EncryptedBlob;
use crate::config;
use crate::crypto::{self, KEY_LEN};
use crate::error::{Result, VaultError};

static GLOBAL_CODEC: OnceLock<CredentialCodec> = OnceLock::new();

/// Encrypts and decrypts integration secrets with one process-wide key.
#[derive(Clone, Debug)]
pub struct CredentialCodec {
    key: Arc<SecretBox<[u8; KEY_LEN]>>,
}

impl CredentialCodec {
    /// Build a codec from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Configuration`] unless `key` is 32 bytes.
    pub fn from_key(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(VaultError::Configuration {
                reason: format!("encryption key must be {KEY_LEN} bytes, got {}", key.len()),
            });
        }

        let mut boxed = Box::new([0u8; KEY_LEN]);
        boxed.copy_from_slice(key);
        Ok(Self {
            key: Arc::new(SecretBox::new(boxed)),
        })
    }

    /// Build a codec from a hex or base64 configuration value.
    pub fn from_config_value(value: &str) -> Result<Self> {
        let key = config::parse_key(value)?;
        Self::from_key(key.as_slice())
    }

    /// Build a codec from [`config::ENCRYPTION_KEY_ENV`].
    pub fn from_env() -> Result<Self> {
        Self::from_env_var(config::ENCRYPTION_KEY_ENV)
    }

    /// Build a codec from the named environment variable.
    pub fn from_env_var(var: &str) -> Result<Self> {
        let key = config::load_key_from_env(var)?;
        Self::from_key(key.as_slice())
    }

    /// Encrypt `plaintext` into an `IV:TAG:CIPHERTEXT` string.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        crypto::encrypt_with_key(plaintext, self.key.expose_secret())
    }

    /// Decrypt an `IV:TAG:CIPHERTEXT` string.
    pub fn decrypt(&self, blob: &str) -> Result<String> {
        crypto::decrypt_with_key(blob, self.key.expose_secret())
    }

    /// Decrypt an already parsed blob.
    pub fn open_blob(&self, blob: &EncryptedBlob) -> Result<String> {
        crypto::plaintext_to_string(crypto::open(blob, self.key.expose_secret())?)
    }
}

/// Install the process-wide codec. Must run before the first [`global`] call.
///
/// # Errors
///
/// Returns [`VaultError::AlreadyInitialized`] if a codec is already installed.
pub fn init_global(codec: CredentialCodec) -> Result<&'static CredentialCodec> {
    GLOBAL_CODEC
        .set(codec)
        .map_err(|_| VaultError::AlreadyInitialized)?;
    tracing::info!("credential codec initialized");
    global()
}

/// The process-wide codec installed by [`init_global`].
///
/// # Errors
///
/// Returns [`VaultError::Configuration`] if no codec has been installed.
pub fn global() -> Result<&'static CredentialCodec> {
    GLOBAL_CODEC.get().ok_or_else(|| VaultError::Configuration {
        reason: "credential codec used before initialization".into(),
    })
}
