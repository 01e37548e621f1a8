//! Encryption key configuration.
//!
//! The key comes from a single environment value, accepted either as a
//! 64-character hex string or as base64. Whatever the encoding, the decoded
//! value must be exactly 32 bytes; nothing is padded or truncated.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::crypto::KEY_LEN;
use crate::error::{Result, VaultError};

/// Environment variable holding the encryption key.
pub const ENCRYPTION_KEY_ENV: &str = "ENCRYPTION_KEY";

/// Parse a configured key value into raw key bytes.
///
/// Hex is tried first: a 64-character hex string is also valid base64, and
/// would otherwise decode to 48 bytes. The decoded bytes are zeroed on drop.
///
/// # Errors
///
/// Returns [`VaultError::Configuration`] if the value is empty, cannot be
/// decoded, or does not decode to exactly [`KEY_LEN`] bytes.
pub fn parse_key(value: &str) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let value = value.trim();
    if value.is_empty() {
        return Err(VaultError::Configuration {
            reason: "encryption key is empty".into(),
        });
    }

    let bytes = if value.len() == KEY_LEN * 2 && value.bytes().all(|b| b.is_ascii_hexdigit()) {
        Zeroizing::new(hex::decode(value).map_err(|e| VaultError::Configuration {
            reason: format!("invalid hex encryption key: {e}"),
        })?)
    } else {
        Zeroizing::new(BASE64.decode(value).map_err(|e| VaultError::Configuration {
            reason: format!("encryption key is neither 64-char hex nor base64: {e}"),
        })?)
    };

    if bytes.len() != KEY_LEN {
        return Err(VaultError::Configuration {
            reason: format!(
                "encryption key must decode to {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            ),
        });
    }

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Read and parse the key from the environment variable `var`.
///
/// # Errors
///
/// Returns [`VaultError::Configuration`] if the variable is unset, not
/// unicode, or holds an invalid key.
pub fn load_key_from_env(var: &str) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let value = std::env::var(var).map_err(|e| VaultError::Configuration {
        reason: format!("{var}: {e}"),
    })?;
    let value = SecretString::from(value);
    let key = parse_key(value.expose_secret())?;
    tracing::debug!(var = var, "loaded encryption key from environment");
    Ok(key)
}
