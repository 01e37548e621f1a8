//! AES-256-GCM encryption and decryption using the `ring` crate.
//!
//! This module provides the core cryptographic primitives for the vault:
//!
//! - **Sealing/opening**: AES-256-GCM authenticated encryption with a
//!   randomly generated 96-bit IV per call and a detached 128-bit tag.
//! - **Text helpers**: [`encrypt_with_key`] / [`decrypt_with_key`] produce and
//!   consume the `IV:TAG:CIPHERTEXT` wire string directly.
//! - **Audit hashing**: SHA-256 fingerprints of secrets for log lines.
//!
//! # Security Notes
//!
//! - IVs are drawn from the system CSPRNG on every seal. With 96-bit random
//!   IVs the collision probability is negligible for up to ~2^32 encryptions
//!   under the same key. There is no counter and no shared state, so
//!   concurrent callers cannot observe the same IV.
//! - Keys are validated before any cipher operation. A key that is not
//!   exactly [`KEY_LEN`] bytes is a [`VaultError::Configuration`] error.

use ring::aead::{self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, SealingKey, UnboundKey};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};

use crate::blob::EncryptedBlob;
use crate::error::{Result, VaultError};

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM IV in bytes (96 bits).
pub const IV_LEN: usize = NONCE_LEN;

/// Length of the AES-256-GCM authentication tag in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// AES-256-GCM algorithm from `ring`.
static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// A single-use nonce sequence that yields exactly one nonce and then errors.
///
/// `ring` requires a [`NonceSequence`] for bound keys. Each sealing key is
/// built around one freshly drawn IV, so a key can never seal twice.
struct SingleNonce(Option<[u8; IV_LEN]>);

impl SingleNonce {
    fn new(bytes: [u8; IV_LEN]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

/// Reject keys of the wrong length before touching the cipher.
fn check_key(key: &[u8]) -> Result<()> {
    if key.len() != KEY_LEN {
        return Err(VaultError::Configuration {
            reason: format!("encryption key must be {} bytes, got {}", KEY_LEN, key.len()),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Sealing / opening
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` with AES-256-GCM using the given 256-bit `key`.
///
/// A fresh random IV is drawn for this call. The tag is detached from the
/// ciphertext so the three parts can be encoded independently.
///
/// # Errors
///
/// Returns [`VaultError::Configuration`] if the key length is wrong and
/// [`VaultError::Encryption`] if the RNG or `ring` reports a failure.
pub fn seal(plaintext: &[u8], key: &[u8]) -> Result<EncryptedBlob> {
    check_key(key)?;

    let rng = SystemRandom::new();

    let mut iv = [0u8; IV_LEN];
    rng.fill(&mut iv).map_err(|_| VaultError::Encryption {
        reason: "failed to generate random IV".into(),
    })?;

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| VaultError::Encryption {
        reason: "failed to create AES-256-GCM key".into(),
    })?;

    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce::new(iv));

    let mut ciphertext = plaintext.to_vec();
    let tag = sealing_key
        .seal_in_place_separate_tag(Aad::empty(), &mut ciphertext)
        .map_err(|_| VaultError::Encryption {
            reason: "seal_in_place failed".into(),
        })?;

    let tag: [u8; TAG_LEN] = tag.as_ref().try_into().map_err(|_| VaultError::Encryption {
        reason: "unexpected authentication tag length".into(),
    })?;

    tracing::trace!(
        plaintext_len = plaintext.len(),
        ciphertext_len = ciphertext.len(),
        "sealed credential"
    );

    Ok(EncryptedBlob {
        iv,
        tag,
        ciphertext,
    })
}

/// Decrypt `blob` with the given 256-bit `key`, verifying its tag.
///
/// # Errors
///
/// Returns [`VaultError::Configuration`] if the key length is wrong and
/// [`VaultError::Decryption`] if the key is wrong or the blob has been
/// tampered with.
pub fn open(blob: &EncryptedBlob, key: &[u8]) -> Result<Vec<u8>> {
    check_key(key)?;

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| VaultError::Decryption {
        reason: "failed to create AES-256-GCM key".into(),
    })?;

    let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(blob.iv));

    // `ring` expects the tag appended to the ciphertext.
    let mut in_out = Vec::with_capacity(blob.ciphertext.len() + TAG_LEN);
    in_out.extend_from_slice(&blob.ciphertext);
    in_out.extend_from_slice(&blob.tag);

    let plaintext = opening_key
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::Decryption {
            reason: "authentication failed — wrong key or corrupted data".into(),
        })?;

    let result = plaintext.to_vec();

    tracing::trace!(
        ciphertext_len = blob.ciphertext.len(),
        plaintext_len = result.len(),
        "opened credential"
    );

    Ok(result)
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Encrypt a UTF-8 secret and return its `IV:TAG:CIPHERTEXT` wire string.
pub fn encrypt_with_key(plaintext: &str, key: &[u8]) -> Result<String> {
    Ok(seal(plaintext.as_bytes(), key)?.to_wire())
}

/// Decrypt an `IV:TAG:CIPHERTEXT` wire string back to the original secret.
///
/// The key is checked first, so a misconfigured key surfaces as
/// [`VaultError::Configuration`] whatever the input looks like.
///
/// # Errors
///
/// - [`VaultError::Format`] if the string does not have exactly 3 segments.
/// - [`VaultError::Decryption`] for bad encoding, wrong IV/tag length, tag
///   mismatch, or a plaintext that is not UTF-8.
pub fn decrypt_with_key(blob: &str, key: &[u8]) -> Result<String> {
    check_key(key)?;
    let blob: EncryptedBlob = blob.parse()?;
    plaintext_to_string(open(&blob, key)?)
}

pub(crate) fn plaintext_to_string(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|_| VaultError::Decryption {
        reason: "decrypted payload is not valid UTF-8".into(),
    })
}

// ---------------------------------------------------------------------------
// Audit hashing and key generation
// ---------------------------------------------------------------------------

/// SHA-256 of `plaintext`, hex encoded.
///
/// Used to correlate secrets in audit logs without revealing them. Never
/// used to decide anything about storage or decryption.
pub fn hash_for_audit(plaintext: &str) -> String {
    hex::encode(digest::digest(&digest::SHA256, plaintext.as_bytes()))
}

/// Generate a random 256-bit key suitable for `ENCRYPTION_KEY`.
///
/// # Errors
///
/// Returns [`VaultError::Internal`] if the system CSPRNG fails.
pub fn generate_key() -> Result<[u8; KEY_LEN]> {
    let rng = SystemRandom::new();
    let mut key = [0u8; KEY_LEN];
    rng.fill(&mut key)
        .map_err(|_| VaultError::Internal("failed to generate random key".into()))?;
    Ok(key)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
