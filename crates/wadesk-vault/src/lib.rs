//! Integration credential vault for wadesk.
//!
//! Tenants connect WhatsApp Business accounts and calendar providers; the
//! secrets those integrations need are stored encrypted at rest with
//! AES-256-GCM under a single process-wide key. This crate provides the
//! codec, the classification of stored values, a SQLite credential store,
//! and the repair pass that resets unusable credentials.
//!
//! # Modules
//!
//! - [`crypto`] — AES-256-GCM sealing/opening, audit hashing, key generation.
//! - [`blob`] — the `IV:TAG:CIPHERTEXT` wire format and the reset sentinel.
//! - [`config`] — loading the 32-byte key from hex or base64.
//! - [`codec`] — [`CredentialCodec`] and the process-wide instance.
//! - [`classify`] — validity classification of stored values.
//! - [`store`] — credential records, repository seam, lifecycle service.
//! - [`repair`] — the idempotent batch repair pass.
//! - [`error`] — Unified error types.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use wadesk_vault::{CredentialCodec, CredentialService, IntegrationKind, SqliteCredentialStore};
//!
//! # fn example() -> wadesk_vault::Result<()> {
//! let codec = CredentialCodec::from_env()?;
//! let store = SqliteCredentialStore::open("data/credentials.db")?;
//! let service = CredentialService::new(store, codec);
//!
//! service.connect(IntegrationKind::WhatsappAccount, "wa-123", "EAAG...")?;
//! let token = service.read_secret(IntegrationKind::WhatsappAccount, "wa-123")?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//!
//! There is no key rotation. Changing the key makes every stored blob
//! classify as corrupt.

pub mod blob;
pub mod classify;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod repair;
pub mod store;

// Re-export the most commonly used types at the crate root for convenience.
pub use blob::{EncryptedBlob, SENTINEL, is_sentinel};
pub use classify::{Classification, classify, parse_stored};
pub use codec::CredentialCodec;
pub use crypto::hash_for_audit;
pub use error::{Result, VaultError};
pub use repair::{RepairOptions, RepairReport, repair_credentials};
pub use store::{
    CredentialRecord, CredentialRepository, CredentialService, IntegrationKind,
    IntegrationStatus, SqliteCredentialStore,
};
