//! Vault error types.
//!
//! Every public API in this crate returns [`VaultError`]. The four codec
//! variants (`Configuration`, `Format`, `Decryption`, `Encryption`) are kept
//! distinct because callers branch on them: a format or decryption failure
//! means the stored credential is unusable and the integration must be
//! reconnected, while configuration and encryption failures are fatal for
//! the call.

/// Unified error type for the wadesk credential vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Codec errors -------------------------------------------------------
    /// The encryption key is absent, undecodable, or not 32 bytes.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    /// A stored value does not split into exactly three segments.
    #[error("invalid blob format: {reason}")]
    Format { reason: String },

    /// Segments parsed but decoding or tag verification failed.
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },

    /// The cipher primitive or the system RNG failed while sealing.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// The process-wide codec was initialized twice.
    #[error("credential codec already initialized")]
    AlreadyInitialized,

    // -- Store errors -------------------------------------------------------
    /// The requested credential record does not exist.
    #[error("credential not found: kind={kind}, id={id}")]
    CredentialNotFound { kind: String, id: String },

    /// The record holds no usable credential; the tenant must reconnect.
    #[error("integration disconnected, please reconnect: kind={kind}, id={id}")]
    ReconnectRequired { kind: String, id: String },

    /// Database schema migration failed.
    #[error("migration failed: {reason}")]
    MigrationFailed { reason: String },

    // -- Underlying errors --------------------------------------------------
    /// SQLite error from `rusqlite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    // -- Generic ------------------------------------------------------------
    /// Catch-all for unexpected internal errors that don't fit a specific
    /// variant.  Prefer a typed variant whenever possible.
    #[error("internal vault error: {0}")]
    Internal(String),
}

impl VaultError {
    /// Whether this error means the stored credential itself is unusable.
    ///
    /// Format and decryption failures are recoverable: the record is moved
    /// to the disconnected state instead of failing the request.
    pub fn is_unusable_credential(&self) -> bool {
        matches!(self, Self::Format { .. } | Self::Decryption { .. })
    }

    /// Short, stable name of the error class, safe to log.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Format { .. } => "format",
            Self::Decryption { .. } => "decryption",
            Self::Encryption { .. } => "encryption",
            Self::AlreadyInitialized => "already_initialized",
            Self::CredentialNotFound { .. } => "credential_not_found",
            Self::ReconnectRequired { .. } => "reconnect_required",
            Self::MigrationFailed { .. } => "migration",
            Self::Database(_) => "database",
            Self::Internal(_) => "internal",
        }
    }
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;
