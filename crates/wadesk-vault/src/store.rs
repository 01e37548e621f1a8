//! SQLite-backed integration credential store.
//!
//! Credentials live on two record kinds, WhatsApp accounts and calendar
//! integrations. Each row holds one encrypted `credentials` text value and a
//! `status` of `CONNECTED` or `DISCONNECTED`.
//!
//! - [`CredentialRepository`] is the get/set seam the repair pass works
//!   against. It moves text around and never decrypts.
//! - [`SqliteCredentialStore`] implements it over `rusqlite`.
//! - [`CredentialService`] pairs a repository with a [`CredentialCodec`] and
//!   enforces the connection lifecycle: the only way back to `CONNECTED` is
//!   [`CredentialService::connect`] with a freshly obtained secret.
//!
//! # Schema
//!
//! `whatsapp_accounts` and `calendar_integrations` share one shape:
//! `id`, `tenant_id`, `credentials`, `status`, `updated_at`. Migration is
//! automatic on open.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::blob::{SENTINEL, is_sentinel};
use crate::classify::parse_stored;
use crate::codec::CredentialCodec;
use crate::crypto;
use crate::error::{Result, VaultError};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which integration a credential record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationKind {
    /// WhatsApp Business account credentials.
    WhatsappAccount,
    /// Calendar provider OAuth credentials.
    CalendarIntegration,
}

impl IntegrationKind {
    /// Every kind, in repair order.
    pub const ALL: [Self; 2] = [Self::WhatsappAccount, Self::CalendarIntegration];

    /// Convert to a stable string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WhatsappAccount => "whatsapp_account",
            Self::CalendarIntegration => "calendar_integration",
        }
    }

    /// Backing SQLite table.
    fn table(&self) -> &'static str {
        match self {
            Self::WhatsappAccount => "whatsapp_accounts",
            Self::CalendarIntegration => "calendar_integrations",
        }
    }
}

impl std::fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrationStatus {
    /// Holds a credential believed to be usable.
    Connected,
    /// Holds no credential, or the sentinel; waiting for reconnection.
    Disconnected,
}

impl IntegrationStatus {
    /// Convert to the string stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
        }
    }

    /// Parse from the string stored in SQLite.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CONNECTED" => Some(Self::Connected),
            "DISCONNECTED" => Some(Self::Disconnected),
            _ => None,
        }
    }
}

impl std::fmt::Display for IntegrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored credential row. `credentials` is ciphertext (or legacy junk),
/// never plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub kind: IntegrationKind,
    pub id: String,
    pub tenant_id: String,
    pub credentials: Option<String>,
    pub status: IntegrationStatus,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// Already reset: disconnected and holding the sentinel.
    pub fn is_reset(&self) -> bool {
        self.status == IntegrationStatus::Disconnected
            && self.credentials.as_deref().is_some_and(is_sentinel)
    }
}

// ---------------------------------------------------------------------------
// Repository seam
// ---------------------------------------------------------------------------

/// Get/set access to credential text by record id.
///
/// Implementations must be `Send + Sync` so one repository can serve
/// concurrent requests and a repair pass at the same time.
pub trait CredentialRepository: Send + Sync {
    /// All records of `kind`, ordered by id.
    fn list(&self, kind: IntegrationKind) -> Result<Vec<CredentialRecord>>;

    /// One record, or `None` if it does not exist.
    fn get(&self, kind: IntegrationKind, id: &str) -> Result<Option<CredentialRecord>>;

    /// Overwrite `credentials` and `status` of an existing record.
    ///
    /// Returns [`VaultError::CredentialNotFound`] if the record is absent.
    fn set(
        &self,
        kind: IntegrationKind,
        id: &str,
        credentials: Option<&str>,
        status: IntegrationStatus,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SQLite store
// ---------------------------------------------------------------------------

/// Credential repository backed by SQLite.
#[derive(Clone)]
pub struct SqliteCredentialStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCredentialStore {
    /// Open (or create) a credential database at `path`.
    ///
    /// Runs schema migrations automatically.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Database`] if the database cannot be opened,
    /// or [`VaultError::MigrationFailed`] if schema setup fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "opening credential database");

        let conn = Connection::open(path)?;
        Self::configure_connection(&conn)?;
        Self::run_migrations(&conn)?;

        tracing::info!("credential database ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Configure SQLite pragmas for performance and safety.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Run database schema migrations.
    fn run_migrations(conn: &Connection) -> Result<()> {
        tracing::debug!("running credential schema migrations");

        for kind in IntegrationKind::ALL {
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id          TEXT PRIMARY KEY,
                    tenant_id   TEXT NOT NULL,
                    credentials TEXT,
                    status      TEXT NOT NULL CHECK(status IN ('CONNECTED','DISCONNECTED')),
                    updated_at  INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{table}_tenant ON {table}(tenant_id);",
                table = kind.table()
            );
            conn.execute_batch(&sql).map_err(|e| VaultError::MigrationFailed {
                reason: e.to_string(),
            })?;
        }

        tracing::debug!("credential schema migrations complete");
        Ok(())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| VaultError::Internal(format!("mutex poisoned: {e}")))?;
        f(&conn)
    }

    /// Insert or replace a row with an arbitrary stored value.
    ///
    /// Used to import rows from the platform database and to seed fixtures;
    /// the value is stored as given, without encryption.
    pub fn insert_raw(
        &self,
        kind: IntegrationKind,
        id: &str,
        tenant_id: &str,
        credentials: Option<&str>,
        status: IntegrationStatus,
    ) -> Result<()> {
        let now = Utc::now().timestamp();
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {} (id, tenant_id, credentials, status, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                        tenant_id = excluded.tenant_id,
                        credentials = excluded.credentials,
                        status = excluded.status,
                        updated_at = excluded.updated_at",
                    kind.table()
                ),
                params![id, tenant_id, credentials, status.as_str(), now],
            )?;
            Ok(())
        })
    }
}

impl CredentialRepository for SqliteCredentialStore {
    fn list(&self, kind: IntegrationKind) -> Result<Vec<CredentialRecord>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT id, tenant_id, credentials, status, updated_at FROM {} ORDER BY id",
                kind.table()
            ))?;
            let rows = stmt
                .query_map([], read_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let records = rows
            .into_iter()
            .map(|row| row.into_record(kind))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(kind = %kind, count = records.len(), "listed credential records");
        Ok(records)
    }

    fn get(&self, kind: IntegrationKind, id: &str) -> Result<Option<CredentialRecord>> {
        let row = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT id, tenant_id, credentials, status, updated_at
                         FROM {} WHERE id = ?1",
                        kind.table()
                    ),
                    params![id],
                    read_row,
                )
                .optional()?)
        })?;

        row.map(|row| row.into_record(kind)).transpose()
    }

    fn set(
        &self,
        kind: IntegrationKind,
        id: &str,
        credentials: Option<&str>,
        status: IntegrationStatus,
    ) -> Result<()> {
        let now = Utc::now().timestamp();
        let rows = self.with_conn(|conn| {
            Ok(conn.execute(
                &format!(
                    "UPDATE {} SET credentials = ?1, status = ?2, updated_at = ?3 WHERE id = ?4",
                    kind.table()
                ),
                params![credentials, status.as_str(), now, id],
            )?)
        })?;

        if rows == 0 {
            return Err(not_found(kind, id));
        }

        tracing::debug!(kind = %kind, id = id, status = %status, "updated credential record");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Lifecycle service
// ---------------------------------------------------------------------------

/// Connect / read / disconnect flows on top of a repository and a codec.
pub struct CredentialService<R> {
    repo: R,
    codec: CredentialCodec,
}

impl<R: CredentialRepository> CredentialService<R> {
    pub fn new(repo: R, codec: CredentialCodec) -> Self {
        Self { repo, codec }
    }

    /// The underlying repository.
    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Store a newly obtained secret and mark the integration connected.
    ///
    /// This is the only transition into [`IntegrationStatus::Connected`].
    /// The previous blob, if any, is overwritten.
    pub fn connect(&self, kind: IntegrationKind, id: &str, secret: &str) -> Result<()> {
        if self.repo.get(kind, id)?.is_none() {
            return Err(not_found(kind, id));
        }

        let blob = self.codec.encrypt(secret)?;
        self.repo.set(kind, id, Some(blob.as_str()), IntegrationStatus::Connected)?;

        tracing::info!(
            kind = %kind,
            id = id,
            secret_sha256 = %crypto::hash_for_audit(secret),
            "integration connected"
        );
        Ok(())
    }

    /// Decrypt the credential of a connected integration.
    ///
    /// Stored values are parsed like the repair pass parses them, so a v1
    /// envelope that classifies as valid is readable here too.
    ///
    /// An unusable credential does not fail the request with a crypto
    /// error: the record is reset to the sentinel and
    /// [`VaultError::ReconnectRequired`] is returned instead. A connected
    /// record with no credential or with the sentinel is moved to
    /// [`IntegrationStatus::Disconnected`] the same way.
    pub fn read_secret(&self, kind: IntegrationKind, id: &str) -> Result<String> {
        let record = self
            .repo
            .get(kind, id)?
            .ok_or_else(|| not_found(kind, id))?;

        if record.status == IntegrationStatus::Disconnected {
            return Err(reconnect_required(kind, id));
        }

        let stored = match record.credentials.as_deref() {
            Some(stored) if !stored.trim().is_empty() && !is_sentinel(stored) => stored,
            credentials => {
                tracing::warn!(
                    kind = %kind,
                    id = id,
                    "connected integration holds no credential, marking disconnected"
                );
                self.repo.set(kind, id, credentials, IntegrationStatus::Disconnected)?;
                return Err(reconnect_required(kind, id));
            }
        };

        match parse_stored(stored).and_then(|blob| self.codec.open_blob(&blob)) {
            Ok(secret) => Ok(secret),
            Err(e) if e.is_unusable_credential() => {
                tracing::warn!(
                    kind = %kind,
                    id = id,
                    error_class = e.class(),
                    "stored credential unusable, resetting integration"
                );
                self.repo.set(kind, id, Some(SENTINEL), IntegrationStatus::Disconnected)?;
                Err(reconnect_required(kind, id))
            }
            Err(e) => Err(e),
        }
    }

    /// Drop the credential and mark the integration disconnected.
    pub fn disconnect(&self, kind: IntegrationKind, id: &str) -> Result<()> {
        self.repo.set(kind, id, None, IntegrationStatus::Disconnected)?;
        tracing::info!(kind = %kind, id = id, "integration disconnected");
        Ok(())
    }
}

fn not_found(kind: IntegrationKind, id: &str) -> VaultError {
    VaultError::CredentialNotFound {
        kind: kind.to_string(),
        id: id.to_string(),
    }
}

fn reconnect_required(kind: IntegrationKind, id: &str) -> VaultError {
    VaultError::ReconnectRequired {
        kind: kind.to_string(),
        id: id.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Internal row types (avoid leaking rusqlite details)
// ---------------------------------------------------------------------------

struct CredentialRow {
    id: String,
    tenant_id: String,
    credentials: Option<String>,
    status: String,
    updated_at: i64,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CredentialRow> {
    Ok(CredentialRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        credentials: row.get(2)?,
        status: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

impl CredentialRow {
    fn into_record(self, kind: IntegrationKind) -> Result<CredentialRecord> {
        let status = IntegrationStatus::parse(&self.status).ok_or_else(|| {
            VaultError::Internal(format!("unknown integration status: {}", self.status))
        })?;

        Ok(CredentialRecord {
            kind,
            id: self.id,
            tenant_id: self.tenant_id,
            credentials: self.credentials,
            status,
            updated_at: DateTime::from_timestamp(self.updated_at, 0).unwrap_or_default(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const WA: IntegrationKind = IntegrationKind::WhatsappAccount;
    const CAL: IntegrationKind = IntegrationKind::CalendarIntegration;

    fn test_service() -> CredentialService<SqliteCredentialStore> {
        let store = SqliteCredentialStore::open_in_memory().unwrap();
        let codec = CredentialCodec::from_key(&crypto::generate_key().unwrap()).unwrap();
        CredentialService::new(store, codec)
    }

    fn seed(service: &CredentialService<SqliteCredentialStore>, kind: IntegrationKind, id: &str) {
        service
            .repository()
            .insert_raw(kind, id, "tenant-1", None, IntegrationStatus::Disconnected)
            .unwrap();
    }

    #[test]
    fn connect_then_read() {
        let service = test_service();
        seed(&service, WA, "wa-1");

        service.connect(WA, "wa-1", "EAAG-token").unwrap();

        let record = service.repository().get(WA, "wa-1").unwrap().unwrap();
        assert_eq!(record.status, IntegrationStatus::Connected);
        assert_ne!(record.credentials.as_deref(), Some("EAAG-token"));
        assert_eq!(service.read_secret(WA, "wa-1").unwrap(), "EAAG-token");
    }

    #[test]
    fn connect_unknown_record_errors() {
        let service = test_service();
        let result = service.connect(CAL, "missing", "x");
        assert!(matches!(result, Err(VaultError::CredentialNotFound { .. })));
    }

    #[test]
    fn reconnect_overwrites_blob() {
        let service = test_service();
        seed(&service, CAL, "cal-1");

        service.connect(CAL, "cal-1", "old").unwrap();
        let first = service.repository().get(CAL, "cal-1").unwrap().unwrap();
        service.connect(CAL, "cal-1", "new").unwrap();
        let second = service.repository().get(CAL, "cal-1").unwrap().unwrap();

        assert_ne!(first.credentials, second.credentials);
        assert_eq!(service.read_secret(CAL, "cal-1").unwrap(), "new");
    }

    #[test]
    fn corrupt_credential_becomes_reconnect_required() {
        let service = test_service();
        service
            .repository()
            .insert_raw(WA, "wa-2", "tenant-1", Some("a:b"), IntegrationStatus::Connected)
            .unwrap();

        let result = service.read_secret(WA, "wa-2");
        assert!(matches!(result, Err(VaultError::ReconnectRequired { .. })));

        let record = service.repository().get(WA, "wa-2").unwrap().unwrap();
        assert!(record.is_reset());
    }

    #[test]
    fn valid_envelope_is_readable() {
        let service = test_service();
        let wire = service.codec.encrypt("calendar-oauth").unwrap();
        let [iv, tag, ct] = crate::blob::EncryptedBlob::split_wire(&wire).unwrap();
        let envelope =
            serde_json::json!({ "v": 1, "ivB64": iv, "tagB64": tag, "ctB64": ct }).to_string();
        service
            .repository()
            .insert_raw(
                CAL,
                "cal-env",
                "tenant-1",
                Some(envelope.as_str()),
                IntegrationStatus::Connected,
            )
            .unwrap();

        assert_eq!(service.read_secret(CAL, "cal-env").unwrap(), "calendar-oauth");

        let record = service.repository().get(CAL, "cal-env").unwrap().unwrap();
        assert_eq!(record.status, IntegrationStatus::Connected);
        assert_eq!(record.credentials.as_deref(), Some(envelope.as_str()));
    }

    #[test]
    fn connected_sentinel_is_marked_disconnected() {
        let service = test_service();
        service
            .repository()
            .insert_raw(WA, "wa-s", "tenant-1", Some(SENTINEL), IntegrationStatus::Connected)
            .unwrap();

        assert!(matches!(
            service.read_secret(WA, "wa-s"),
            Err(VaultError::ReconnectRequired { .. })
        ));
        let record = service.repository().get(WA, "wa-s").unwrap().unwrap();
        assert!(record.is_reset());
    }

    #[test]
    fn connected_without_credential_is_marked_disconnected() {
        let service = test_service();
        service
            .repository()
            .insert_raw(CAL, "cal-n", "tenant-1", None, IntegrationStatus::Connected)
            .unwrap();

        assert!(matches!(
            service.read_secret(CAL, "cal-n"),
            Err(VaultError::ReconnectRequired { .. })
        ));
        let record = service.repository().get(CAL, "cal-n").unwrap().unwrap();
        assert_eq!(record.status, IntegrationStatus::Disconnected);
        assert_eq!(record.credentials, None);
    }

    #[test]
    fn disconnected_record_requires_reconnect() {
        let service = test_service();
        seed(&service, WA, "wa-3");
        service.connect(WA, "wa-3", "token").unwrap();
        service.disconnect(WA, "wa-3").unwrap();

        let record = service.repository().get(WA, "wa-3").unwrap().unwrap();
        assert_eq!(record.status, IntegrationStatus::Disconnected);
        assert_eq!(record.credentials, None);
        assert!(matches!(
            service.read_secret(WA, "wa-3"),
            Err(VaultError::ReconnectRequired { .. })
        ));
    }

    #[test]
    fn kinds_are_stored_separately() {
        let service = test_service();
        seed(&service, WA, "same-id");
        seed(&service, CAL, "same-id");

        service.connect(WA, "same-id", "wa-secret").unwrap();
        service.connect(CAL, "same-id", "cal-secret").unwrap();

        assert_eq!(service.read_secret(WA, "same-id").unwrap(), "wa-secret");
        assert_eq!(service.read_secret(CAL, "same-id").unwrap(), "cal-secret");
        assert_eq!(service.repository().list(WA).unwrap().len(), 1);
    }

    #[test]
    fn set_missing_record_errors() {
        let store = SqliteCredentialStore::open_in_memory().unwrap();
        let result = store.set(WA, "nope", None, IntegrationStatus::Disconnected);
        assert!(matches!(result, Err(VaultError::CredentialNotFound { .. })));
    }

    #[test]
    fn status_strings_roundtrip() {
        for status in [IntegrationStatus::Connected, IntegrationStatus::Disconnected] {
            assert_eq!(IntegrationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(IntegrationStatus::parse("PENDING"), None);
    }
}
