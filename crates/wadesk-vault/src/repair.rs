//! Batch repair of invalid stored credentials.
//!
//! The repair pass scans every credential record, classifies its stored
//! value, and overwrites anything malformed or corrupt with the
//! [`SENTINEL`] while moving the record to
//! [`IntegrationStatus::Disconnected`]. Tenants then see "reconnect
//! required" instead of a failing integration.
//!
//! A record still marked connected while holding the sentinel or no value at
//! all is moved to disconnected as well, keeping its stored value.
//!
//! Records that are already disconnected and hold the sentinel are skipped,
//! so a second run is a no-op. Two passes racing over the same records both
//! write the same sentinel and status; the race is harmless and is not
//! serialized.
//!
//! A failure on one record is logged and counted, and the pass moves on to
//! the next record.

use serde::Serialize;

use crate::blob::SENTINEL;
use crate::classify::{Classification, classify};
use crate::codec::CredentialCodec;
use crate::error::Result;
use crate::store::{CredentialRecord, CredentialRepository, IntegrationKind, IntegrationStatus};

/// Knobs for a repair run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepairOptions {
    /// Classify and count, but write nothing.
    pub dry_run: bool,

    /// Also reset values that are not blobs at all (legacy plaintext).
    /// Off by default: such values are left untouched.
    pub reset_legacy: bool,
}

/// Outcome counts of a repair run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// Records examined (excluding ones already reset).
    pub scanned: usize,
    /// Records reset to the sentinel or moved to disconnected (or that would
    /// be, in a dry run).
    pub fixed: usize,
    /// Records left as they were.
    pub skipped: usize,
    /// Records that could not be processed.
    pub failed: usize,
    /// Records already reset by an earlier run.
    pub already_reset: usize,
    /// `fixed` broken down by integration kind.
    pub fixed_whatsapp: usize,
    pub fixed_calendar: usize,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

impl RepairReport {
    fn record_fix(&mut self, kind: IntegrationKind) {
        self.fixed += 1;
        match kind {
            IntegrationKind::WhatsappAccount => self.fixed_whatsapp += 1,
            IntegrationKind::CalendarIntegration => self.fixed_calendar += 1,
        }
    }
}

/// Whether a classified value should be replaced by the sentinel.
pub fn needs_repair(class: &Classification, options: &RepairOptions) -> bool {
    class.is_invalid() || (options.reset_legacy && *class == Classification::NotBlob)
}

/// Run the repair pass over every record in `repo`.
///
/// Only listing a kind can fail the whole run; everything per record is
/// caught and counted in [`RepairReport::failed`].
pub fn repair_credentials<R>(
    repo: &R,
    codec: &CredentialCodec,
    options: RepairOptions,
) -> Result<RepairReport>
where
    R: CredentialRepository + ?Sized,
{
    let mut report = RepairReport {
        dry_run: options.dry_run,
        ..RepairReport::default()
    };

    tracing::info!(
        dry_run = options.dry_run,
        reset_legacy = options.reset_legacy,
        "starting credential repair pass"
    );

    for kind in IntegrationKind::ALL {
        for record in repo.list(kind)? {
            if record.is_reset() {
                report.already_reset += 1;
                continue;
            }

            report.scanned += 1;
            match repair_record(repo, codec, &record, &options) {
                Ok(true) => report.record_fix(kind),
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        kind = %kind,
                        id = %record.id,
                        error_class = e.class(),
                        error = %e,
                        "failed to repair credential record"
                    );
                }
            }
        }
    }

    tracing::info!(
        scanned = report.scanned,
        fixed = report.fixed,
        skipped = report.skipped,
        failed = report.failed,
        already_reset = report.already_reset,
        "credential repair pass complete"
    );

    Ok(report)
}

/// Whether a record claims to be connected while holding nothing usable.
fn is_stale_connection(class: &Classification, record: &CredentialRecord) -> bool {
    record.status == IntegrationStatus::Connected
        && matches!(class, Classification::Missing | Classification::Sentinel)
}

/// Classify one record and reset it if needed. Returns whether it was fixed.
fn repair_record<R>(
    repo: &R,
    codec: &CredentialCodec,
    record: &CredentialRecord,
    options: &RepairOptions,
) -> Result<bool>
where
    R: CredentialRepository + ?Sized,
{
    let class = classify(record.credentials.as_deref(), codec);

    if is_stale_connection(&class, record) {
        tracing::info!(
            kind = %record.kind,
            id = %record.id,
            tenant_id = %record.tenant_id,
            classification = class.label(),
            dry_run = options.dry_run,
            "marking integration without credential disconnected"
        );
        if !options.dry_run {
            repo.set(
                record.kind,
                &record.id,
                record.credentials.as_deref(),
                IntegrationStatus::Disconnected,
            )?;
        }
        return Ok(true);
    }

    if !needs_repair(&class, options) {
        tracing::debug!(
            kind = %record.kind,
            id = %record.id,
            classification = class.label(),
            "credential left untouched"
        );
        return Ok(false);
    }

    tracing::info!(
        kind = %record.kind,
        id = %record.id,
        tenant_id = %record.tenant_id,
        classification = class.label(),
        dry_run = options.dry_run,
        "resetting credential to sentinel"
    );

    if !options.dry_run {
        repo.set(
            record.kind,
            &record.id,
            Some(SENTINEL),
            IntegrationStatus::Disconnected,
        )?;
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;
    use crate::error::VaultError;

    const WA: IntegrationKind = IntegrationKind::WhatsappAccount;
    const CAL: IntegrationKind = IntegrationKind::CalendarIntegration;
    const CONNECTED: IntegrationStatus = IntegrationStatus::Connected;

    /// In-memory repository whose writes can be made to fail for chosen ids.
    #[derive(Default)]
    struct MemoryRepo {
        records: Mutex<HashMap<(IntegrationKind, String), CredentialRecord>>,
        failing_ids: Vec<String>,
    }

    impl MemoryRepo {
        fn insert(
            &self,
            kind: IntegrationKind,
            id: &str,
            value: Option<&str>,
            status: IntegrationStatus,
        ) {
            let record = CredentialRecord {
                kind,
                id: id.to_string(),
                tenant_id: "tenant".into(),
                credentials: value.map(str::to_string),
                status,
                updated_at: Utc::now(),
            };
            self.records
                .lock()
                .unwrap()
                .insert((kind, id.to_string()), record);
        }

        fn record(&self, kind: IntegrationKind, id: &str) -> CredentialRecord {
            self.get(kind, id).unwrap().unwrap()
        }
    }

    impl CredentialRepository for MemoryRepo {
        fn list(&self, kind: IntegrationKind) -> Result<Vec<CredentialRecord>> {
            let mut out: Vec<_> = self
                .records
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.kind == kind)
                .cloned()
                .collect();
            out.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(out)
        }

        fn get(&self, kind: IntegrationKind, id: &str) -> Result<Option<CredentialRecord>> {
            let records = self.records.lock().unwrap();
            Ok(records.get(&(kind, id.to_string())).cloned())
        }

        fn set(
            &self,
            kind: IntegrationKind,
            id: &str,
            credentials: Option<&str>,
            status: IntegrationStatus,
        ) -> Result<()> {
            if self.failing_ids.iter().any(|f| f == id) {
                return Err(VaultError::Internal("simulated write failure".into()));
            }
            let mut records = self.records.lock().unwrap();
            let record = records.get_mut(&(kind, id.to_string())).ok_or_else(|| {
                VaultError::CredentialNotFound {
                    kind: kind.to_string(),
                    id: id.to_string(),
                }
            })?;
            record.credentials = credentials.map(str::to_string);
            record.status = status;
            Ok(())
        }
    }

    fn codec() -> CredentialCodec {
        CredentialCodec::from_config_value(&"00".repeat(32)).unwrap()
    }

    const EMPTY_ENVELOPE: &str = r#"{"v":1,"ivB64":"","tagB64":"","ctB64":""}"#;

    #[test]
    fn resets_invalid_and_keeps_valid() {
        let codec = codec();
        let repo = MemoryRepo::default();
        let good = codec.encrypt("good").unwrap();
        repo.insert(WA, "a", Some(good.as_str()), CONNECTED);
        repo.insert(WA, "b", Some(EMPTY_ENVELOPE), CONNECTED);
        repo.insert(CAL, "c", Some("legacy"), CONNECTED);

        let report = repair_credentials(&repo, &codec, RepairOptions::default()).unwrap();

        assert_eq!(report.scanned, 3);
        assert_eq!(report.fixed, 1);
        assert_eq!(report.fixed_whatsapp, 1);
        assert_eq!(report.skipped, 2);

        let b = repo.record(WA, "b");
        assert_eq!(b.credentials.as_deref(), Some(SENTINEL));
        assert_eq!(b.status, IntegrationStatus::Disconnected);

        let a = repo.record(WA, "a");
        assert_eq!(a.credentials.as_deref(), Some(good.as_str()));
    }

    #[test]
    fn second_pass_fixes_nothing() {
        let codec = codec();
        let repo = MemoryRepo::default();
        repo.insert(CAL, "x", Some(EMPTY_ENVELOPE), CONNECTED);

        let first = repair_credentials(&repo, &codec, RepairOptions::default()).unwrap();
        let second = repair_credentials(&repo, &codec, RepairOptions::default()).unwrap();

        assert_eq!(first.fixed, 1);
        assert_eq!(second.fixed, 0);
        assert_eq!(second.already_reset, 1);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let codec = codec();
        let repo = MemoryRepo::default();
        repo.insert(WA, "d", Some(EMPTY_ENVELOPE), CONNECTED);
        repo.insert(WA, "e", Some(SENTINEL), CONNECTED);

        let options = RepairOptions {
            dry_run: true,
            ..RepairOptions::default()
        };
        let report = repair_credentials(&repo, &codec, options).unwrap();

        assert!(report.dry_run);
        assert_eq!(report.fixed, 2);
        let d = repo.record(WA, "d");
        assert_eq!(d.credentials.as_deref(), Some(EMPTY_ENVELOPE));
        assert_eq!(d.status, CONNECTED);
        assert_eq!(repo.record(WA, "e").status, CONNECTED);
    }

    #[test]
    fn reset_legacy_option_resets_plaintext() {
        let codec = codec();
        let repo = MemoryRepo::default();
        repo.insert(WA, "l", Some("plaintext-token"), CONNECTED);

        let options = RepairOptions {
            reset_legacy: true,
            ..RepairOptions::default()
        };
        let report = repair_credentials(&repo, &codec, options).unwrap();

        assert_eq!(report.fixed, 1);
        assert!(repo.record(WA, "l").is_reset());
    }

    #[test]
    fn failing_record_does_not_abort_batch() {
        let codec = codec();
        let repo = MemoryRepo {
            failing_ids: vec!["bad-write".into()],
            ..MemoryRepo::default()
        };
        repo.insert(WA, "bad-write", Some(EMPTY_ENVELOPE), CONNECTED);
        repo.insert(WA, "ok-write", Some(EMPTY_ENVELOPE), CONNECTED);

        let report = repair_credentials(&repo, &codec, RepairOptions::default()).unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.fixed, 1);
        assert!(repo.record(WA, "ok-write").is_reset());
    }

    #[test]
    fn connected_sentinel_is_marked_disconnected() {
        let codec = codec();
        let repo = MemoryRepo::default();
        repo.insert(WA, "s", Some(SENTINEL), CONNECTED);

        let first = repair_credentials(&repo, &codec, RepairOptions::default()).unwrap();
        assert_eq!(first.fixed, 1);
        assert!(repo.record(WA, "s").is_reset());

        let second = repair_credentials(&repo, &codec, RepairOptions::default()).unwrap();
        assert_eq!(second.fixed, 0);
        assert_eq!(second.already_reset, 1);
    }

    #[test]
    fn connected_without_credential_is_marked_disconnected() {
        let codec = codec();
        let repo = MemoryRepo::default();
        repo.insert(CAL, "n", None, CONNECTED);
        repo.insert(CAL, "m", None, IntegrationStatus::Disconnected);

        let first = repair_credentials(&repo, &codec, RepairOptions::default()).unwrap();
        assert_eq!(first.fixed_calendar, 1);
        assert_eq!(first.skipped, 1);

        let n = repo.record(CAL, "n");
        assert_eq!(n.status, IntegrationStatus::Disconnected);
        assert_eq!(n.credentials, None);

        let second = repair_credentials(&repo, &codec, RepairOptions::default()).unwrap();
        assert_eq!(second.fixed, 0);
        assert_eq!(second.skipped, 2);
    }
}
