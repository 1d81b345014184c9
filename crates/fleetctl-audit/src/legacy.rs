//! One-time migration of newline-delimited-JSON legacy audit logs into
//! [`AuditEventStore`].
//!
//! Each line is a serialized [`AuditEvent`]. A line that fails to parse
//! does not abort the migration: it is recorded as a
//! [`EventType::MigrationParseError`] event so the gap is itself
//! auditable, inheriting `last_good_timestamp_ms` so the parse-error
//! record sorts immediately after whatever it followed, with the id
//! column (insertion order) breaking the tie — legacy files have no
//! out-of-band index to recover a real timestamp for a line that doesn't
//! parse. The source file is deleted only if every line migrated or was
//! captured as a parse error; any I/O failure leaves it in place for a
//! retry.

use std::path::Path;

use crate::event::{AuditEvent, AuditEventData, EventType, MigrationErrorRecord};
use crate::store::AuditEventStore;
use crate::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegacyMigrationReport {
    pub migrated: u64,
    pub parse_errors: u64,
}

pub async fn migrate_legacy_file(store: &AuditEventStore, path: impl AsRef<Path>) -> Result<LegacyMigrationReport> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path).await?;
    let mut report = LegacyMigrationReport::default();
    let mut last_timestamp_ms = 0i64;

    for (line_no, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEvent>(line) {
            Ok(event) => {
                last_timestamp_ms = last_timestamp_ms.max(event.timestamp_ms);
                store.write(&event).await?;
                report.migrated += 1;
            }
            Err(parse_err) => {
                let data = AuditEventData {
                    migration_error: Some(MigrationErrorRecord {
                        migration_id: line_no as u32,
                        message: parse_err.to_string(),
                        raw_data: line.to_string(),
                    }),
                    ..Default::default()
                };
                let event = AuditEvent::new(EventType::MigrationParseError, "LegacyAuditLog", last_timestamp_ms, data);
                store.write(&event).await?;
                report.parse_errors += 1;
            }
        }
    }

    tokio::fs::remove_file(path).await?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{MachineRecord, Session};
    use crate::store::AuditStoreConfig;

    async fn store() -> AuditEventStore {
        AuditEventStore::open(":memory:", AuditStoreConfig::default()).await.unwrap()
    }

    fn good_line(ts: i64) -> String {
        let event = AuditEvent::new(
            EventType::Create,
            "Machine",
            ts,
            AuditEventData {
                session: Some(Session::internal_agent()),
                machine: Some(MachineRecord { id: "m1".into() }),
                ..Default::default()
            },
        );
        serde_json::to_string(&event).unwrap()
    }

    #[tokio::test]
    async fn migrates_well_formed_lines_and_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.ndjson");
        tokio::fs::write(&path, format!("{}\n{}\n", good_line(100), good_line(200)))
            .await
            .unwrap();

        let store = store().await;
        let report = migrate_legacy_file(&store, &path).await.unwrap();
        assert_eq!(report.migrated, 2);
        assert_eq!(report.parse_errors, 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn malformed_line_is_captured_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.ndjson");
        tokio::fs::write(&path, format!("{}\nnot json\n{}\n", good_line(100), good_line(200)))
            .await
            .unwrap();

        let store = store().await;
        let report = migrate_legacy_file(&store, &path).await.unwrap();
        assert_eq!(report.migrated, 2);
        assert_eq!(report.parse_errors, 1);

        let rows: Vec<_> = store.reader(0, i64::MAX).await.unwrap().collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].event_type, EventType::MigrationParseError);
        assert_eq!(rows[1].timestamp_ms, rows[0].timestamp_ms);
        assert!(rows[1].timestamp_ms < rows[2].timestamp_ms);
    }
}
