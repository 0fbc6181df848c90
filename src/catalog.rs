//! Document catalog: the persisted record of what has been indexed.
//!
//! One row per physical file, keyed by `source_id` (the path relative to the
//! synchronized root). The catalog is the system's source of truth for
//! "what is in the vector index", and the sync engine diffs it against a
//! fresh directory scan.
//!
//! The catalog and the vector index share no transaction. Rows carry a
//! [`RecordStatus`]: the sync engine writes `pending` before ingesting a
//! file and `committed` after, so an interrupted ingestion is visible on the
//! next run instead of masquerading as success.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::config::{Config, DEFAULT_EXTENSIONS};
use crate::db;
use crate::error::{Error, Result};
use crate::models::{DirectoryEntry, IndexedRecord, RecordStatus, SourceRecord};
use crate::scanner::{self, ScanOptions};

/// Handle on the catalog table. Cheap to clone (wraps a pool).
#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the catalog database configured in `[db]`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = db::connect(&config.db.path)
            .await
            .map_err(Error::Storage)?;
        Ok(Self::new(pool))
    }

    /// Ensure the table exists. Safe to call on every startup.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS document_catalog (
                source_id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                file_type TEXT NOT NULL,
                last_modified INTEGER NOT NULL,
                indexed_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
                content_hash TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'committed'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(Error::Storage)?;

        // Catalogs created before ingestion status was tracked lack the column.
        let has_status: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('document_catalog') WHERE name = 'status'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Storage)?;

        if !has_status {
            sqlx::query(
                "ALTER TABLE document_catalog ADD COLUMN status TEXT NOT NULL DEFAULT 'committed'",
            )
            .execute(&self.pool)
            .await
            .map_err(Error::Storage)?;
            tracing::info!("added status column to document_catalog");
        }

        Ok(())
    }

    /// Scan `root` with the default supported-extension set.
    ///
    /// Convenience over [`scanner::scan_directory`] for callers that have no
    /// sync configuration at hand.
    pub fn scan_directory(&self, root: &Path) -> Result<Vec<DirectoryEntry>> {
        let options = ScanOptions::with_extensions(DEFAULT_EXTENSIONS);
        scanner::scan_directory(root, &options)
    }

    /// Identity and hash of every catalogued file.
    pub async fn list_indexed(&self) -> Result<Vec<IndexedRecord>> {
        let rows = sqlx::query(
            "SELECT source_id, file_path, content_hash, status FROM document_catalog ORDER BY source_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Storage)?;

        let records: Vec<IndexedRecord> = rows
            .iter()
            .map(|row| IndexedRecord {
                source_id: row.get("source_id"),
                file_path: row.get("file_path"),
                content_hash: row.get("content_hash"),
                status: RecordStatus::parse(row.get::<String, _>("status").as_str()),
            })
            .collect();

        tracing::debug!(count = records.len(), "indexed files retrieved from the catalog");
        Ok(records)
    }

    /// Insert or update the row for `entry.source_id`.
    ///
    /// On conflict the hash, mtime, type, index time, and status are
    /// overwritten; the identity columns (`source_id`, `file_path`) are not.
    pub async fn upsert(&self, entry: &DirectoryEntry, status: RecordStatus) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO document_catalog
                (source_id, file_path, file_type, last_modified, indexed_at, content_hash, status)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_id) DO UPDATE SET
                content_hash = excluded.content_hash,
                last_modified = excluded.last_modified,
                file_type = excluded.file_type,
                indexed_at = excluded.indexed_at,
                status = excluded.status
            "#,
        )
        .bind(&entry.source_id)
        .bind(&entry.file_path)
        .bind(&entry.file_type)
        .bind(entry.last_modified.timestamp())
        .bind(Utc::now().timestamp())
        .bind(&entry.content_hash)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::Storage)?;

        Ok(())
    }

    /// Change the ingestion status of an existing row. No-op if absent.
    pub async fn set_status(&self, source_id: &str, status: RecordStatus) -> Result<()> {
        sqlx::query("UPDATE document_catalog SET status = ? WHERE source_id = ?")
            .bind(status.as_str())
            .bind(source_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Storage)?;
        Ok(())
    }

    /// Remove the row for `source_id`. Returns whether a row existed.
    pub async fn delete(&self, source_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM document_catalog WHERE source_id = ?")
            .bind(source_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Storage)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, source_id: &str) -> Result<Option<SourceRecord>> {
        let row = sqlx::query(
            r#"
            SELECT source_id, file_path, file_type, last_modified, indexed_at, content_hash, status
            FROM document_catalog WHERE source_id = ?
            "#,
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Storage)?;

        Ok(row.as_ref().map(record_from_row))
    }

    /// Full rows, ordered by `source_id`.
    pub async fn list_records(&self) -> Result<Vec<SourceRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT source_id, file_path, file_type, last_modified, indexed_at, content_hash, status
            FROM document_catalog ORDER BY source_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Storage)?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    pub async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document_catalog")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Storage)?;
        Ok(n as u64)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> SourceRecord {
    SourceRecord {
        source_id: row.get("source_id"),
        file_path: row.get("file_path"),
        file_type: row.get("file_type"),
        last_modified: ts_to_utc(row.get("last_modified")),
        indexed_at: ts_to_utc(row.get("indexed_at")),
        content_hash: row.get("content_hash"),
        status: RecordStatus::parse(row.get::<String, _>("status").as_str()),
    }
}

fn ts_to_utc(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn memory_catalog() -> Catalog {
        let catalog = Catalog::new(db::connect_in_memory().await.unwrap());
        catalog.initialize().await.unwrap();
        catalog
    }

    fn entry(source_id: &str, hash: &str) -> DirectoryEntry {
        DirectoryEntry {
            source_id: source_id.to_string(),
            file_path: format!("data/{}", source_id),
            file_type: "txt".to_string(),
            last_modified: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            content_hash: hash.to_string(),
        }
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let catalog = memory_catalog().await;
        catalog.initialize().await.unwrap();
        catalog.initialize().await.unwrap();
        assert_eq!(catalog.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_inserts_then_updates_in_place() {
        let catalog = memory_catalog().await;
        catalog
            .upsert(&entry("b.txt", "h1"), RecordStatus::Committed)
            .await
            .unwrap();

        let mut changed = entry("b.txt", "h2");
        changed.file_path = "elsewhere/b.txt".to_string();
        changed.file_type = "csv".to_string();
        catalog
            .upsert(&changed, RecordStatus::Pending)
            .await
            .unwrap();

        assert_eq!(catalog.count().await.unwrap(), 1);
        let record = catalog.get("b.txt").await.unwrap().unwrap();
        assert_eq!(record.content_hash, "h2");
        assert_eq!(record.file_type, "csv");
        assert_eq!(record.status, RecordStatus::Pending);
        // Identity columns are kept from the first insert.
        assert_eq!(record.file_path, "data/b.txt");
    }

    #[tokio::test]
    async fn list_indexed_returns_identity_and_hash() {
        let catalog = memory_catalog().await;
        catalog
            .upsert(&entry("b.txt", "hb"), RecordStatus::Committed)
            .await
            .unwrap();
        catalog
            .upsert(&entry("a.pdf", "ha"), RecordStatus::Pending)
            .await
            .unwrap();

        let indexed = catalog.list_indexed().await.unwrap();
        assert_eq!(indexed.len(), 2);
        assert_eq!(indexed[0].source_id, "a.pdf");
        assert_eq!(indexed[0].content_hash, "ha");
        assert_eq!(indexed[0].status, RecordStatus::Pending);
        assert_eq!(indexed[1].source_id, "b.txt");
    }

    #[tokio::test]
    async fn delete_absent_is_noop() {
        let catalog = memory_catalog().await;
        assert!(!catalog.delete("nope.txt").await.unwrap());
        catalog
            .upsert(&entry("b.txt", "h"), RecordStatus::Committed)
            .await
            .unwrap();
        assert!(catalog.delete("b.txt").await.unwrap());
        assert!(catalog.get("b.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_status_flips_pending_to_committed() {
        let catalog = memory_catalog().await;
        catalog
            .upsert(&entry("b.txt", "h"), RecordStatus::Pending)
            .await
            .unwrap();
        catalog
            .set_status("b.txt", RecordStatus::Committed)
            .await
            .unwrap();
        let record = catalog.get("b.txt").await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Committed);
        assert_eq!(record.last_modified.timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn legacy_table_gains_status_column() {
        let pool = db::connect_in_memory().await.unwrap();
        sqlx::query(
            r#"
            CREATE TABLE document_catalog (
                source_id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                file_type TEXT NOT NULL,
                last_modified INTEGER NOT NULL,
                indexed_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
                content_hash TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO document_catalog (source_id, file_path, file_type, last_modified, content_hash) VALUES ('old.txt', 'data/old.txt', 'txt', 0, 'h')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let catalog = Catalog::new(pool);
        catalog.initialize().await.unwrap();
        let indexed = catalog.list_indexed().await.unwrap();
        assert_eq!(indexed.len(), 1);
        assert_eq!(indexed[0].status, RecordStatus::Committed);
    }
}
