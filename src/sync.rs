//! Incremental synchronization between a directory and the vector index.
//!
//! A sync diffs a fresh scan of the directory against the catalog by
//! `source_id` and content hash, then applies the difference:
//!
//! 1. **Delete phase**: for every modified or vanished file, remove its
//!    chunks from the index (filter `source_id = id`), then its catalog row.
//! 2. **Add phase**: for every new or modified file, write the catalog row as
//!    `pending`, ingest the file, then mark the row `committed`.
//!
//! Deletes always run before adds, so a modified file never has old and new
//! chunks side by side once the sync completes. A row left `pending` by an
//! interrupted run is re-ingested on the next one (`sync.recover_pending`).
//!
//! Everything runs sequentially on the calling task. Two syncs against the
//! same catalog must not overlap; callers serialize them.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::catalog::Catalog;
use crate::chunk::TextSplitter;
use crate::config::Config;
use crate::embedding;
use crate::error::Result;
use crate::ingest::IngestRouter;
use crate::models::{DirectoryEntry, IndexedRecord, RecordStatus};
use crate::scanner::{self, ScanOptions};
use crate::store::{self, MetadataFilter, VectorIndex};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub scan: ScanOptions,
    /// Treat catalog rows still marked `pending` as modified.
    pub recover_pending: bool,
    /// Re-ingest every scanned file regardless of its hash.
    pub full: bool,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scan: ScanOptions::from_config(&config.sync),
            recover_pending: config.sync.recover_pending,
            full: false,
        }
    }
}

/// The difference between a scan and the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Files unknown to the catalog.
    pub to_add: Vec<DirectoryEntry>,
    /// Known files to re-ingest (hash changed, recovered, or forced).
    pub to_modify: Vec<DirectoryEntry>,
    /// Catalogued ids that are no longer on disk.
    pub to_delete: Vec<String>,
    /// Subset of `to_modify` ids re-ingested only because their last
    /// ingestion never committed.
    pub recovered: Vec<String>,
}

impl SyncPlan {
    /// Diff `current` (a scan) against `indexed` (the catalog). Pure.
    pub fn compute(
        current: &[DirectoryEntry],
        indexed: &[IndexedRecord],
        recover_pending: bool,
        full: bool,
    ) -> Self {
        let known: HashMap<&str, &IndexedRecord> = indexed
            .iter()
            .map(|r| (r.source_id.as_str(), r))
            .collect();
        let present: HashSet<&str> = current.iter().map(|e| e.source_id.as_str()).collect();

        let mut plan = SyncPlan::default();
        for entry in current {
            match known.get(entry.source_id.as_str()) {
                None => plan.to_add.push(entry.clone()),
                Some(record) if full || record.content_hash != entry.content_hash => {
                    plan.to_modify.push(entry.clone())
                }
                Some(record) if recover_pending && record.status == RecordStatus::Pending => {
                    plan.recovered.push(entry.source_id.clone());
                    plan.to_modify.push(entry.clone());
                }
                Some(_) => {}
            }
        }

        let mut deleted: Vec<String> = indexed
            .iter()
            .filter(|r| !present.contains(r.source_id.as_str()))
            .map(|r| r.source_id.clone())
            .collect();
        deleted.sort();
        plan.to_delete = deleted;
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_modify.is_empty() && self.to_delete.is_empty()
    }

    /// Distinct ids whose chunks and rows go in the delete phase.
    pub fn delete_queue(&self) -> Vec<String> {
        let ids: BTreeSet<&str> = self
            .to_modify
            .iter()
            .map(|e| e.source_id.as_str())
            .chain(self.to_delete.iter().map(String::as_str))
            .collect();
        ids.into_iter().map(str::to_string).collect()
    }

    /// Entries to ingest in the add phase: additions first, then modifications.
    pub fn ingest_queue(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.to_add.iter().chain(self.to_modify.iter())
    }
}

/// What a sync did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub recovered: Vec<String>,
    pub chunks_indexed: usize,
    pub chunks_removed: u64,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Result of [`SyncEngine::sync`]: the report plus the index handle, ready
/// for immediate queries.
pub struct SyncOutcome {
    pub report: SyncReport,
    pub index: Arc<dyn VectorIndex>,
}

pub struct SyncEngine {
    catalog: Catalog,
    router: IngestRouter,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(catalog: Catalog, router: IngestRouter, options: SyncOptions) -> Self {
        Self {
            catalog,
            router,
            options,
        }
    }

    /// Wire up the catalog, embedder, vector index, and router from config.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let catalog = Catalog::connect(config).await?;
        let embedder = embedding::create_embedder(&config.embedding)?;
        let index = store::connect(config, embedder).await?;
        let router = IngestRouter::new(index, TextSplitter::from_config(&config.chunking)?);
        Ok(Self::new(catalog, router, SyncOptions::from_config(config)))
    }

    pub fn router(&self) -> &IngestRouter {
        &self.router
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        self.router.index()
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut SyncOptions {
        &mut self.options
    }

    /// Compute the diff for `directory` without writing anything except the
    /// catalog table itself, if it did not exist.
    pub async fn plan(&self, directory: &Path) -> Result<SyncPlan> {
        self.catalog.initialize().await?;
        let current = scanner::scan_directory(directory, &self.options.scan)?;
        if current.is_empty() {
            return Ok(SyncPlan::default());
        }
        let indexed = self.catalog.list_indexed().await?;
        Ok(SyncPlan::compute(
            &current,
            &indexed,
            self.options.recover_pending,
            self.options.full,
        ))
    }

    /// Bring the catalog and index in line with `directory`.
    ///
    /// An empty or missing directory is a no-op: nothing is deleted, even if
    /// the catalog has rows.
    pub async fn sync(&self, directory: &Path) -> Result<SyncOutcome> {
        tracing::info!(directory = %directory.display(), "sync started");
        let plan = self.plan(directory).await?;

        let mut report = SyncReport {
            added: plan.to_add.iter().map(|e| e.source_id.clone()).collect(),
            modified: plan.to_modify.iter().map(|e| e.source_id.clone()).collect(),
            deleted: plan.to_delete.clone(),
            recovered: plan.recovered.clone(),
            ..Default::default()
        };

        if plan.is_empty() {
            tracing::info!("catalog is up to date");
            return Ok(self.outcome(report));
        }

        tracing::info!(
            added = plan.to_add.len(),
            modified = plan.to_modify.len(),
            deleted = plan.to_delete.len(),
            recovered = plan.recovered.len(),
            "changes detected"
        );

        for source_id in plan.delete_queue() {
            let removed = self
                .index()
                .delete(&MetadataFilter::source_id(source_id.as_str()))
                .await?;
            self.catalog.delete(&source_id).await?;
            report.chunks_removed += removed;
            tracing::info!(source_id = %source_id, chunks = removed, "removed from index");
        }

        for entry in plan.ingest_queue() {
            self.catalog.upsert(entry, RecordStatus::Pending).await?;
            let n = self
                .router
                .ingest(Path::new(&entry.file_path), Some(&entry.source_id))
                .await?;
            self.catalog
                .set_status(&entry.source_id, RecordStatus::Committed)
                .await?;
            report.chunks_indexed += n;
            tracing::info!(source_id = %entry.source_id, chunks = n, "ingested");
        }

        tracing::info!(
            chunks_indexed = report.chunks_indexed,
            chunks_removed = report.chunks_removed,
            "sync completed"
        );
        Ok(self.outcome(report))
    }

    /// Drop a file's chunks and catalog row. The next sync sees the file as
    /// new if it is still on disk. Returns the number of chunks removed and
    /// whether a catalog row existed.
    pub async fn forget(&self, source_id: &str) -> Result<(u64, bool)> {
        self.catalog.initialize().await?;
        let removed = self
            .index()
            .delete(&MetadataFilter::source_id(source_id))
            .await?;
        let existed = self.catalog.delete(source_id).await?;
        tracing::info!(source_id, chunks = removed, existed, "forgotten");
        Ok((removed, existed))
    }

    fn outcome(&self, report: SyncReport) -> SyncOutcome {
        SyncOutcome {
            report,
            index: Arc::clone(self.index()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(id: &str, hash: &str) -> DirectoryEntry {
        DirectoryEntry {
            source_id: id.to_string(),
            file_path: format!("data/{}", id),
            file_type: "txt".to_string(),
            last_modified: Utc::now(),
            content_hash: hash.to_string(),
        }
    }

    fn record(id: &str, hash: &str, status: RecordStatus) -> IndexedRecord {
        IndexedRecord {
            source_id: id.to_string(),
            file_path: format!("data/{}", id),
            content_hash: hash.to_string(),
            status,
        }
    }

    fn ids(entries: &[DirectoryEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.source_id.as_str()).collect()
    }

    #[test]
    fn classifies_add_modify_delete() {
        let current = vec![entry("a.txt", "1"), entry("b.txt", "2x"), entry("c.txt", "3")];
        let indexed = vec![
            record("b.txt", "2", RecordStatus::Committed),
            record("c.txt", "3", RecordStatus::Committed),
            record("d.txt", "4", RecordStatus::Committed),
        ];
        let plan = SyncPlan::compute(&current, &indexed, true, false);
        assert_eq!(ids(&plan.to_add), vec!["a.txt"]);
        assert_eq!(ids(&plan.to_modify), vec!["b.txt"]);
        assert_eq!(plan.to_delete, vec!["d.txt"]);
        assert_eq!(plan.delete_queue(), vec!["b.txt", "d.txt"]);
        let queued: Vec<&str> = plan.ingest_queue().map(|e| e.source_id.as_str()).collect();
        assert_eq!(queued, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn unchanged_catalog_is_empty_plan() {
        let current = vec![entry("a.txt", "1")];
        let indexed = vec![record("a.txt", "1", RecordStatus::Committed)];
        assert!(SyncPlan::compute(&current, &indexed, true, false).is_empty());
    }

    #[test]
    fn pending_rows_are_recovered_only_when_enabled() {
        let current = vec![entry("a.txt", "1")];
        let indexed = vec![record("a.txt", "1", RecordStatus::Pending)];

        let plan = SyncPlan::compute(&current, &indexed, true, false);
        assert_eq!(ids(&plan.to_modify), vec!["a.txt"]);
        assert_eq!(plan.recovered, vec!["a.txt"]);

        assert!(SyncPlan::compute(&current, &indexed, false, false).is_empty());
    }

    #[test]
    fn full_forces_every_known_file() {
        let current = vec![entry("a.txt", "1"), entry("b.txt", "2")];
        let indexed = vec![
            record("a.txt", "1", RecordStatus::Committed),
            record("b.txt", "2", RecordStatus::Committed),
        ];
        let plan = SyncPlan::compute(&current, &indexed, true, true);
        assert_eq!(ids(&plan.to_modify), vec!["a.txt", "b.txt"]);
        assert!(plan.recovered.is_empty());
    }

    #[test]
    fn rename_is_delete_plus_add() {
        let current = vec![entry("new/name.txt", "same")];
        let indexed = vec![record("old/name.txt", "same", RecordStatus::Committed)];
        let plan = SyncPlan::compute(&current, &indexed, true, false);
        assert_eq!(ids(&plan.to_add), vec!["new/name.txt"]);
        assert_eq!(plan.to_delete, vec!["old/name.txt"]);
    }

    #[test]
    fn case_change_is_a_different_id() {
        let current = vec![entry("Report.txt", "h")];
        let indexed = vec![record("report.txt", "h", RecordStatus::Committed)];
        let plan = SyncPlan::compute(&current, &indexed, true, false);
        assert_eq!(ids(&plan.to_add), vec!["Report.txt"]);
        assert_eq!(plan.to_delete, vec!["report.txt"]);
    }
}
