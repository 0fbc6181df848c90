//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the only contract the ingestion router, the
//! sync engine, and retrieval rely on: add chunks, delete by metadata
//! filter, search by similarity, count. Two local adapters implement it:
//!
//! | Backend | Type | Persistence |
//! |---------|------|-------------|
//! | `sqlite` | [`SqliteIndex`] | file on disk |
//! | `memory` | [`InMemoryIndex`] | process lifetime |
//!
//! Both embed through an [`Embedder`] handed in at construction and rank
//! by brute-force cosine similarity. Implementations must be `Send + Sync`
//! so one handle can be shared between the sync engine and the HTTP server.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::models::{Chunk, ChunkMetadata, ScoredChunk};

pub use memory::InMemoryIndex;
pub use sqlite::SqliteIndex;

/// Equality predicates over chunk metadata, combined with AND.
///
/// An empty filter is rejected by [`VectorIndex::delete`]; deleting
/// everything must never be the result of a missing field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
}

impl MetadataFilter {
    /// Every chunk carrying this `source_id`.
    pub fn source_id(source_id: impl Into<String>) -> Self {
        Self {
            source_id: Some(source_id.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.source_id.is_none()
            && self.file_type.is_none()
            && self.page.is_none()
            && self.sheet_name.is_none()
    }

    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        fn eq<T: PartialEq>(want: &Option<T>, got: &T) -> bool {
            want.as_ref().map_or(true, |w| w == got)
        }
        fn eq_opt<T: PartialEq>(want: &Option<T>, got: &Option<T>) -> bool {
            want.is_none() || want == got
        }
        eq(&self.source, &meta.source)
            && eq(&self.source_id, &meta.source_id)
            && eq(&self.file_type, &meta.file_type)
            && eq_opt(&self.page, &meta.page)
            && eq_opt(&self.sheet_name, &meta.sheet_name)
    }

    pub(crate) fn require_non_empty(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::index("refusing to delete with an empty filter"));
        }
        Ok(())
    }
}

/// Pluggable vector store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](VectorIndex::add) | Embed and insert chunks, returning their ids |
/// | [`delete`](VectorIndex::delete) | Remove every chunk matching a filter |
/// | [`similarity_search`](VectorIndex::similarity_search) | Top-k chunks for a query |
/// | [`count`](VectorIndex::count) | Number of chunks, optionally filtered |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embed and insert `chunks`. Returns one id per chunk, in order.
    async fn add(&self, chunks: &[Chunk]) -> Result<Vec<String>>;

    /// Remove every chunk matching `filter`. Returns how many were removed;
    /// zero matches is not an error.
    async fn delete(&self, filter: &MetadataFilter) -> Result<u64>;

    /// The `k` chunks most similar to `query`, best first.
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>>;

    async fn count(&self, filter: Option<&MetadataFilter>) -> Result<u64>;
}

/// Build the index configured in `[index]`.
pub async fn connect(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Arc<dyn VectorIndex>> {
    match config.index.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryIndex::new(embedder))),
        "sqlite" => {
            let index =
                SqliteIndex::connect(&config.index.path, &config.index.collection, embedder)
                    .await?;
            Ok(Arc::new(index))
        }
        other => Err(Error::Config(format!(
            "unknown index backend: '{}'",
            other
        ))),
    }
}
