//! In-memory [`VectorIndex`] for tests and the `memory` backend.
//!
//! Entries live in a `Vec` behind `std::sync::RwLock`. Search is brute-force
//! cosine similarity over everything stored. Nothing survives the process.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{Error, Result};
use crate::models::{Chunk, ChunkMetadata, ScoredChunk};

use super::{MetadataFilter, VectorIndex};

struct StoredChunk {
    id: String,
    content: String,
    metadata: ChunkMetadata,
    vector: Vec<f32>,
}

pub struct InMemoryIndex {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<StoredChunk>>,
}

impl InMemoryIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Metadata of every stored chunk, in insertion order.
    pub fn metadata(&self) -> Result<Vec<ChunkMetadata>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.iter().map(|e| e.metadata.clone()).collect())
    }
}

fn poisoned() -> Error {
    Error::index("in-memory index lock poisoned")
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn add(&self, chunks: &[Chunk]) -> Result<Vec<String>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(Error::index(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.iter().zip(vectors) {
            let id = Uuid::new_v4().to_string();
            entries.push(StoredChunk {
                id: id.clone(),
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
                vector,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<u64> {
        filter.require_non_empty()?;
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let before = entries.len();
        entries.retain(|e| !filter.matches(&e.metadata));
        Ok((before - entries.len()) as u64)
    }

    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query_vec = self.embedder.embed_query(query).await?;
        let entries = self.entries.read().map_err(|_| poisoned())?;

        let mut scored: Vec<ScoredChunk> = entries
            .iter()
            .map(|e| ScoredChunk {
                id: e.id.clone(),
                content: e.content.clone(),
                metadata: e.metadata.clone(),
                score: cosine_similarity(&query_vec, &e.vector),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self, filter: Option<&MetadataFilter>) -> Result<u64> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        let n = match filter {
            Some(f) => entries.iter().filter(|e| f.matches(&e.metadata)).count(),
            None => entries.len(),
        };
        Ok(n as u64)
    }
}
