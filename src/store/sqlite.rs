//! SQLite-backed [`VectorIndex`].
//!
//! Chunks, their metadata, and their embedding (little-endian `f32` BLOB)
//! live in one `chunk_vectors` table, partitioned by collection name.
//! Similarity search loads the collection's vectors and ranks them in Rust.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use crate::error::{Error, Result};
use crate::models::{Chunk, ChunkMetadata, ScoredChunk};

use super::{MetadataFilter, VectorIndex};

pub struct SqliteIndex {
    pool: SqlitePool,
    collection: String,
    embedder: Arc<dyn Embedder>,
}

fn index_err(e: sqlx::Error) -> Error {
    Error::index(e)
}

/// Filter clause shared by delete and count. Unset fields bind NULL and
/// drop out of the predicate.
const FILTER_CLAUSE: &str = r#"
    collection = ?1
    AND (?2 IS NULL OR source = ?2)
    AND (?3 IS NULL OR source_id = ?3)
    AND (?4 IS NULL OR file_type = ?4)
    AND (?5 IS NULL OR page = ?5)
    AND (?6 IS NULL OR sheet_name = ?6)
"#;

impl SqliteIndex {
    /// Open (creating if needed) the index database and its table.
    pub async fn connect(
        path: &Path,
        collection: &str,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let pool = db::connect(path).await.map_err(index_err)?;
        let index = Self::new(pool, collection, embedder);
        index.initialize().await?;
        Ok(index)
    }

    pub fn new(pool: SqlitePool, collection: &str, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            pool,
            collection: collection.to_string(),
            embedder,
        }
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunk_vectors (
                id TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                content TEXT NOT NULL,
                source TEXT NOT NULL,
                source_id TEXT NOT NULL,
                file_type TEXT NOT NULL,
                page INTEGER,
                sheet_name TEXT,
                embedding BLOB NOT NULL,
                model TEXT NOT NULL,
                dims INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(index_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunk_vectors_source ON chunk_vectors(collection, source_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(index_err)?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
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

        let now = Utc::now().timestamp();
        let model = self.embedder.model_name().to_string();
        let mut ids = Vec::with_capacity(chunks.len());

        let mut tx = self.pool.begin().await.map_err(index_err)?;
        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            let id = Uuid::new_v4().to_string();
            sqlx::query(
                r#"
                INSERT INTO chunk_vectors
                    (id, collection, content, source, source_id, file_type, page, sheet_name,
                     embedding, model, dims, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&self.collection)
            .bind(&chunk.content)
            .bind(&chunk.metadata.source)
            .bind(&chunk.metadata.source_id)
            .bind(&chunk.metadata.file_type)
            .bind(chunk.metadata.page.map(|p| p as i64))
            .bind(&chunk.metadata.sheet_name)
            .bind(vec_to_blob(vector))
            .bind(&model)
            .bind(vector.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;
            ids.push(id);
        }
        tx.commit().await.map_err(index_err)?;

        tracing::debug!(count = ids.len(), collection = %self.collection, "chunks stored");
        Ok(ids)
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<u64> {
        filter.require_non_empty()?;
        let sql = format!("DELETE FROM chunk_vectors WHERE {}", FILTER_CLAUSE);
        let result = sqlx::query(&sql)
            .bind(&self.collection)
            .bind(&filter.source)
            .bind(&filter.source_id)
            .bind(&filter.file_type)
            .bind(filter.page.map(|p| p as i64))
            .bind(&filter.sheet_name)
            .execute(&self.pool)
            .await
            .map_err(index_err)?;
        Ok(result.rows_affected())
    }

    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query_vec = self.embedder.embed_query(query).await?;

        let rows = sqlx::query(
            r#"
            SELECT id, content, source, source_id, file_type, page, sheet_name, embedding
            FROM chunk_vectors
            WHERE collection = ?
            "#,
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await
        .map_err(index_err)?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let page: Option<i64> = row.get("page");
                ScoredChunk {
                    id: row.get("id"),
                    content: row.get("content"),
                    metadata: ChunkMetadata {
                        source: row.get("source"),
                        source_id: row.get("source_id"),
                        file_type: row.get("file_type"),
                        page: page.map(|p| p as u32),
                        sheet_name: row.get("sheet_name"),
                    },
                    score: cosine_similarity(&query_vec, &blob_to_vec(&blob)),
                }
            })
            .collect();

        // Sort by similarity desc and take top K
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self, filter: Option<&MetadataFilter>) -> Result<u64> {
        let empty = MetadataFilter::default();
        let filter = filter.unwrap_or(&empty);
        let sql = format!("SELECT COUNT(*) FROM chunk_vectors WHERE {}", FILTER_CLAUSE);
        let n: i64 = sqlx::query_scalar(&sql)
            .bind(&self.collection)
            .bind(&filter.source)
            .bind(&filter.source_id)
            .bind(&filter.file_type)
            .bind(filter.page.map(|p| p as i64))
            .bind(&filter.sheet_name)
            .fetch_one(&self.pool)
            .await
            .map_err(index_err)?;
        Ok(n as u64)
    }
}
