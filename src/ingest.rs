//! Ingestion router: one file in, chunks in the vector index out.
//!
//! Picks the loader from the file extension ([`FileType`]), stamps every
//! segment with its provenance, splits with the shared [`TextSplitter`], and
//! submits the whole file to the index in a single `add` call.
//!
//! The router knows nothing about the catalog. The sync engine calls it for
//! additions and modifications; the `ingest` CLI command calls it directly.

use std::path::Path;
use std::sync::Arc;

use crate::chunk::TextSplitter;
use crate::error::Result;
use crate::loaders;
use crate::models::{Chunk, ChunkMetadata, FileType};
use crate::store::VectorIndex;

#[derive(Clone)]
pub struct IngestRouter {
    index: Arc<dyn VectorIndex>,
    splitter: TextSplitter,
}

impl IngestRouter {
    pub fn new(index: Arc<dyn VectorIndex>, splitter: TextSplitter) -> Self {
        Self { index, splitter }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Load, stamp, and split `path` without touching the index.
    ///
    /// `source_id` defaults to the file path as given.
    pub fn prepare(&self, path: &Path, source_id: Option<&str>) -> Result<Vec<Chunk>> {
        let file_type = FileType::from_path(path);
        let source = path.to_string_lossy().to_string();
        let source_id = source_id.map(str::to_string).unwrap_or_else(|| source.clone());

        let segments = loaders::load(file_type, path)?;

        let mut chunks = Vec::new();
        for segment in segments {
            for content in self.splitter.split(&segment.content) {
                chunks.push(Chunk {
                    content,
                    metadata: ChunkMetadata {
                        source: source.clone(),
                        source_id: source_id.clone(),
                        file_type: file_type.as_str().to_string(),
                        page: segment.page,
                        sheet_name: segment.sheet_name.clone(),
                    },
                });
            }
        }
        Ok(chunks)
    }

    /// Ingest one file. Returns the number of chunks indexed.
    ///
    /// Loader and index errors propagate; chunks already accepted by the
    /// index are not rolled back.
    pub async fn ingest(&self, path: &Path, source_id: Option<&str>) -> Result<usize> {
        let chunks = self.prepare(path, source_id)?;
        if chunks.is_empty() {
            tracing::info!(path = %path.display(), "no text extracted, nothing to index");
            return Ok(0);
        }

        tracing::info!(path = %path.display(), chunks = chunks.len(), "indexing chunks");
        let ids = self.index.add(&chunks).await?;
        tracing::info!(path = %path.display(), indexed = ids.len(), "chunks indexed");
        Ok(ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::error::Error;
    use crate::store::{InMemoryIndex, MetadataFilter};
    use std::fs;
    use tempfile::TempDir;

    fn router() -> (IngestRouter, Arc<InMemoryIndex>) {
        let index = Arc::new(InMemoryIndex::new(Arc::new(HashingEmbedder::default())));
        let router = IngestRouter::new(index.clone(), TextSplitter::new(500, 50).unwrap());
        (router, index)
    }

    #[tokio::test]
    async fn txt_chunks_carry_provenance() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.txt");
        fs::write(&path, "The warehouse opens at nine.").unwrap();

        let (router, index) = router();
        let n = router.ingest(&path, Some("notes.txt")).await.unwrap();
        assert_eq!(n, 1);

        let meta = index.metadata().unwrap();
        assert_eq!(meta[0].source_id, "notes.txt");
        assert_eq!(meta[0].source, path.to_string_lossy());
        assert_eq!(meta[0].file_type, "txt");
        assert_eq!(meta[0].page, None);
    }

    #[tokio::test]
    async fn source_id_defaults_to_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.csv");
        fs::write(&path, "city,pop\nLyon,500000\nNice,340000\n").unwrap();

        let (router, index) = router();
        assert_eq!(router.ingest(&path, None).await.unwrap(), 2);
        let filter = MetadataFilter::source_id(path.to_string_lossy().to_string());
        assert_eq!(index.count(Some(&filter)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_file_indexes_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.txt");
        fs::write(&path, "").unwrap();

        let (router, index) = router();
        assert_eq!(router.ingest(&path, Some("empty.txt")).await.unwrap(), 0);
        assert_eq!(index.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_extension_uses_unstructured_loader() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("readme.md");
        fs::write(&path, "# Title\n\nSome markdown body.").unwrap();

        let (router, index) = router();
        assert_eq!(router.ingest(&path, Some("readme.md")).await.unwrap(), 1);
        assert_eq!(index.metadata().unwrap()[0].file_type, "unstructured");
    }

    #[tokio::test]
    async fn unreadable_binary_is_loader_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blob.bin");
        fs::write(&path, [0xffu8, 0xfe, 0x00, 0x9f]).unwrap();

        let (router, index) = router();
        let err = router.ingest(&path, None).await.unwrap_err();
        assert!(matches!(err, Error::Loader { .. }));
        assert_eq!(index.count(None).await.unwrap(), 0);
    }

    #[test]
    fn long_text_is_split_with_shared_policy() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("long.txt");
        let body = (0..100)
            .map(|i| format!("Line {} of a long document.", i))
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(&path, body).unwrap();

        let (router, _) = router();
        let chunks = router.prepare(&path, Some("long.txt")).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 500));
    }
}
