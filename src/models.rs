//! Core data types that flow through scanning, cataloguing, ingestion, and
//! retrieval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Loader selection for a file, keyed by its lowercase extension.
///
/// This is the single dispatch table consulted by both the sync path and
/// direct single-file ingestion. Anything unrecognized is `Unstructured`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Txt,
    Pptx,
    Xlsx,
    Csv,
    Unstructured,
}

impl FileType {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => FileType::Pdf,
            "txt" => FileType::Txt,
            "pptx" => FileType::Pptx,
            "xlsx" => FileType::Xlsx,
            "csv" => FileType::Csv,
            _ => FileType::Unstructured,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(FileType::from_extension)
            .unwrap_or(FileType::Unstructured)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Txt => "txt",
            FileType::Pptx => "pptx",
            FileType::Xlsx => "xlsx",
            FileType::Csv => "csv",
            FileType::Unstructured => "unstructured",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ingestion state of a catalog row.
///
/// A row is written `Pending` before its file is handed to the ingestion
/// router and flipped to `Committed` once every chunk is in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Committed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Committed => "committed",
        }
    }

    /// Parse from the stored column value. Unknown values read as committed
    /// so that rows written by older versions are trusted.
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => RecordStatus::Pending,
            _ => RecordStatus::Committed,
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state of one file, produced fresh by every directory scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Path relative to the synchronized root, `/`-separated.
    pub source_id: String,
    pub file_path: String,
    pub file_type: String,
    pub last_modified: DateTime<Utc>,
    pub content_hash: String,
}

/// A persisted catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRecord {
    pub source_id: String,
    pub file_path: String,
    pub file_type: String,
    pub last_modified: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
    pub content_hash: String,
    pub status: RecordStatus,
}

/// Identity and hash of a catalogued file; enough to diff against a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedRecord {
    pub source_id: String,
    pub file_path: String,
    pub content_hash: String,
    pub status: RecordStatus,
}

/// A loader's output for one page, slide paragraph, row, or whole file,
/// before splitting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawSegment {
    pub content: String,
    pub page: Option<u32>,
    pub sheet_name: Option<String>,
}

impl RawSegment {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Provenance carried by every chunk in the vector index. These are the only
/// fields ever used as filter predicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub source_id: String,
    pub file_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
}

/// A bounded text segment ready for embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// A chunk returned from similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    /// Identifier assigned by the index at insertion.
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity to the query, higher is closer.
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_dispatch_is_case_insensitive() {
        assert_eq!(FileType::from_path(Path::new("a/Report.PDF")), FileType::Pdf);
        assert_eq!(FileType::from_path(Path::new("sheet.xlsx")), FileType::Xlsx);
        assert_eq!(FileType::from_path(Path::new("notes.md")), FileType::Unstructured);
        assert_eq!(FileType::from_path(Path::new("Makefile")), FileType::Unstructured);
    }

    #[test]
    fn unknown_status_reads_as_committed() {
        assert_eq!(RecordStatus::parse("pending"), RecordStatus::Pending);
        assert_eq!(RecordStatus::parse("committed"), RecordStatus::Committed);
        assert_eq!(RecordStatus::parse(""), RecordStatus::Committed);
    }

    #[test]
    fn optional_metadata_omitted_from_json() {
        let meta = ChunkMetadata {
            source: "data/b.txt".to_string(),
            source_id: "b.txt".to_string(),
            file_type: "txt".to_string(),
            page: None,
            sheet_name: None,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("page").is_none());
        assert_eq!(json["source_id"], "b.txt");
    }
}
