//! Directory scanner.
//!
//! Walks the synchronized root and produces one [`DirectoryEntry`] per file
//! whose extension is in the supported set. Everything else is skipped
//! silently; the unstructured loader is only reachable through direct
//! ingestion, never through a scan.

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::Path;
use walkdir::WalkDir;

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::fingerprint;
use crate::models::DirectoryEntry;

/// What to pick up during a scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Lowercase extensions without the dot.
    pub extensions: HashSet<String>,
    /// Relative-path globs to skip.
    pub exclude_globs: Vec<String>,
    pub follow_symlinks: bool,
}

impl ScanOptions {
    pub fn with_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }

    pub fn from_config(sync: &SyncConfig) -> Self {
        Self {
            exclude_globs: sync.exclude_globs.clone(),
            follow_symlinks: sync.follow_symlinks,
            ..Self::with_extensions(&sync.extensions)
        }
    }

    /// Whether a file with this extension (any case, no dot) is picked up.
    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.extensions.contains(&ext.to_ascii_lowercase())
    }
}

/// Scan `root` recursively. A missing root yields an empty list, not an error.
///
/// Entries are sorted by `source_id` for deterministic ordering.
pub fn scan_directory(root: &Path, options: &ScanOptions) -> Result<Vec<DirectoryEntry>> {
    if !root.exists() {
        tracing::warn!(root = %root.display(), "sync root does not exist, nothing to scan");
        return Ok(Vec::new());
    }
    tracing::info!(root = %root.display(), "scanning directory");

    let exclude_set = build_globset(&options.exclude_globs)?;
    let mut entries = Vec::new();

    let walker = WalkDir::new(root).follow_links(options.follow_symlinks);
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
            Error::io(path, source)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !options.accepts_extension(ext) {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        let source_id = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&source_id) {
            continue;
        }

        let item = file_to_entry(path, source_id, ext)?;
        tracing::debug!(source_id = %item.source_id, "file found");
        entries.push(item);
    }

    entries.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    tracing::info!(files = entries.len(), "scan completed");
    Ok(entries)
}

fn file_to_entry(path: &Path, source_id: String, ext: &str) -> Result<DirectoryEntry> {
    let metadata = std::fs::metadata(path).map_err(|e| Error::io(path, e))?;
    let modified = metadata
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
    let last_modified: DateTime<Utc> = modified.into();

    Ok(DirectoryEntry {
        source_id,
        file_path: path.to_string_lossy().to_string(),
        file_type: ext.to_ascii_lowercase(),
        last_modified,
        content_hash: fingerprint::hash_file(path)?,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let invalid = |e: globset::Error| Error::Config(format!("sync.exclude_globs: {}", e));
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).map_err(invalid)?);
    }
    builder.build().map_err(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_EXTENSIONS;
    use std::fs;
    use tempfile::TempDir;

    fn default_options() -> ScanOptions {
        ScanOptions::with_extensions(DEFAULT_EXTENSIONS)
    }

    #[test]
    fn picks_supported_extensions_recursively() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("reports/2024")).unwrap();
        fs::write(root.join("b.txt"), "bee").unwrap();
        fs::write(root.join("reports/2024/q1.CSV"), "a,b\n1,2").unwrap();
        fs::write(root.join("notes.md"), "# skipped").unwrap();
        fs::write(root.join("README"), "skipped").unwrap();

        let entries = scan_directory(root, &default_options()).unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.source_id.as_str()).collect();
        assert_eq!(ids, vec!["b.txt", "reports/2024/q1.CSV"]);
        assert_eq!(entries[1].file_type, "csv");
        assert_eq!(entries[0].content_hash.len(), 64);
    }

    #[test]
    fn missing_root_is_empty() {
        let entries =
            scan_directory(Path::new("/no/such/sync/root"), &default_options()).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn exclude_globs_apply_to_relative_path() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("archive")).unwrap();
        fs::write(root.join("keep.txt"), "k").unwrap();
        fs::write(root.join("archive/old.txt"), "o").unwrap();

        let mut options = default_options();
        options.exclude_globs = vec!["archive/**".to_string()];
        let entries = scan_directory(root, &options).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source_id, "keep.txt");
    }

    #[test]
    fn extension_set_is_normalized() {
        let options = ScanOptions::with_extensions([".PDF", "txt"]);
        assert!(options.extensions.contains("pdf"));
        assert!(options.extensions.contains("txt"));
    }

    #[test]
    fn file_path_points_at_the_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.txt"), "bee").unwrap();
        let entries = scan_directory(tmp.path(), &default_options()).unwrap();
        assert_eq!(fs::read_to_string(&entries[0].file_path).unwrap(), "bee");
    }
}
