//! Content fingerprinting.
//!
//! A file's identity for change detection is the SHA-256 of its bytes, so a
//! touch without an edit is not a change and an edit that preserves size and
//! mtime still is.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

/// Read block size. Files are never loaded whole.
const BLOCK_SIZE: usize = 4096;

/// SHA-256 hex digest of the file at `path`, streamed in fixed-size blocks.
pub fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    hash_reader(file).map_err(|e| Error::io(path, e))
}

/// SHA-256 hex digest of everything `reader` yields.
pub fn hash_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; BLOCK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
