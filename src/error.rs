//! Error kinds shared by the catalog, scanner, ingestion router, vector
//! index adapters, and model providers.
//!
//! Every failure propagates to the immediate caller; nothing in the core
//! retries or swallows an error. The CLI and HTTP layers render these as
//! a generic internal error with the message attached, except
//! [`Error::InvalidInput`], which the HTTP layer answers with a 400.

use std::path::{Path, PathBuf};

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A file or directory could not be read.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The catalog backing store is unavailable or a statement failed.
    #[error("catalog storage error: {0}")]
    Storage(#[source] sqlx::Error),

    /// The vector index is unavailable or an operation failed.
    #[error("vector index error: {0}")]
    Index(String),

    /// A document could not be parsed by its loader.
    #[error("failed to load {}: {message}", path.display())]
    Loader { path: PathBuf, message: String },

    /// The embedding or completion service failed.
    #[error("provider error: {0}")]
    Provider(String),

    /// A setting was rejected when the component using it was built.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A caller passed an argument that can never succeed, such as an empty question.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn loader(path: impl AsRef<Path>, message: impl std::fmt::Display) -> Self {
        Error::Loader {
            path: path.as_ref().to_path_buf(),
            message: message.to_string(),
        }
    }

    pub fn index(message: impl std::fmt::Display) -> Self {
        Error::Index(message.to_string())
    }

    pub fn provider(message: impl std::fmt::Display) -> Self {
        Error::Provider(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_the_path() {
        let err = Error::io(
            "data/missing.pdf",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let msg = err.to_string();
        assert!(msg.contains("data/missing.pdf"), "{}", msg);
        assert!(msg.contains("gone"), "{}", msg);
    }

    #[test]
    fn loader_error_carries_message() {
        let err = Error::loader("deck.pptx", "no slides");
        assert!(matches!(err, Error::Loader { .. }));
        assert_eq!(err.to_string(), "failed to load deck.pptx: no slides");
    }
}
