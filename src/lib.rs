//! # ragsync
//!
//! Incremental document synchronization for retrieval-augmented question
//! answering over a local directory.
//!
//! ragsync keeps a vector index in step with a folder of documents. Each
//! sync scans the folder, fingerprints every supported file, diffs the result
//! against a SQLite catalog, and only re-ingests what changed. Deleted and
//! modified files have their chunks removed before anything new is indexed.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌──────────────┐
//! │ Scanner  │──▶│   Sync   │──▶│   Ingest   │──▶│ Vector index │
//! │ +SHA-256 │   │  Engine  │   │ load+split │   │ memory/sqlite│
//! └──────────┘   └────┬─────┘   └────────────┘   └──────┬───────┘
//!                     │                                 │
//!                     ▼                          ┌──────┴───────┐
//!                ┌──────────┐                    ▼              ▼
//!                │ Catalog  │               ┌────────┐    ┌──────────┐
//!                │ (SQLite) │               │  CLI   │    │   HTTP   │
//!                └──────────┘               └────────┘    └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragsync init                        # create catalog and index tables
//! ragsync sync ./data                 # ingest what changed
//! ragsync search "quarterly revenue"  # nearest chunks
//! ragsync ask "When does the warehouse open?"
//! ragsync serve                       # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`fingerprint`] | SHA-256 content hashing |
//! | [`scanner`] | Directory walk with extension and glob filters |
//! | [`catalog`] | SQLite record of what has been indexed |
//! | [`loaders`] | PDF, text, PPTX, XLSX, CSV, and fallback loaders |
//! | [`chunk`] | Recursive character splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector index backends |
//! | [`ingest`] | One file to indexed chunks |
//! | [`sync`] | Diff and apply |
//! | [`completion`] | Chat providers |
//! | [`answer`] | Grounded question answering |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI command runners |
//! | [`db`] | Database connection |

pub mod answer;
pub mod catalog;
pub mod chunk;
pub mod commands;
pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod http;
pub mod ingest;
pub mod loaders;
pub mod models;
pub mod scanner;
pub mod server;
pub mod store;
pub mod sync;

pub use error::{Error, Result};
