//! Storage Module
//!
//! SQLite-based storage layer with:
//! - Documents and their ordered passages
//! - FTS5 full-text index over document text (porter stemming)
//! - Embedded vector storage mirrored into an HNSW index
//! - Atomic per-document writes

mod migrations;
mod sqlite;

pub use migrations::MIGRATIONS;
pub use sqlite::{
    DocumentRecord, DocumentTxn, PassageRecord, Result, Storage, StorageError, StoreStats,
};
