//! # Passage Probe Core
//!
//! Indexes a directory tree into overlapping text passages and answers
//! free-text queries with hybrid retrieval:
//!
//! - **Segmentation**: fixed-size character windows with overlap, or one
//!   passage per line for line-oriented formats (CSV and friends)
//! - **Semantic Embeddings**: Local fastembed v5 (all-MiniLM-L6-v2, 384 dimensions)
//! - **HNSW Vector Search**: USearch over passage embeddings
//! - **Lexical Search**: SQLite FTS5 BM25 over whole documents
//! - **Hybrid Search**: RRF fusion of both rankings, one passage per document
//! - **Incremental Indexing**: per-document atomic writes, dedup by path,
//!   optional background worker with progress events
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use passage_probe_core::{EmbeddingService, Session, Settings};
//!
//! let settings = Settings::load(&Settings::default_path())?;
//! let embedder = Arc::new(EmbeddingService::from_config(&settings.model)?);
//! let session = Session::open(settings, embedder)?;
//!
//! session.index()?;
//! for hit in session.search("how are embeddings cached")? {
//!     println!("{} (rrf={:.4})\n    {}", hit.reference(), hit.score, hit.snippet);
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `embeddings` (default): Enable local embedding generation with fastembed
//! - `bundled-sqlite` (default): Compile SQLite (with FTS5) from source

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod indexer;
pub mod scan;
pub mod search;
pub mod session;
pub mod storage;


// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use chunking::{chunk_text, split_lines, SegmentMode, Segmenter};

pub use config::{ConfigError, FilterConfig, IndexConfig, ModelConfig, PathsConfig, Settings};

pub use embeddings::{cosine_similarity, Embedder, Embedding, EmbeddingError};

#[cfg(feature = "embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "embeddings")))]
pub use embeddings::EmbeddingService;

pub use indexer::{IndexEvent, IndexReport, Indexer};

pub use scan::{FileScanner, SourceFile};

pub use search::{
    fuse, lexical_candidates, reciprocal_rank_fusion, sanitize_fts5_query, vector_candidates,
    Candidate, FusedHit, HybridSearchConfig, HybridSearcher, PassageLookup, SemanticHit,
    VectorIndex, VectorSearchError,
};

pub use session::{join_indexing, RebuildError, Session, SessionError};

pub use storage::{
    DocumentRecord, DocumentTxn, PassageRecord, Result, Storage, StorageError, StoreStats,
};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        Embedder, FusedHit, IndexEvent, IndexReport, Session, SessionError, Settings, Storage,
        StorageError,
    };

    #[cfg(feature = "embeddings")]
    pub use crate::EmbeddingService;
}
