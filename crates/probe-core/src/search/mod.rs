//! Search Module
//!
//! Provides the retrieval half of the pipeline:
//! - Vector candidates using HNSW (USearch)
//! - Lexical candidates using BM25/FTS5
//! - Reciprocal Rank Fusion, collapsed to one passage per document

mod hybrid;
mod keyword;
mod vector;

pub use vector::{vector_candidates, HnswParams, VectorIndex, VectorSearchError};

pub use keyword::{lexical_candidates, sanitize_fts5_query};

pub use hybrid::{
    fuse, make_preview, make_snippet, reciprocal_rank, reciprocal_rank_fusion, FusedHit, HybridSearchConfig,
    HybridSearcher, PassageLookup, SemanticHit, SNIPPET_CHARS,
};

/// One item of a single retriever's ranking
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Passage id (vector retriever) or document id (lexical retriever)
    pub id: i64,
    /// 1-based position, contiguous within one ranking
    pub rank: usize,
    /// Raw engine score (distance or BM25), informational only
    pub raw_score: f64,
}

/// Assign ranks `1..=N` to hits that are already ordered best first
pub fn rank_positions<I>(hits: I) -> Vec<Candidate>
where
    I: IntoIterator<Item = (i64, f64)>,
{
    hits.into_iter()
        .enumerate()
        .map(|(i, (id, raw_score))| Candidate {
            id,
            rank: i + 1,
            raw_score,
        })
        .collect()
}
