//! Hybrid Search (Vector + Keyword + RRF)
//!
//! Fuses the vector ranking of passages with the BM25 ranking of documents
//! using Reciprocal Rank Fusion:
//!
//! ```text
//! score(p) = 1/(k + vector_rank(p)) + 1/(k + lexical_rank(doc(p)))
//! ```
//!
//! The lexical term is zero when the passage's document was not a lexical
//! candidate. Only passages retrieved by the vector index are scored, so the
//! lexical ranking boosts results but never surfaces a document on its own.
//! Results keep the best passage of each document.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use serde::Serialize;

use super::{lexical_candidates, vector_candidates, Candidate};
use crate::config::IndexConfig;
use crate::embeddings::Embedder;
use crate::storage::{self, PassageRecord, Storage, StorageError};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Snippet length in characters
pub const SNIPPET_CHARS: usize = 300;

/// Query embeddings kept in the LRU cache
const QUERY_CACHE_CAPACITY: usize = 100;

// ============================================================================
// FUSION ALGORITHMS
// ============================================================================

/// `1 / (k + rank)`
#[inline]
pub fn reciprocal_rank(k: u32, rank: usize) -> f64 {
    1.0 / (f64::from(k) + rank as f64)
}

/// RRF score of a passage from its vector rank and its document's lexical
/// rank. A missing lexical rank contributes nothing.
#[inline]
pub fn reciprocal_rank_fusion(vector_rank: usize, lexical_rank: Option<usize>, k: u32) -> f64 {
    reciprocal_rank(k, vector_rank) + lexical_rank.map_or(0.0, |rank| reciprocal_rank(k, rank))
}

/// Fused-hit snippet: newlines become spaces, then the first
/// [`SNIPPET_CHARS`] characters. Surrounding whitespace is kept.
pub fn make_snippet(text: &str) -> String {
    text.chars()
        .map(|c| if c == '\n' { ' ' } else { c })
        .take(SNIPPET_CHARS)
        .collect()
}

/// Semantic-hit preview: like [`make_snippet`] on the trimmed passage
pub fn make_preview(text: &str) -> String {
    make_snippet(text.trim())
}

/// Read access the fusion step needs
pub trait PassageLookup {
    /// Owning document, chunk index and text of a passage
    fn passage(&self, passage_id: i64) -> storage::Result<Option<PassageRecord>>;

    /// Path of a document
    fn document_path(&self, document_id: i64) -> storage::Result<Option<String>>;
}

impl PassageLookup for Storage {
    fn passage(&self, passage_id: i64) -> storage::Result<Option<PassageRecord>> {
        self.passage_lookup(passage_id)
    }

    fn document_path(&self, document_id: i64) -> storage::Result<Option<String>> {
        Ok(self.document_lookup(document_id)?.map(|doc| doc.path))
    }
}

/// One fused result: the best passage of a document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedHit {
    pub document_id: i64,
    pub passage_id: i64,
    pub path: String,
    pub chunk_index: usize,
    pub snippet: String,
    pub score: f64,
    pub vector_rank: usize,
    pub lexical_rank: Option<usize>,
}

impl FusedHit {
    /// `<path>#chunk<index>`
    pub fn reference(&self) -> String {
        format!("{}#chunk{}", self.path, self.chunk_index)
    }
}

/// One vector-only result with its raw cosine distance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticHit {
    pub passage_id: i64,
    pub document_id: i64,
    pub path: String,
    pub chunk_index: usize,
    pub snippet: String,
    pub distance: f64,
}

impl SemanticHit {
    /// `<path>#chunk<index>`
    pub fn reference(&self) -> String {
        format!("{}#chunk{}", self.path, self.chunk_index)
    }
}

struct Scored {
    passage: PassageRecord,
    score: f64,
    vector_rank: usize,
    lexical_rank: Option<usize>,
}

/// Fuse vector candidates (passage ids) with lexical candidates (document
/// ids) and keep the `top_k` best documents.
///
/// Within a document the passage with the better vector rank wins ties.
/// Documents with equal scores keep the order of their best vector rank.
/// Passages that can no longer be resolved are skipped.
pub fn fuse<L>(
    lookup: &L,
    lexical: &[Candidate],
    vector: &[Candidate],
    rrf_k: u32,
    top_k: usize,
) -> storage::Result<Vec<FusedHit>>
where
    L: PassageLookup + ?Sized,
{
    let lexical_ranks: HashMap<i64, usize> = lexical.iter().map(|c| (c.id, c.rank)).collect();

    let mut by_rank: Vec<&Candidate> = vector.iter().collect();
    by_rank.sort_by_key(|c| (c.rank, c.id));

    let mut best: HashMap<i64, Scored> = HashMap::new();
    let mut first_seen: Vec<i64> = Vec::new();

    for candidate in by_rank {
        let Some(passage) = lookup.passage(candidate.id)? else {
            tracing::debug!("Vector hit {} has no passage row, skipping", candidate.id);
            continue;
        };

        let lexical_rank = lexical_ranks.get(&passage.document_id).copied();
        let score = reciprocal_rank_fusion(candidate.rank, lexical_rank, rrf_k);
        let scored = Scored {
            passage,
            score,
            vector_rank: candidate.rank,
            lexical_rank,
        };

        match best.entry(scored.passage.document_id) {
            Entry::Vacant(slot) => {
                first_seen.push(scored.passage.document_id);
                slot.insert(scored);
            }
            Entry::Occupied(mut slot) => {
                if scored.score > slot.get().score {
                    slot.insert(scored);
                }
            }
        }
    }

    let mut winners: Vec<Scored> = first_seen
        .into_iter()
        .filter_map(|doc_id| best.remove(&doc_id))
        .collect();
    // Stable: equal scores keep first-seen order
    winners.sort_by(|a, b| b.score.total_cmp(&a.score));
    winners.truncate(top_k);

    let mut hits = Vec::with_capacity(winners.len());
    for winner in winners {
        let path = lookup
            .document_path(winner.passage.document_id)?
            .ok_or_else(|| {
                StorageError::NotFound(format!("document {}", winner.passage.document_id))
            })?;

        hits.push(FusedHit {
            document_id: winner.passage.document_id,
            passage_id: winner.passage.id,
            path,
            chunk_index: winner.passage.chunk_index,
            snippet: make_snippet(&winner.passage.text),
            score: winner.score,
            vector_rank: winner.vector_rank,
            lexical_rank: winner.lexical_rank,
        });
    }

    Ok(hits)
}

// ============================================================================
// HYBRID SEARCH CONFIGURATION
// ============================================================================

/// Configuration for hybrid search
#[derive(Debug, Clone)]
pub struct HybridSearchConfig {
    /// Candidates pulled from each retriever before fusion
    pub pool_size: usize,
    /// Results returned after fusion
    pub top_k: usize,
    /// RRF constant (higher = more uniform weighting)
    pub rrf_k: u32,
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        Self::from(&IndexConfig::default())
    }
}

impl From<&IndexConfig> for HybridSearchConfig {
    fn from(index: &IndexConfig) -> Self {
        Self {
            pool_size: index.pool_size,
            top_k: index.top_k,
            rrf_k: index.rrf_k,
        }
    }
}

// ============================================================================
// HYBRID SEARCHER
// ============================================================================

/// Query side of the pipeline: embeds queries, gathers both candidate
/// rankings and fuses them
pub struct HybridSearcher {
    store: Arc<Storage>,
    embedder: Arc<dyn Embedder>,
    config: HybridSearchConfig,
    /// LRU cache for query embeddings to avoid re-embedding repeated queries
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl HybridSearcher {
    /// Create a searcher over `store`
    pub fn new(store: Arc<Storage>, embedder: Arc<dyn Embedder>, config: HybridSearchConfig) -> Self {
        let capacity = NonZeroUsize::new(QUERY_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            embedder,
            config,
            query_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Get current configuration
    pub fn config(&self) -> &HybridSearchConfig {
        &self.config
    }

    /// Unit-length embedding of `query`, cached by exact text
    pub fn embed_query(&self, query: &str) -> storage::Result<Vec<f32>> {
        {
            let mut cache = self.query_cache.lock()
                .map_err(|_| StorageError::Init("Query cache lock poisoned".into()))?;
            if let Some(vector) = cache.get(query) {
                return Ok(vector.clone());
            }
        }

        let vector = self.embedder.embed_one(query, true)?;

        let mut cache = self.query_cache.lock()
            .map_err(|_| StorageError::Init("Query cache lock poisoned".into()))?;
        cache.put(query.to_string(), vector.clone());
        Ok(vector)
    }

    /// Hybrid search returning the configured `top_k`
    pub fn search(&self, query: &str) -> storage::Result<Vec<FusedHit>> {
        self.search_with_limit(query, self.config.top_k)
    }

    /// Hybrid search returning at most `top_k` documents
    pub fn search_with_limit(&self, query: &str, top_k: usize) -> storage::Result<Vec<FusedHit>> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(vec![]);
        }

        let query_vector = self.embed_query(query)?;
        let vector = vector_candidates(&self.store, &query_vector, self.config.pool_size)?;
        if vector.is_empty() {
            return Ok(vec![]);
        }
        let lexical = lexical_candidates(&self.store, query, self.config.pool_size)?;

        tracing::debug!(
            "Fusing {} vector and {} lexical candidates for {:?}",
            vector.len(),
            lexical.len(),
            query
        );

        fuse(self.store.as_ref(), &lexical, &vector, self.config.rrf_k, top_k)
    }

    /// Vector-only search: the `limit` nearest passages with their distance,
    /// without per-document deduplication
    pub fn semantic_search(&self, query: &str, limit: usize) -> storage::Result<Vec<SemanticHit>> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let query_vector = self.embed_query(query)?;
        let mut hits = Vec::new();
        for candidate in vector_candidates(&self.store, &query_vector, limit)? {
            let Some(passage) = self.store.passage_lookup(candidate.id)? else {
                continue;
            };
            let Some(document) = self.store.document_lookup(passage.document_id)? else {
                continue;
            };
            hits.push(SemanticHit {
                passage_id: passage.id,
                document_id: passage.document_id,
                path: document.path,
                chunk_index: passage.chunk_index,
                snippet: make_preview(&passage.text),
                distance: candidate.raw_score,
            });
        }
        Ok(hits)
    }
}

// ============================================================================
// TESTS
// ============================================================================
