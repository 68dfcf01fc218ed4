//! Vector Candidate Retrieval
//!
//! An in-memory USearch HNSW graph over passage embeddings, keyed by
//! passage id. It is not persisted: the store rebuilds it from the
//! embedding BLOBs on open and appends to it after every committed
//! document.
//!
//! Distances are cosine distances (`1 - cos`), so smaller means closer.

use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::{rank_positions, Candidate};
use crate::storage::{self, Storage};

/// HNSW graph parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HnswParams {
    /// Links per node (higher = better recall, more memory)
    pub connectivity: usize,
    /// Candidate list size while inserting
    pub expansion_add: usize,
    /// Candidate list size while searching
    pub expansion_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
        }
    }
}

/// Smallest capacity the index grows to
const MIN_CAPACITY: usize = 64;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Vector index error types
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum VectorSearchError {
    /// The index could not be created or grown
    Allocation(String),
    /// A vector could not be inserted
    Insert { passage_id: i64, reason: String },
    /// The nearest-neighbour query failed
    Query(String),
    /// A vector had the wrong width
    Dimensions { expected: usize, got: usize },
}

impl std::fmt::Display for VectorSearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorSearchError::Allocation(e) => write!(f, "Vector index allocation failed: {}", e),
            VectorSearchError::Insert { passage_id, reason } => {
                write!(f, "Cannot index passage {}: {}", passage_id, reason)
            }
            VectorSearchError::Query(e) => write!(f, "Vector query failed: {}", e),
            VectorSearchError::Dimensions { expected, got } => {
                write!(f, "Vector index holds {}-dimensional vectors, got {}", expected, got)
            }
        }
    }
}

impl std::error::Error for VectorSearchError {}

// ============================================================================
// VECTOR INDEX
// ============================================================================

/// HNSW index over passage embeddings
pub struct VectorIndex {
    index: Index,
    dimensions: usize,
}

impl VectorIndex {
    /// Empty index for `dimensions`-wide vectors with default parameters
    pub fn new(dimensions: usize) -> Result<Self, VectorSearchError> {
        Self::with_params(dimensions, HnswParams::default())
    }

    pub fn with_params(dimensions: usize, params: HnswParams) -> Result<Self, VectorSearchError> {
        let options = IndexOptions {
            dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: params.connectivity,
            expansion_add: params.expansion_add,
            expansion_search: params.expansion_search,
            multi: false,
        };

        let index = Index::new(&options).map_err(|e| VectorSearchError::Allocation(e.to_string()))?;
        Ok(Self { index, dimensions })
    }

    pub fn len(&self) -> usize {
        self.index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn contains(&self, passage_id: i64) -> bool {
        self.index.contains(passage_id as u64)
    }

    /// Make room for `additional` more vectors.
    ///
    /// usearch must have capacity before `add`, otherwise it writes out of
    /// bounds.
    pub fn reserve(&self, additional: usize) -> Result<(), VectorSearchError> {
        let needed = self.index.size() + additional;
        if needed <= self.index.capacity() {
            return Ok(());
        }
        let target = needed.max(self.index.capacity() * 2).max(MIN_CAPACITY);
        self.index
            .reserve(target)
            .map_err(|e| VectorSearchError::Allocation(e.to_string()))
    }

    /// Insert the vector of `passage_id`, replacing any previous one
    pub fn add(&mut self, passage_id: i64, vector: &[f32]) -> Result<(), VectorSearchError> {
        self.check_width(vector)?;
        let key = passage_id as u64;
        let insert_err = |e: &dyn std::fmt::Display| VectorSearchError::Insert {
            passage_id,
            reason: e.to_string(),
        };

        if self.index.contains(key) {
            self.index.remove(key).map_err(|e| insert_err(&e))?;
        }
        self.reserve(1)?;
        self.index.add(key, vector).map_err(|e| insert_err(&e))
    }

    /// The `limit` passages nearest to `query` as `(passage_id, distance)`,
    /// closest first. Equal distances are ordered by passage id.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(i64, f32)>, VectorSearchError> {
        self.check_width(query)?;
        if self.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let matches = self
            .index
            .search(query, limit)
            .map_err(|e| VectorSearchError::Query(e.to_string()))?;

        let mut hits: Vec<(i64, f32)> = matches
            .keys
            .into_iter()
            .map(|key| key as i64)
            .zip(matches.distances)
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        Ok(hits)
    }

    fn check_width(&self, vector: &[f32]) -> Result<(), VectorSearchError> {
        if vector.len() == self.dimensions {
            Ok(())
        } else {
            Err(VectorSearchError::Dimensions {
                expected: self.dimensions,
                got: vector.len(),
            })
        }
    }
}

// ============================================================================
// RETRIEVER
// ============================================================================

/// Rank the `limit` passages nearest to `query_vector`.
///
/// The vector must already be unit length. Candidates carry passage ids and
/// 1-based ranks in ascending distance order.
pub fn vector_candidates(
    store: &Storage,
    query_vector: &[f32],
    limit: usize,
) -> storage::Result<Vec<Candidate>> {
    let hits = store.vector_query(query_vector, limit)?;
    Ok(rank_positions(
        hits.into_iter().map(|(id, distance)| (id, f64::from(distance))),
    ))
}

// ============================================================================
// TESTS
// ============================================================================
