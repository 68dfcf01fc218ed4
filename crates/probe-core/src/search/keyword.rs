//! Lexical Candidate Retrieval
//!
//! Turns free text into a recall-biased FTS5 query (every term OR'ed
//! together) and ranks documents by the store's BM25 score.

use super::{rank_positions, Candidate};
use crate::storage::{self, Storage};

/// Sanitize free text into an FTS5 `MATCH` expression.
///
/// Every run of non-word characters becomes a separator. Each remaining term
/// is double-quoted, so FTS5 operators (`AND`, `NEAR`, `*`, column filters)
/// are matched as plain words, and the terms are joined with `OR`. Returns an
/// empty string when nothing searchable is left.
pub fn sanitize_fts5_query(query: &str) -> String {
    query
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{}\"", term))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Rank up to `limit` documents matching any term of `raw_query`.
///
/// Candidates carry document ids and 1-based ranks, best first. A query with
/// no searchable terms yields no candidates.
pub fn lexical_candidates(
    store: &Storage,
    raw_query: &str,
    limit: usize,
) -> storage::Result<Vec<Candidate>> {
    let match_expr = sanitize_fts5_query(raw_query);
    if match_expr.is_empty() {
        return Ok(vec![]);
    }

    let hits = store.lexical_query(&match_expr, limit)?;
    Ok(rank_positions(hits))
}

// ============================================================================
// TESTS
// ============================================================================
