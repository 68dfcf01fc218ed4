//! SQLite Storage Implementation
//!
//! Owns the persisted state: documents, their passages, one embedding per
//! passage and the FTS5 index over document text. Embeddings are also held
//! in an in-memory HNSW index that is rebuilt from SQLite on open.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction};
use serde::Serialize;

use crate::embeddings::{Embedding, EmbeddingError};
use crate::search::{VectorIndex, VectorSearchError};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// A document with this path is already indexed
    #[error("Document already indexed: {0}")]
    DuplicateDocument(String),
    /// Configured embedding dimension differs from the one the store was built with
    #[error("Embedding dimension mismatch: configured {configured}, store was built with {stored}")]
    DimensionMismatch { configured: usize, stored: usize },
    /// In-memory vector index failure
    #[error("Vector index error: {0}")]
    VectorIndex(#[from] VectorSearchError),
    /// Embedding provider failure
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

// ============================================================================
// RECORDS
// ============================================================================

/// An indexed source file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub path: String,
    pub indexed_at: DateTime<Utc>,
}

/// One stored passage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassageRecord {
    pub id: i64,
    pub document_id: i64,
    pub chunk_index: usize,
    pub text: String,
}

/// Row counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub documents: usize,
    pub passages: usize,
    pub embeddings: usize,
}

const META_EMBED_DIM: &str = "embed_dim";
const META_MODEL: &str = "model";

// ============================================================================
// STORAGE
// ============================================================================

/// Persistent passage store
///
/// Uses separate reader/writer connections in WAL mode, so a background
/// indexer can write while queries read. All methods take `&self`, making
/// `Storage` `Send + Sync` and shareable as `Arc<Storage>`.
pub struct Storage {
    path: PathBuf,
    dimensions: usize,
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    vector_index: Mutex<VectorIndex>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.path)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl Storage {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA mmap_size = 268435456;
             PRAGMA journal_size_limit = 67108864;",
        )?;

        Ok(())
    }

    /// Open or create the store at `path`.
    ///
    /// Creates the schema if absent. Fails with
    /// [`StorageError::DimensionMismatch`] if the store was built for a
    /// different embedding dimension.
    pub fn open(path: &Path, dimensions: usize, model_name: &str) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let writer_conn = Connection::open(path)?;
        Self::configure_connection(&writer_conn)?;

        // Apply migrations on writer only
        super::migrations::apply_migrations(&writer_conn)?;
        Self::check_meta(&writer_conn, dimensions, model_name)?;

        let reader_conn = Connection::open(path)?;
        Self::configure_connection(&reader_conn)?;

        let vector_index = VectorIndex::new(dimensions)?;

        let storage = Self {
            path: path.to_path_buf(),
            dimensions,
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            vector_index: Mutex::new(vector_index),
        };

        storage.load_embeddings_into_index()?;

        Ok(storage)
    }

    /// Record the embedding dimension on first open, verify it afterwards
    fn check_meta(conn: &Connection, dimensions: usize, model_name: &str) -> Result<()> {
        let stored_dim: Option<String> = conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = ?1",
                params![META_EMBED_DIM],
                |row| row.get(0),
            )
            .optional()?;

        match stored_dim {
            Some(raw) => {
                let stored: usize = raw.parse().map_err(|_| {
                    StorageError::Init(format!("Corrupt store metadata: embed_dim = {:?}", raw))
                })?;
                if stored != dimensions {
                    return Err(StorageError::DimensionMismatch {
                        configured: dimensions,
                        stored,
                    });
                }

                let stored_model: Option<String> = conn
                    .query_row(
                        "SELECT value FROM store_meta WHERE key = ?1",
                        params![META_MODEL],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(stored_model) = stored_model.filter(|m| m != model_name) {
                    tracing::warn!(
                        "Store was built with model {} but {} is configured; rankings may be inconsistent until reindexed",
                        stored_model,
                        model_name
                    );
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO store_meta (key, value) VALUES (?1, ?2), (?3, ?4)",
                    params![META_EMBED_DIM, dimensions.to_string(), META_MODEL, model_name],
                )?;
            }
        }

        Ok(())
    }

    /// Load existing embeddings into vector index
    fn load_embeddings_into_index(&self) -> Result<()> {
        let reader = self.reader.lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;

        let mut stmt = reader.prepare("SELECT passage_id, embedding FROM passage_embeddings")?;
        let embeddings: Vec<(i64, Vec<u8>)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;

        drop(stmt);
        drop(reader);

        let mut index = self
            .vector_index
            .lock()
            .map_err(|_| StorageError::Init("Vector index lock poisoned".to_string()))?;
        index.reserve(embeddings.len())?;

        for (passage_id, embedding_bytes) in embeddings {
            match Embedding::from_bytes(&embedding_bytes, self.dimensions) {
                Ok(embedding) => {
                    if let Err(e) = index.add(passage_id, embedding.as_slice()) {
                        tracing::warn!("Failed to load embedding for passage {}: {}", passage_id, e);
                    }
                }
                Err(e) => tracing::warn!("Skipping embedding of passage {}: {}", passage_id, e),
            }
        }

        tracing::debug!("Loaded {} vectors into the index", index.len());
        Ok(())
    }

    /// Delete the store files at `path` (database, WAL and shared-memory)
    pub fn destroy(path: &Path) -> Result<()> {
        let mut targets = vec![path.to_path_buf()];
        for suffix in ["-wal", "-shm"] {
            let mut name = path.as_os_str().to_owned();
            name.push(suffix);
            targets.push(PathBuf::from(name));
        }

        for target in targets {
            match std::fs::remove_file(&target) {
                Ok(()) => tracing::debug!("Removed {}", target.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Database file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Embedding dimension this store was opened with
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Run `f` as one atomic unit of work.
    ///
    /// Everything written through the [`DocumentTxn`] commits together or not
    /// at all; an `Err` from `f` rolls the transaction back. Vectors become
    /// searchable once the commit succeeds.
    pub fn write_document<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut DocumentTxn<'_>) -> Result<T>,
    {
        let mut writer = self.writer.lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))?;
        let tx = writer.transaction()?;

        let mut unit = DocumentTxn {
            tx: &tx,
            dimensions: self.dimensions,
            staged: Vec::new(),
        };
        let output = f(&mut unit)?;
        let DocumentTxn { staged, .. } = unit;

        tx.commit()?;
        drop(writer);

        let mut index = self
            .vector_index
            .lock()
            .map_err(|_| StorageError::Init("Vector index lock poisoned".to_string()))?;
        for (passage_id, vector) in staged {
            // Already committed; the vector is picked up again on next open
            if let Err(e) = index.add(passage_id, &vector) {
                tracing::warn!("Failed to index vector for passage {}: {}", passage_id, e);
            }
        }

        Ok(output)
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Paths of every indexed document
    pub fn existing_document_paths(&self) -> Result<HashSet<String>> {
        let reader = self.reader.lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;
        let mut stmt = reader.prepare("SELECT path FROM documents")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<HashSet<String>>>()?;
        Ok(paths)
    }

    /// Nearest passages to `query_vector` as `(passage_id, distance)`,
    /// ascending by distance
    pub fn vector_query(&self, query_vector: &[f32], limit: usize) -> Result<Vec<(i64, f32)>> {
        let index = self
            .vector_index
            .lock()
            .map_err(|_| StorageError::Init("Vector index lock poisoned".to_string()))?;
        Ok(index.search(query_vector, limit)?)
    }

    /// BM25 full-text query over document text as `(document_id, score)`,
    /// ascending by score (best first). `match_expr` must already be a
    /// valid FTS5 expression; an empty one matches nothing.
    pub fn lexical_query(&self, match_expr: &str, limit: usize) -> Result<Vec<(i64, f64)>> {
        if match_expr.trim().is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let reader = self.reader.lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;
        let mut stmt = reader.prepare(
            "SELECT rowid, bm25(documents_fts) AS score
             FROM documents_fts
             WHERE documents_fts MATCH ?1
             ORDER BY score, rowid
             LIMIT ?2",
        )?;

        let hits = stmt
            .query_map(params![match_expr, limit as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(hits)
    }

    /// Look up one passage
    pub fn passage_lookup(&self, passage_id: i64) -> Result<Option<PassageRecord>> {
        let reader = self.reader.lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;
        let passage = reader
            .query_row(
                "SELECT id, document_id, chunk_index, passage FROM passages WHERE id = ?1",
                params![passage_id],
                Self::row_to_passage,
            )
            .optional()?;
        Ok(passage)
    }

    /// Look up one document (without its text)
    pub fn document_lookup(&self, document_id: i64) -> Result<Option<DocumentRecord>> {
        let reader = self.reader.lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;
        let document = reader
            .query_row(
                "SELECT id, path, indexed_at FROM documents WHERE id = ?1",
                params![document_id],
                Self::row_to_document,
            )
            .optional()?;
        Ok(document)
    }

    /// Look up a document by path
    pub fn find_document(&self, path: &str) -> Result<Option<DocumentRecord>> {
        let reader = self.reader.lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;
        let document = reader
            .query_row(
                "SELECT id, path, indexed_at FROM documents WHERE path = ?1",
                params![path],
                Self::row_to_document,
            )
            .optional()?;
        Ok(document)
    }

    /// All passages of a document in chunk order
    pub fn document_passages(&self, document_id: i64) -> Result<Vec<PassageRecord>> {
        let reader = self.reader.lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;
        let mut stmt = reader.prepare(
            "SELECT id, document_id, chunk_index, passage FROM passages
             WHERE document_id = ?1
             ORDER BY chunk_index",
        )?;
        let passages = stmt
            .query_map(params![document_id], Self::row_to_passage)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(passages)
    }

    /// Row counts of the three entity tables
    pub fn stats(&self) -> Result<StoreStats> {
        let reader = self.reader.lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;

        let count = |sql: &str| -> Result<usize> {
            let n: i64 = reader.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(StoreStats {
            documents: count("SELECT COUNT(*) FROM documents")?,
            passages: count("SELECT COUNT(*) FROM passages")?,
            embeddings: count("SELECT COUNT(*) FROM passage_embeddings")?,
        })
    }

    fn row_to_passage(row: &rusqlite::Row<'_>) -> rusqlite::Result<PassageRecord> {
        Ok(PassageRecord {
            id: row.get("id")?,
            document_id: row.get("document_id")?,
            chunk_index: row.get::<_, i64>("chunk_index")? as usize,
            text: row.get("passage")?,
        })
    }

    fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRecord> {
        let indexed_at: String = row.get("indexed_at")?;
        let indexed_at = DateTime::parse_from_rfc3339(&indexed_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
            })?;

        Ok(DocumentRecord {
            id: row.get("id")?,
            path: row.get("path")?,
            indexed_at,
        })
    }
}

// ============================================================================
// DOCUMENT TRANSACTION
// ============================================================================

/// Write handle for one atomic unit of work, see [`Storage::write_document`]
pub struct DocumentTxn<'a> {
    tx: &'a Transaction<'a>,
    dimensions: usize,
    staged: Vec<(i64, Vec<f32>)>,
}

impl DocumentTxn<'_> {
    /// Insert a document row; the FTS index is updated by trigger in the
    /// same transaction. Fails with [`StorageError::DuplicateDocument`] if
    /// the path is already present.
    pub fn insert_document(&mut self, path: &str, full_text: &str) -> Result<i64> {
        let result = self.tx.execute(
            "INSERT INTO documents (path, full_text, indexed_at) VALUES (?1, ?2, ?3)",
            params![path, full_text, Utc::now().to_rfc3339()],
        );

        match result {
            Ok(_) => Ok(self.tx.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StorageError::DuplicateDocument(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Insert a passage. Returns `None` without writing if
    /// `(document_id, chunk_index)` already exists.
    pub fn insert_passage(
        &mut self,
        document_id: i64,
        chunk_index: usize,
        text: &str,
    ) -> Result<Option<i64>> {
        let changed = self.tx.execute(
            "INSERT OR IGNORE INTO passages (document_id, chunk_index, passage) VALUES (?1, ?2, ?3)",
            params![document_id, chunk_index as i64, text],
        )?;

        Ok((changed > 0).then(|| self.tx.last_insert_rowid()))
    }

    /// Store the (unit-length) embedding of a passage
    pub fn insert_embedding(&mut self, passage_id: i64, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(StorageError::DimensionMismatch {
                configured: self.dimensions,
                stored: vector.len(),
            });
        }

        let embedding = Embedding::new(vector.to_vec());
        self.tx.execute(
            "INSERT OR REPLACE INTO passage_embeddings (passage_id, embedding, dimensions)
             VALUES (?1, ?2, ?3)",
            params![passage_id, embedding.to_bytes(), embedding.dimensions() as i64],
        )?;

        self.staged.push((passage_id, embedding.into_vec()));
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
