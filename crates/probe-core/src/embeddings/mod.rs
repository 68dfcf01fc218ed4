//! Semantic Embeddings Module
//!
//! The indexer and the vector retriever only see the [`Embedder`] trait:
//! `embed(texts, normalize) -> vectors`. The default implementation,
//! [`EmbeddingService`], runs a fastembed (ONNX) model locally.
//!
//! Supports:
//! - Batch embedding with optional L2 normalization
//! - Little-endian f32 BLOB encoding for storage
//! - Cosine similarity helpers

mod types;

#[cfg(feature = "embeddings")]
mod local;

pub use types::{cosine_similarity, l2_normalize, Embedding, EmbeddingError};

#[cfg(feature = "embeddings")]
pub use local::{resolve_model, EmbeddingService, BATCH_SIZE};

/// Capability to turn text into fixed-length vectors.
///
/// Implementations must be deterministic: the same text and model always
/// produce the same vector, otherwise stored rankings drift.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts. With `normalize`, every vector is scaled to
    /// unit length.
    fn embed(&self, texts: &[&str], normalize: bool) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Output dimension of every vector
    fn dimensions(&self) -> usize;

    /// Model identifier, recorded in the store
    fn model_name(&self) -> &str;

    /// Load whatever the provider needs before the first call.
    ///
    /// [`Session::open`](crate::Session::open) calls this so an unusable
    /// model fails at startup rather than on every document.
    fn warm_up(&self) -> Result<(), EmbeddingError> {
        Ok(())
    }

    /// Embed a single text
    fn embed_one(&self, text: &str, normalize: bool) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(&[text], normalize)?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding generated".to_string()))
    }
}
