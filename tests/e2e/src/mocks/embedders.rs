//! Deterministic embedders
//!
//! Real models are too slow and too large for journey tests. These produce
//! stable vectors so rankings can be asserted exactly.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use passage_probe_core::embeddings::l2_normalize;
use passage_probe_core::{Embedder, EmbeddingError};

/// Feature-hashed bag of words.
///
/// Texts that share words get nearby vectors, which is enough to make
/// vector rankings meaningful without a model. Counts `embed` calls so
/// tests can observe the query cache.
pub struct HashEmbedder {
    dimensions: usize,
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `embed` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0_f32; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let slot = fnv1a(&word.to_lowercase()) as usize % self.dimensions;
            v[slot] += 1.0;
        }
        if v.iter().all(|x| *x == 0.0) {
            v[0] = 1.0;
        }
        v
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf29ce484222325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x100000001b3)
    })
}

impl Embedder for HashEmbedder {
    fn embed(&self, texts: &[&str], normalize: bool) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = self.vector(t);
                if normalize {
                    l2_normalize(&mut v);
                }
                v
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "e2e/hash"
    }
}

/// Fails any batch containing `marker` until [`FailingEmbedder::recover`] is called.
///
/// An empty marker matches every text.
pub struct FailingEmbedder {
    inner: HashEmbedder,
    marker: String,
    broken: AtomicBool,
    unloadable: bool,
}

impl FailingEmbedder {
    pub fn new(dimensions: usize, marker: impl Into<String>) -> Self {
        Self {
            inner: HashEmbedder::new(dimensions),
            marker: marker.into(),
            broken: AtomicBool::new(true),
            unloadable: false,
        }
    }

    /// A provider whose model never loads, so `warm_up` fails too
    pub fn unloadable(dimensions: usize) -> Self {
        Self {
            unloadable: true,
            ..Self::new(dimensions, "")
        }
    }

    pub fn recover(&self) {
        self.broken.store(false, Ordering::SeqCst);
    }
}

impl Embedder for FailingEmbedder {
    fn embed(&self, texts: &[&str], normalize: bool) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if self.broken.load(Ordering::SeqCst) && texts.iter().any(|t| t.contains(&self.marker)) {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "provider unavailable for text containing {:?}",
                self.marker
            )));
        }
        self.inner.embed(texts, normalize)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn warm_up(&self) -> Result<(), EmbeddingError> {
        if self.unloadable && self.broken.load(Ordering::SeqCst) {
            return Err(EmbeddingError::ModelInit("model files are missing".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(16);
        let a = embedder.embed_one("same words", true).unwrap();
        let b = embedder.embed_one("same words", true).unwrap();
        assert_eq!(a, b);
        assert_eq!(embedder.calls(), 2);
    }

    #[test]
    fn test_failing_embedder_recovers() {
        let embedder = FailingEmbedder::new(16, "POISON");
        assert!(embedder.embed(&["fine", "has POISON"], true).is_err());
        assert!(embedder.embed(&["fine"], true).is_ok());

        embedder.recover();
        assert!(embedder.embed(&["has POISON"], true).is_ok());
    }

    #[test]
    fn test_unloadable_embedder_fails_everything() {
        let embedder = FailingEmbedder::unloadable(16);
        assert!(matches!(embedder.warm_up(), Err(EmbeddingError::ModelInit(_))));
        assert!(embedder.embed(&["anything"], true).is_err());
        assert!(HashEmbedder::new(16).warm_up().is_ok());
    }
}
