//! Passage vectors and the little-endian BLOB layout they are stored in

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum EmbeddingError {
    /// The model could not be resolved, downloaded or loaded
    ModelInit(String),
    /// The provider failed on a batch
    EmbeddingFailed(String),
    /// Input the provider cannot handle
    InvalidInput(String),
    /// A vector had the wrong width: (expected, got)
    InvalidDimensions(usize, usize),
}

impl std::fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingError::ModelInit(e) => write!(f, "Embedding model unavailable: {}", e),
            EmbeddingError::EmbeddingFailed(e) => write!(f, "Embedding provider failed: {}", e),
            EmbeddingError::InvalidInput(e) => write!(f, "Cannot embed input: {}", e),
            EmbeddingError::InvalidDimensions(expected, got) => {
                write!(f, "Expected {}-dimensional vector, got {}", expected, got)
            }
        }
    }
}

impl std::error::Error for EmbeddingError {}

// ============================================================================
// EMBEDDING TYPE
// ============================================================================

const F32_BYTES: usize = std::mem::size_of::<f32>();

/// One passage vector
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        Self(vector)
    }

    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }

    /// Scale to unit length. Zero vectors stay zero.
    pub fn normalize(&mut self) {
        l2_normalize(&mut self.0);
    }

    /// Unit length within a small tolerance
    pub fn is_normalized(&self) -> bool {
        (norm(&self.0) - 1.0).abs() < 1e-3
    }

    /// BLOB form: each component as 4 little-endian bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * F32_BYTES);
        for x in &self.0 {
            out.extend_from_slice(&x.to_le_bytes());
        }
        out
    }

    /// Decode a BLOB written by [`Embedding::to_bytes`], checking its width
    pub fn from_bytes(bytes: &[u8], dimensions: usize) -> Result<Self, EmbeddingError> {
        if bytes.len() != dimensions * F32_BYTES {
            return Err(EmbeddingError::InvalidDimensions(
                dimensions,
                bytes.len() / F32_BYTES,
            ));
        }

        let vector = bytes
            .chunks_exact(F32_BYTES)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok(Self(vector))
    }
}

// ============================================================================
// SIMILARITY FUNCTIONS
// ============================================================================

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `vector` to unit length in place. Zero vectors are left untouched.
#[inline]
pub fn l2_normalize(vector: &mut [f32]) {
    let n = norm(vector);
    if n > 0.0 {
        vector.iter_mut().for_each(|x| *x /= n);
    }
}

/// Cosine similarity; 0 for mismatched lengths or zero vectors
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let (dot, aa, bb) = a
        .iter()
        .zip(b)
        .fold((0.0_f32, 0.0_f32, 0.0_f32), |(dot, aa, bb), (x, y)| {
            (dot + x * y, aa + x * x, bb + y * y)
        });

    let denominator = (aa * bb).sqrt();
    if denominator > 0.0 {
        dot / denominator
    } else {
        0.0
    }
}

// ============================================================================
// TESTS
// ============================================================================
