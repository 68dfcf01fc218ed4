//! Local Semantic Embeddings
//!
//! Runs a fastembed v5 ONNX model in-process. The model is chosen by name
//! from fastembed's catalogue and loaded lazily on first use, so opening a
//! session that never embeds (read-only queries on a warm cache aside) does
//! not pay the model start-up cost.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::types::{l2_normalize, EmbeddingError};
use super::Embedder;
use crate::config::ModelConfig;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Batch size for efficient embedding generation
pub const BATCH_SIZE: usize = 32;

/// Get the default cache directory for fastembed models
/// Uses FASTEMBED_CACHE_PATH env var, or falls back to platform cache directory
fn get_cache_dir() -> PathBuf {
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return PathBuf::from(path);
    }

    // Linux: ~/.cache/passage-probe/fastembed
    // macOS: ~/Library/Caches/dev.passage-probe.passage-probe/fastembed
    if let Some(proj_dirs) = directories::ProjectDirs::from("dev", "passage-probe", "passage-probe") {
        return proj_dirs.cache_dir().join("fastembed");
    }

    if let Some(base_dirs) = directories::BaseDirs::new() {
        return base_dirs.home_dir().join(".cache/passage-probe/fastembed");
    }

    PathBuf::from(".fastembed_cache")
}

/// Look up a fastembed model by name.
///
/// Accepts the exact fastembed model code (`Qdrant/all-MiniLM-L6-v2-onnx`)
/// as well as the usual hub spelling (`sentence-transformers/all-MiniLM-L6-v2`)
/// by comparing the part after the last `/`. Returns the model and its
/// native output dimension.
pub fn resolve_model(name: &str) -> Result<(EmbeddingModel, usize), EmbeddingError> {
    let wanted = name.trim().to_lowercase();
    let wanted_tail = wanted.rsplit('/').next().unwrap_or(&wanted).to_string();

    TextEmbedding::list_supported_models()
        .into_iter()
        .find(|info| {
            let code = info.model_code.to_lowercase();
            if code == wanted {
                return true;
            }
            let tail = code.rsplit('/').next().unwrap_or(&code);
            tail == wanted_tail || tail.trim_end_matches("-onnx") == wanted_tail
        })
        .map(|info| (info.model, info.dim))
        .ok_or_else(|| EmbeddingError::InvalidInput(format!("Unknown embedding model: {}", name)))
}

// ============================================================================
// EMBEDDING SERVICE
// ============================================================================

/// fastembed-backed [`Embedder`]
pub struct EmbeddingService {
    model_name: String,
    model: EmbeddingModel,
    dimensions: usize,
    loaded: OnceLock<Result<Mutex<TextEmbedding>, String>>,
}

impl EmbeddingService {
    /// Create a service for `model_name`, checking that the model's native
    /// dimension equals `expected_dimensions`. The model itself loads lazily.
    pub fn new(model_name: &str, expected_dimensions: usize) -> Result<Self, EmbeddingError> {
        let (model, dimensions) = resolve_model(model_name)?;
        if dimensions != expected_dimensions {
            return Err(EmbeddingError::ModelInit(format!(
                "{} produces {}-dimensional vectors but embed_dim is {}",
                model_name, dimensions, expected_dimensions
            )));
        }

        Ok(Self {
            model_name: model_name.to_string(),
            model,
            dimensions,
            loaded: OnceLock::new(),
        })
    }

    /// Create from the `[model]` settings section
    pub fn from_config(config: &ModelConfig) -> Result<Self, EmbeddingError> {
        Self::new(&config.name, config.embed_dim)
    }

    fn get_model(&self) -> Result<MutexGuard<'_, TextEmbedding>, EmbeddingError> {
        let result = self.loaded.get_or_init(|| {
            let cache_dir = get_cache_dir();
            if let Err(e) = std::fs::create_dir_all(&cache_dir) {
                tracing::warn!("Failed to create cache directory {:?}: {}", cache_dir, e);
            }

            tracing::info!("Loading embedding model {}", self.model_name);
            let options = InitOptions::new(self.model.clone())
                .with_show_download_progress(true)
                .with_cache_dir(cache_dir);

            TextEmbedding::try_new(options).map(Mutex::new).map_err(|e| {
                format!(
                    "Failed to initialize {}: {}. \
                    Ensure ONNX runtime is available and model files can be downloaded.",
                    self.model_name, e
                )
            })
        });

        match result {
            Ok(model) => model
                .lock()
                .map_err(|e| EmbeddingError::ModelInit(format!("Lock poisoned: {}", e))),
            Err(err) => Err(EmbeddingError::ModelInit(err.clone())),
        }
    }

    /// Load the model now (downloading it if necessary) instead of on the
    /// first embedding call
    pub fn init(&self) -> Result<(), EmbeddingError> {
        self.get_model().map(|_| ())
    }
}

impl Embedder for EmbeddingService {
    fn embed(&self, texts: &[&str], normalize: bool) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = self.get_model()?;
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let embeddings = model
                .embed(chunk.to_vec(), None)
                .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

            for mut vector in embeddings {
                if vector.len() != self.dimensions {
                    return Err(EmbeddingError::InvalidDimensions(self.dimensions, vector.len()));
                }
                if normalize {
                    l2_normalize(&mut vector);
                }
                all_embeddings.push(vector);
            }
        }

        if all_embeddings.len() != texts.len() {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                all_embeddings.len()
            )));
        }

        Ok(all_embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn warm_up(&self) -> Result<(), EmbeddingError> {
        self.init()
    }
}

// ============================================================================
// TESTS
// ============================================================================
