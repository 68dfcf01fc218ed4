//! Settings
//!
//! TOML-backed configuration, laid out in four sections:
//!
//! ```toml
//! [paths]
//! root_dir = "~/notes"
//! db_path = "~/.cache/passage-probe/index.db"
//!
//! [model]
//! name = "sentence-transformers/all-MiniLM-L6-v2"
//! embed_dim = 384
//!
//! [index]
//! chunk_len = 1000
//! chunk_overlap = 200
//! top_k = 10
//! pool_size = 50
//! rrf_k = 60
//! line_by_line_ext = [".tsv"]
//!
//! [filters]
//! max_file_size_mb = 5
//! blacklist_ext = [".png", ".zip"]
//! blacklist_dirs = [".git", "node_modules"]
//! ```
//!
//! Only `[paths]` is required; everything else has defaults.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Environment variable pointing at the settings file
pub const CONFIG_ENV_VAR: &str = "PASSAGE_PROBE_CONFIG";

/// Settings file used when nothing else is specified
pub const DEFAULT_CONFIG_FILE: &str = "settings.toml";

/// Default embedding model (384-dimensional)
pub const DEFAULT_MODEL_NAME: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Output dimension of [`DEFAULT_MODEL_NAME`]
pub const DEFAULT_EMBED_DIM: usize = 384;

/// Default target passage length in characters
pub const DEFAULT_CHUNK_LEN: usize = 1000;

/// Default overlap between consecutive passages in characters
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Default number of fused results returned per query
pub const DEFAULT_TOP_K: usize = 10;

/// Candidates pulled from each modality before fusion
pub const DEFAULT_POOL_SIZE: usize = 50;

/// RRF smoothing constant
pub const DEFAULT_RRF_K: u32 = 60;

/// Files above this many MiB are skipped
pub const DEFAULT_MAX_FILE_SIZE_MB: f64 = 5.0;

/// Line-oriented extensions that are always active
pub const ALWAYS_LINE_ORIENTED: &[&str] = &[".csv"];

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Configuration error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Settings file could not be read
    #[error("Failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Settings file is not valid TOML or misses a required key
    #[error("Invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Configuration result type
pub type Result<T> = std::result::Result<T, ConfigError>;

// ============================================================================
// SETTINGS
// ============================================================================

/// Complete runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Scan root and store location
    pub paths: PathsConfig,

    /// Embedding model selection
    #[serde(default)]
    pub model: ModelConfig,

    /// Segmentation and retrieval tuning
    #[serde(default)]
    pub index: IndexConfig,

    /// File filters applied while scanning
    #[serde(default)]
    pub filters: FilterConfig,
}

/// `[paths]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory tree to index
    pub root_dir: PathBuf,
    /// SQLite database file
    pub db_path: PathBuf,
}

/// `[model]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Embedding model identifier
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Output dimension; must match the model exactly
    #[serde(default = "default_embed_dim")]
    pub embed_dim: usize,
}

/// `[index]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Target passage length in characters
    #[serde(default = "default_chunk_len")]
    pub chunk_len: usize,

    /// Characters shared by consecutive passages
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Final result count
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Candidates pulled per modality before fusion
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// RRF smoothing constant (higher = flatter rank curve)
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,

    /// Extensions segmented one passage per line (`.csv` is always included)
    #[serde(default, rename = "line_by_line_ext")]
    pub line_oriented_extensions: Vec<String>,
}

/// `[filters]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Size limit in MiB (fractions allowed)
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: f64,

    /// Extensions to skip, matched case-insensitively
    #[serde(default, rename = "blacklist_ext")]
    pub blacklist_extensions: Vec<String>,

    /// Directory names to skip, matched against every path component
    #[serde(default, rename = "blacklist_dirs")]
    pub blacklist_directory_names: Vec<String>,
}

fn default_model_name() -> String {
    DEFAULT_MODEL_NAME.to_string()
}

fn default_embed_dim() -> usize {
    DEFAULT_EMBED_DIM
}

fn default_chunk_len() -> usize {
    DEFAULT_CHUNK_LEN
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_rrf_k() -> u32 {
    DEFAULT_RRF_K
}

fn default_max_file_size_mb() -> f64 {
    DEFAULT_MAX_FILE_SIZE_MB
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            embed_dim: default_embed_dim(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_len: DEFAULT_CHUNK_LEN,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            pool_size: DEFAULT_POOL_SIZE,
            rrf_k: DEFAULT_RRF_K,
            line_oriented_extensions: Vec::new(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
            blacklist_extensions: Vec::new(),
            blacklist_directory_names: Vec::new(),
        }
    }
}

impl Settings {
    /// Settings with defaults for everything except the two required paths
    pub fn new(root_dir: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            paths: PathsConfig {
                root_dir: root_dir.into(),
                db_path: db_path.into(),
            },
            model: ModelConfig::default(),
            index: IndexConfig::default(),
            filters: FilterConfig::default(),
        }
    }

    /// Location of the settings file: `$PASSAGE_PROBE_CONFIG` or `./settings.toml`
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Read, parse, normalize and validate a settings file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse settings from TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut settings: Settings = toml::from_str(raw)?;
        settings.normalize();
        settings.validate()?;
        Ok(settings)
    }

    /// Expand `~` in paths and canonicalize extension spellings
    pub fn normalize(&mut self) {
        self.paths.root_dir = expand_tilde(&self.paths.root_dir);
        self.paths.db_path = expand_tilde(&self.paths.db_path);
        self.index.line_oriented_extensions = self
            .index
            .line_oriented_extensions
            .iter()
            .map(|e| normalize_extension(e))
            .collect();
        self.filters.blacklist_extensions = self
            .filters
            .blacklist_extensions
            .iter()
            .map(|e| normalize_extension(e))
            .collect();
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        let index = &self.index;
        if index.chunk_len == 0 {
            return Err(ConfigError::Invalid("index.chunk_len must be positive".into()));
        }
        if index.chunk_overlap >= index.chunk_len {
            return Err(ConfigError::Invalid(format!(
                "index.chunk_overlap ({}) must be smaller than index.chunk_len ({})",
                index.chunk_overlap, index.chunk_len
            )));
        }
        if index.top_k == 0 {
            return Err(ConfigError::Invalid("index.top_k must be positive".into()));
        }
        if index.pool_size == 0 {
            return Err(ConfigError::Invalid("index.pool_size must be positive".into()));
        }
        if self.model.embed_dim == 0 {
            return Err(ConfigError::Invalid("model.embed_dim must be positive".into()));
        }
        if self.model.name.trim().is_empty() {
            return Err(ConfigError::Invalid("model.name must not be empty".into()));
        }
        if !self.filters.max_file_size_mb.is_finite() || self.filters.max_file_size_mb < 0.0 {
            return Err(ConfigError::Invalid(
                "filters.max_file_size_mb must be a non-negative number".into(),
            ));
        }
        Ok(())
    }

    /// Size limit in bytes
    pub fn max_file_size_bytes(&self) -> u64 {
        (self.filters.max_file_size_mb * 1024.0 * 1024.0) as u64
    }

    /// Line-oriented extensions including the built-in `.csv`
    pub fn line_oriented_extensions(&self) -> HashSet<String> {
        ALWAYS_LINE_ORIENTED
            .iter()
            .map(|e| e.to_string())
            .chain(
                self.index
                    .line_oriented_extensions
                    .iter()
                    .map(|e| normalize_extension(e)),
            )
            .collect()
    }

    /// Blacklisted extensions, lowercase with a leading dot
    pub fn blacklist_extensions(&self) -> HashSet<String> {
        self.filters
            .blacklist_extensions
            .iter()
            .map(|e| normalize_extension(e))
            .collect()
    }

    /// Blacklisted directory names
    pub fn blacklist_directory_names(&self) -> HashSet<String> {
        self.filters.blacklist_directory_names.iter().cloned().collect()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Lowercase an extension and make sure it starts with a dot
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match directories::BaseDirs::new() {
        Some(base) => base.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
