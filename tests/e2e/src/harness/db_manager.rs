//! Test Database Manager
//!
//! Provides isolated stores for journey tests:
//! - A temporary directory holding the corpus root and the store file
//! - Settings sized for small fixtures (100-char passages, 20-char overlap)
//! - Reopen and rebuild helpers that mimic separate program runs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use passage_probe_core::{Embedder, IndexReport, Session, Settings, StoreStats};
use tempfile::TempDir;

use crate::mocks::{HashEmbedder, TestCorpus};

/// Embedding width used by every journey test
pub const TEST_DIMENSIONS: usize = 64;

/// Manager for one test store
///
/// Everything lives in a temporary directory that is deleted when the
/// manager is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let db = TestDatabaseManager::new_temp();
/// db.corpus.write("a.txt", "hello world");
/// db.session.index().unwrap();
/// let hits = db.session.search("hello").unwrap();
/// ```
pub struct TestDatabaseManager {
    /// The open session
    pub session: Session,
    /// Source files under the configured root
    pub corpus: TestCorpus,
    settings: Settings,
    embedder: Arc<dyn Embedder>,
    /// Kept alive so the directory outlives the session
    _temp_dir: TempDir,
}

impl TestDatabaseManager {
    /// Fresh store with a [`HashEmbedder`]
    pub fn new_temp() -> Self {
        Self::with_embedder(Arc::new(HashEmbedder::new(TEST_DIMENSIONS)))
    }

    pub fn with_embedder(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_settings(embedder, |_| {})
    }

    /// Fresh store, letting the caller adjust settings before opening
    pub fn with_settings(embedder: Arc<dyn Embedder>, configure: impl FnOnce(&mut Settings)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let corpus = TestCorpus::new(temp_dir.path().join("corpus"));

        let mut settings = Settings::new(corpus.root(), temp_dir.path().join("store").join("probe.db"));
        settings.model.embed_dim = embedder.dimensions();
        settings.index.chunk_len = 100;
        settings.index.chunk_overlap = 20;
        configure(&mut settings);

        let session = Session::open(settings.clone(), Arc::clone(&embedder))
            .expect("Failed to open test session");

        Self {
            session,
            corpus,
            settings,
            embedder,
            _temp_dir: temp_dir,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn db_path(&self) -> &Path {
        &self.settings.paths.db_path
    }

    /// Store file plus its WAL side files
    pub fn store_files(&self) -> Vec<PathBuf> {
        let db = self.db_path().to_string_lossy().into_owned();
        [db.clone(), format!("{db}-wal"), format!("{db}-shm")]
            .into_iter()
            .map(PathBuf::from)
            .filter(|p| p.exists())
            .collect()
    }

    /// Close the session and open the same store again, as a new run would
    pub fn reopen(self) -> Self {
        let embedder = Arc::clone(&self.embedder);
        self.reopen_with(embedder)
    }

    /// Reopen with a different embedder
    pub fn reopen_with(self, embedder: Arc<dyn Embedder>) -> Self {
        let Self {
            session,
            corpus,
            settings,
            _temp_dir,
            ..
        } = self;
        drop(session);

        let session = Session::open(settings.clone(), Arc::clone(&embedder))
            .expect("Failed to reopen test session");
        Self {
            session,
            corpus,
            settings,
            embedder,
            _temp_dir,
        }
    }

    /// Delete the store and start over
    pub fn rebuild(self) -> Self {
        let Self {
            session,
            corpus,
            settings,
            embedder,
            _temp_dir,
        } = self;
        let session = session.rebuild().expect("Failed to rebuild store");
        Self {
            session,
            corpus,
            settings,
            embedder,
            _temp_dir,
        }
    }

    pub fn index(&self) -> IndexReport {
        self.session.index().expect("Indexing run failed")
    }

    pub fn stats(&self) -> StoreStats {
        self.session.stats().expect("Failed to read store stats")
    }

    /// Paths of the top hybrid hits, relative to the corpus root
    pub fn search_paths(&self, query: &str) -> Vec<String> {
        self.session
            .search(query)
            .expect("Search failed")
            .into_iter()
            .map(|hit| self.relative(&hit.path))
            .collect()
    }

    pub fn relative(&self, path: &str) -> String {
        Path::new(path)
            .strip_prefix(self.corpus.root())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| path.to_string())
    }
}
