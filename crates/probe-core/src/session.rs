//! Session Controller
//!
//! Ties the pieces together for one configured root and store: index the
//! root (in the foreground or on a worker), then answer queries.
//!
//! Background indexing writes through the store's writer connection while
//! queries keep using the reader connection, so searches stay available
//! during a run. Progress is delivered as [`IndexEvent`]s on a channel.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::chunking::Segmenter;
use crate::config::{ConfigError, Settings};
use crate::embeddings::{Embedder, EmbeddingError};
use crate::indexer::{IndexEvent, IndexReport, Indexer};
use crate::scan::FileScanner;
use crate::search::{FusedHit, HybridSearchConfig, HybridSearcher, SemanticHit};
use crate::storage::{Storage, StorageError, StoreStats};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Session error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// The configured root directory is missing
    #[error("Root directory does not exist: {}", .0.display())]
    MissingRoot(PathBuf),
    /// The provider's output width differs from `embed_dim`
    #[error("Embedding provider produces {provider}-dimensional vectors but embed_dim is {configured}")]
    EmbedderDimension { configured: usize, provider: usize },
    /// Walking the root failed
    #[error("Failed to scan {}: {source}", .path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The store is still shared with a running indexing task
    #[error("Store is still in use by a background indexing task")]
    Busy,
    /// The background worker panicked or was cancelled
    #[error("Background indexing task failed: {0}")]
    Task(String),
}

/// Session result type
pub type Result<T> = std::result::Result<T, SessionError>;

/// Outcome of a [`Session::rebuild`] that did not produce a fresh session
pub enum RebuildError {
    /// A background indexing task still holds the store. Nothing was
    /// deleted and the session is handed back.
    Busy(Box<Session>),
    /// The old store was closed but a fresh one could not be created
    Failed(SessionError),
}

impl RebuildError {
    /// The untouched session, if the rebuild was refused
    pub fn into_session(self) -> Option<Session> {
        match self {
            RebuildError::Busy(session) => Some(*session),
            RebuildError::Failed(_) => None,
        }
    }
}

impl std::fmt::Debug for RebuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RebuildError::Busy(_) => f.write_str("Busy(..)"),
            RebuildError::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

impl std::fmt::Display for RebuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RebuildError::Busy(_) => write!(f, "{}", SessionError::Busy),
            RebuildError::Failed(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for RebuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RebuildError::Busy(_) => None,
            RebuildError::Failed(e) => Some(e),
        }
    }
}

impl From<RebuildError> for SessionError {
    fn from(e: RebuildError) -> Self {
        match e {
            RebuildError::Busy(_) => SessionError::Busy,
            RebuildError::Failed(e) => e,
        }
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// One configured root + store + embedder
pub struct Session {
    settings: Settings,
    store: Arc<Storage>,
    embedder: Arc<dyn Embedder>,
    segmenter: Arc<Segmenter>,
    searcher: HybridSearcher,
}

impl Session {
    /// Open (or create) the configured store.
    ///
    /// Fails if the embedder's dimension differs from `embed_dim`, its model
    /// cannot be loaded, or the store was built for another dimension.
    pub fn open(settings: Settings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        settings.validate()?;

        let configured = settings.model.embed_dim;
        if embedder.dimensions() != configured {
            return Err(SessionError::EmbedderDimension {
                configured,
                provider: embedder.dimensions(),
            });
        }
        embedder.warm_up()?;

        let store = Arc::new(Storage::open(
            &settings.paths.db_path,
            configured,
            embedder.model_name(),
        )?);
        let segmenter = Arc::new(Segmenter::from_settings(&settings)?);
        let searcher = HybridSearcher::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            HybridSearchConfig::from(&settings.index),
        );

        tracing::debug!("Opened store at {}", settings.paths.db_path.display());

        Ok(Self {
            settings,
            store,
            embedder,
            segmenter,
            searcher,
        })
    }

    /// Delete any existing store, then open a fresh one
    pub fn open_fresh(settings: Settings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        tracing::info!("Removing store at {}", settings.paths.db_path.display());
        Storage::destroy(&settings.paths.db_path)?;
        Self::open(settings, embedder)
    }

    /// Close the store, delete it and start over with an empty one.
    ///
    /// While a task from [`Session::spawn_indexing`] still holds the store
    /// the session comes back untouched in [`RebuildError::Busy`].
    pub fn rebuild(self) -> std::result::Result<Self, RebuildError> {
        let Session {
            settings,
            store,
            embedder,
            segmenter,
            searcher,
        } = self;
        drop(searcher);

        // Both connections must be closed before the files go away
        let store = match Arc::try_unwrap(store) {
            Ok(store) => store,
            Err(store) => {
                let searcher = HybridSearcher::new(
                    Arc::clone(&store),
                    Arc::clone(&embedder),
                    HybridSearchConfig::from(&settings.index),
                );
                return Err(RebuildError::Busy(Box::new(Session {
                    settings,
                    store,
                    embedder,
                    segmenter,
                    searcher,
                })));
            }
        };
        drop(store);

        Self::open_fresh(settings, embedder).map_err(RebuildError::Failed)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<Storage> {
        &self.store
    }

    pub fn searcher(&self) -> &HybridSearcher {
        &self.searcher
    }

    fn scanner(&self) -> Result<FileScanner> {
        let root = &self.settings.paths.root_dir;
        if !root.is_dir() {
            return Err(SessionError::MissingRoot(root.clone()));
        }
        Ok(FileScanner::from_settings(&self.settings))
    }

    /// Index new files under the root on the current thread
    pub fn index(&self) -> Result<IndexReport> {
        run_indexing(&self.scanner()?, &self.store, self.embedder.as_ref(), &self.segmenter, None)
    }

    /// Like [`Session::index`], reporting progress on `progress`
    pub fn index_with_progress(&self, progress: &UnboundedSender<IndexEvent>) -> Result<IndexReport> {
        run_indexing(
            &self.scanner()?,
            &self.store,
            self.embedder.as_ref(),
            &self.segmenter,
            Some(progress),
        )
    }

    /// Index on a blocking worker while this session keeps serving queries.
    ///
    /// Must be called from within a Tokio runtime. Events arrive on the
    /// returned receiver, ending with [`IndexEvent::Finished`] unless the
    /// run fails outright.
    pub fn spawn_indexing(
        &self,
    ) -> Result<(JoinHandle<Result<IndexReport>>, UnboundedReceiver<IndexEvent>)> {
        let scanner = self.scanner()?;
        let store = Arc::clone(&self.store);
        let embedder = Arc::clone(&self.embedder);
        let segmenter = Arc::clone(&self.segmenter);
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = tokio::task::spawn_blocking(move || {
            run_indexing(&scanner, &store, embedder.as_ref(), &segmenter, Some(&tx))
        });

        Ok((handle, rx))
    }

    /// Hybrid search with the configured `top_k`
    pub fn search(&self, query: &str) -> Result<Vec<FusedHit>> {
        Ok(self.searcher.search(query)?)
    }

    /// Vector-only search with the configured `top_k`
    pub fn semantic_search(&self, query: &str) -> Result<Vec<SemanticHit>> {
        Ok(self.searcher.semantic_search(query, self.settings.index.top_k)?)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        Ok(self.store.stats()?)
    }
}

/// Await a task from [`Session::spawn_indexing`]
pub async fn join_indexing(handle: JoinHandle<Result<IndexReport>>) -> Result<IndexReport> {
    handle.await.map_err(|e| SessionError::Task(e.to_string()))?
}

fn run_indexing(
    scanner: &FileScanner,
    store: &Storage,
    embedder: &dyn Embedder,
    segmenter: &Segmenter,
    progress: Option<&UnboundedSender<IndexEvent>>,
) -> Result<IndexReport> {
    let files = scanner.discover().map_err(|source| SessionError::Scan {
        path: scanner.root().to_path_buf(),
        source,
    })?;
    tracing::debug!("Discovered {} candidate files", files.len());

    let mut indexer = Indexer::new(store, embedder, segmenter);
    if let Some(sender) = progress {
        indexer = indexer.with_progress(sender);
    }
    Ok(indexer.index_files(&files)?)
}

// ============================================================================
// TESTS
// ============================================================================
