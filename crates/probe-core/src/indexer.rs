//! Incremental Indexer
//!
//! Segments, embeds and stores every source that is not in the store yet.
//! Deduplication is by path only: a file that changed after it was indexed
//! keeps its old passages until the store is rebuilt.
//!
//! Each document is written as one atomic unit, so a run that fails part
//! way leaves only complete documents behind and the next run picks up the
//! rest.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::chunking::Segmenter;
use crate::embeddings::{Embedder, EmbeddingError};
use crate::scan::SourceFile;
use crate::storage::{Result, Storage, StorageError};

/// Outcome of one indexing run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Sources offered to the run
    pub discovered: usize,
    /// Sources skipped because their path was already indexed
    pub skipped_existing: usize,
    /// Documents committed
    pub indexed: usize,
    /// Documents that could not be read, embedded or written
    pub failed: usize,
    /// Passages committed
    pub passages: usize,
}

/// Progress of an indexing run
#[derive(Debug, Clone, PartialEq)]
pub enum IndexEvent {
    /// `total` new documents are about to be processed
    Started { total: usize },
    /// A document was committed
    DocumentIndexed { path: String, passages: usize },
    /// A document was skipped and stays eligible for the next run
    DocumentFailed { path: String, error: String },
    /// The run is over
    Finished(IndexReport),
}

/// Drives segmentation, embedding and store writes
pub struct Indexer<'a> {
    store: &'a Storage,
    embedder: &'a dyn Embedder,
    segmenter: &'a Segmenter,
    progress: Option<&'a UnboundedSender<IndexEvent>>,
}

impl<'a> Indexer<'a> {
    pub fn new(store: &'a Storage, embedder: &'a dyn Embedder, segmenter: &'a Segmenter) -> Self {
        Self {
            store,
            embedder,
            segmenter,
            progress: None,
        }
    }

    /// Report progress on `sender`. A closed receiver is ignored.
    pub fn with_progress(mut self, sender: &'a UnboundedSender<IndexEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    fn emit(&self, event: IndexEvent) {
        if let Some(sender) = self.progress {
            let _ = sender.send(event);
        }
    }

    /// Index `(path, text)` pairs whose path is not stored yet, in order.
    ///
    /// Only a failure to read the set of indexed paths aborts the run;
    /// per-document failures are logged and counted.
    pub fn index<I>(&self, source: I) -> Result<IndexReport>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut seen = self.store.existing_document_paths()?;
        let mut report = IndexReport::default();

        let mut to_index = Vec::new();
        for (path, text) in source {
            report.discovered += 1;
            if seen.insert(path.clone()) {
                to_index.push((path, text));
            } else {
                report.skipped_existing += 1;
            }
        }

        self.run(report, to_index.into_iter().map(|(path, text)| (path.clone(), Some((path, text)))))
    }

    /// Index files on disk whose path is not stored yet.
    ///
    /// Files are only read once they are known to be new. Unreadable files
    /// count as failures and are skipped.
    pub fn index_files(&self, paths: &[PathBuf]) -> Result<IndexReport> {
        let seen = self.store.existing_document_paths()?;
        let mut report = IndexReport {
            discovered: paths.len(),
            ..IndexReport::default()
        };

        let mut queued: HashSet<String> = HashSet::new();
        let mut to_index = Vec::new();
        for path in paths {
            let key = path.to_string_lossy().into_owned();
            if seen.contains(&key) || !queued.insert(key.clone()) {
                report.skipped_existing += 1;
            } else {
                to_index.push((key, path));
            }
        }

        self.run(
            report,
            to_index.into_iter().map(|(key, path)| {
                let loaded = SourceFile::load(path).map(|file| (file.path, file.text));
                (key, loaded)
            }),
        )
    }

    fn run<I>(&self, mut report: IndexReport, work: I) -> Result<IndexReport>
    where
        I: ExactSizeIterator<Item = (String, Option<(String, String)>)>,
    {
        let total = work.len();
        if total == 0 {
            tracing::debug!("Nothing new to index");
            self.emit(IndexEvent::Finished(report));
            return Ok(report);
        }

        tracing::info!("Indexing {} new files", total);
        self.emit(IndexEvent::Started { total });

        for (path, loaded) in work {
            let Some((path, text)) = loaded else {
                report.failed += 1;
                self.emit(IndexEvent::DocumentFailed {
                    path,
                    error: "file could not be read".to_string(),
                });
                continue;
            };

            match self.index_document(&path, &text) {
                Ok(passages) => {
                    report.indexed += 1;
                    report.passages += passages;
                    self.emit(IndexEvent::DocumentIndexed { path, passages });
                }
                Err(e) => {
                    tracing::warn!("Failed to index {}: {}", path, e);
                    report.failed += 1;
                    self.emit(IndexEvent::DocumentFailed {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Indexed {} documents ({} passages), {} failed, {} already present",
            report.indexed,
            report.passages,
            report.failed,
            report.skipped_existing
        );
        self.emit(IndexEvent::Finished(report));
        Ok(report)
    }

    /// Segment, embed and commit one document. Returns the passage count.
    ///
    /// Embedding runs before the write transaction opens, so a provider
    /// failure never touches the store.
    pub fn index_document(&self, path: &str, text: &str) -> Result<usize> {
        let passages = self.segmenter.segment(path, text);
        let batch: Vec<&str> = passages.iter().map(String::as_str).collect();
        let vectors = self.embedder.embed(&batch, true)?;

        if vectors.len() != passages.len() {
            return Err(StorageError::Embedding(EmbeddingError::EmbeddingFailed(format!(
                "Expected {} embeddings, got {}",
                passages.len(),
                vectors.len()
            ))));
        }

        self.store.write_document(|txn| {
            let document_id = txn.insert_document(path, text)?;
            let mut written = 0;
            for (chunk_index, (passage, vector)) in passages.iter().zip(&vectors).enumerate() {
                if let Some(passage_id) = txn.insert_passage(document_id, chunk_index, passage)? {
                    txn.insert_embedding(passage_id, vector)?;
                    written += 1;
                }
            }
            Ok(written)
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
