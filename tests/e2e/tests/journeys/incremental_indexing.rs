//! Journey: repeated runs only index what is new, and failures are retried

use std::sync::Arc;

use passage_probe_core::{Session, SessionError, StorageError};
use passage_probe_e2e_tests::harness::TEST_DIMENSIONS;
use passage_probe_e2e_tests::{FailingEmbedder, HashEmbedder, TestDatabaseManager};

#[test]
fn test_second_run_is_a_no_op() {
    let db = TestDatabaseManager::new_temp();
    db.corpus.seed_numbered(4);

    let first = db.index();
    assert_eq!(first.indexed, 4);
    let stats = db.stats();

    let second = db.index();
    assert_eq!(second.discovered, 4);
    assert_eq!(second.skipped_existing, 4);
    assert_eq!(second.indexed, 0);
    assert_eq!(second.passages, 0);
    assert_eq!(db.stats(), stats);
}

#[test]
fn test_new_files_are_picked_up() {
    let db = TestDatabaseManager::new_temp();
    db.corpus.seed_numbered(2);
    db.index();

    db.corpus.write("later.txt", "a file added after the first run");
    let report = db.index();
    assert_eq!(report.skipped_existing, 2);
    assert_eq!(report.indexed, 1);
    assert_eq!(db.stats().documents, 3);
    assert_eq!(db.search_paths("added after")[0], "later.txt");
}

#[test]
fn test_changed_file_keeps_original_passages() {
    let db = TestDatabaseManager::new_temp();
    db.corpus.write("note.txt", "original wording");
    db.index();

    db.corpus.write("note.txt", "completely rewritten content");
    let report = db.index();
    assert_eq!(report.indexed, 0);

    let hits = db.session.search("rewritten").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].snippet, "original wording");
    assert_eq!(hits[0].lexical_rank, None);
}

#[test]
fn test_deleted_file_stays_searchable() {
    let db = TestDatabaseManager::new_temp();
    db.corpus.write("gone.txt", "ephemeral note");
    db.index();
    db.corpus.remove("gone.txt");

    assert_eq!(db.index().discovered, 0);
    assert_eq!(db.search_paths("ephemeral"), vec!["gone.txt"]);
}

#[test]
fn test_index_survives_reopen() {
    let db = TestDatabaseManager::new_temp();
    db.corpus.seed_topics();
    db.index();
    let stats = db.stats();

    let db = db.reopen();
    assert_eq!(db.stats(), stats);
    assert_eq!(db.index().indexed, 0);
    assert_eq!(db.search_paths("saturn")[0], "astronomy.txt");
}

#[test]
fn test_failed_document_is_retried_next_run() {
    let embedder = Arc::new(FailingEmbedder::new(TEST_DIMENSIONS, "POISON"));
    let db = TestDatabaseManager::with_embedder(embedder.clone());
    db.corpus.write("good.txt", "a perfectly ordinary document");
    db.corpus.write("bad.txt", "this one contains POISON and fails to embed");

    let first = db.index();
    assert_eq!(first.indexed, 1);
    assert_eq!(first.failed, 1);

    // Nothing of the failed document was written
    let store = db.session.store();
    let bad_path = db.corpus.path("bad.txt").to_string_lossy().into_owned();
    assert!(store.find_document(&bad_path).unwrap().is_none());
    let stats = db.stats();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.passages, stats.embeddings);

    embedder.recover();
    let second = db.index();
    assert_eq!(second.skipped_existing, 1);
    assert_eq!(second.indexed, 1);
    assert_eq!(second.failed, 0);
    assert!(store.find_document(&bad_path).unwrap().is_some());
    assert_eq!(db.search_paths("POISON")[0], "bad.txt");
}

#[test]
fn test_unreadable_file_counts_as_failed() {
    let db = TestDatabaseManager::new_temp();
    db.corpus.write("ok.txt", "fine");
    let path = db.corpus.write("vanishing.txt", "soon gone");

    // Discovered, then removed before it is read
    let files = vec![db.corpus.path("ok.txt"), path.clone()];
    std::fs::remove_file(&path).unwrap();

    let store = db.session.store();
    let segmenter = passage_probe_core::Segmenter::from_settings(db.settings()).unwrap();
    let embedder = HashEmbedder::new(TEST_DIMENSIONS);
    let report = passage_probe_core::Indexer::new(store, &embedder, &segmenter)
        .index_files(&files)
        .unwrap();

    assert_eq!(report.indexed, 1);
    assert_eq!(report.failed, 1);
}

#[test]
fn test_store_rejects_other_dimension() {
    let db = TestDatabaseManager::new_temp();
    db.corpus.seed_numbered(1);
    db.index();

    let mut settings = db.settings().clone();
    settings.model.embed_dim = TEST_DIMENSIONS / 2;
    let result = Session::open(settings, Arc::new(HashEmbedder::new(TEST_DIMENSIONS / 2)));

    assert!(matches!(
        result,
        Err(SessionError::Storage(StorageError::DimensionMismatch {
            configured,
            stored,
        })) if configured == TEST_DIMENSIONS / 2 && stored == TEST_DIMENSIONS
    ));
}
