//! Journey: provider failures surface to the caller instead of partial answers

use std::sync::Arc;

use passage_probe_core::{EmbeddingError, Session, SessionError, StorageError};
use passage_probe_e2e_tests::harness::TEST_DIMENSIONS;
use passage_probe_e2e_tests::{FailingEmbedder, TestDatabaseManager};

#[test]
fn test_query_errors_are_returned_whole() {
    let db = TestDatabaseManager::new_temp();
    db.corpus.seed_topics();
    assert_eq!(db.index().indexed, 3);

    // Same store, but the provider now fails on every text
    let db = db.reopen_with(Arc::new(FailingEmbedder::new(TEST_DIMENSIONS, "")));

    let hybrid = db.session.search("borrow checker lifetimes");
    assert!(matches!(
        hybrid,
        Err(SessionError::Storage(StorageError::Embedding(_)))
    ));

    let semantic = db.session.semantic_search("borrow checker lifetimes");
    assert!(matches!(
        semantic,
        Err(SessionError::Storage(StorageError::Embedding(_)))
    ));

    // Nothing was written by the failed queries
    assert_eq!(db.stats().documents, 3);
}

#[test]
fn test_recovered_provider_answers_again() {
    let db = TestDatabaseManager::new_temp();
    db.corpus.seed_topics();
    db.index();

    let failing = Arc::new(FailingEmbedder::new(TEST_DIMENSIONS, "sourdough"));
    let db = db.reopen_with(failing.clone());
    assert!(db.session.search("sourdough flour").is_err());
    assert!(db.session.search("telescope").is_ok());

    failing.recover();
    assert_eq!(db.search_paths("sourdough flour")[0], "baking.md");
}

#[test]
fn test_unloadable_model_fails_at_open() {
    let db = TestDatabaseManager::new_temp();
    let settings = db.settings().clone();
    drop(db.session);

    let result = Session::open(settings, Arc::new(FailingEmbedder::unloadable(TEST_DIMENSIONS)));
    assert!(matches!(
        result,
        Err(SessionError::Embedding(EmbeddingError::ModelInit(_)))
    ));
}
