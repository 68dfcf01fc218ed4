//! Journey: throw the store away and index from scratch

use std::sync::Arc;

use passage_probe_core::{join_indexing, RebuildError, Session};
use passage_probe_e2e_tests::harness::TEST_DIMENSIONS;
use passage_probe_e2e_tests::{HashEmbedder, TestDatabaseManager};

#[test]
fn test_rebuild_reindexes_current_content() {
    let db = TestDatabaseManager::new_temp();
    db.corpus.write("note.txt", "first draft about gardening");
    db.index();

    db.corpus.write("note.txt", "second draft about astronomy");
    assert_eq!(db.index().indexed, 0);

    let db = db.rebuild();
    assert_eq!(db.stats().documents, 0);
    assert!(db.session.search("gardening").unwrap().is_empty());

    let report = db.index();
    assert_eq!(report.indexed, 1);
    let hits = db.session.search("astronomy").unwrap();
    assert_eq!(hits[0].snippet, "second draft about astronomy");
    assert_eq!(hits[0].lexical_rank, Some(1));
}

#[test]
fn test_rebuild_drops_deleted_files() {
    let db = TestDatabaseManager::new_temp();
    db.corpus.seed_topics();
    db.index();
    db.corpus.remove("baking.md");

    let db = db.rebuild();
    db.index();
    assert_eq!(db.stats().documents, 2);
    assert!(!db.search_paths("sourdough").contains(&"baking.md".to_string()));
}

#[test]
fn test_open_fresh_discards_previous_store() {
    let db = TestDatabaseManager::new_temp();
    db.corpus.seed_numbered(3);
    db.index();
    let settings = db.settings().clone();
    drop(db.session);

    let fresh = Session::open_fresh(settings, Arc::new(HashEmbedder::new(TEST_DIMENSIONS))).unwrap();
    assert_eq!(fresh.stats().unwrap().documents, 0);
    assert_eq!(fresh.index().unwrap().indexed, 3);
}

#[test]
fn test_rebuild_allows_new_dimension() {
    let db = TestDatabaseManager::new_temp();
    db.corpus.seed_numbered(2);
    db.index();
    let mut settings = db.settings().clone();
    drop(db.session);

    settings.model.embed_dim = TEST_DIMENSIONS * 2;
    let wide = Arc::new(HashEmbedder::new(TEST_DIMENSIONS * 2));
    assert!(Session::open(settings.clone(), wide.clone()).is_err());

    let session = Session::open_fresh(settings, wide).unwrap();
    assert_eq!(session.index().unwrap().indexed, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_refused_rebuild_keeps_session_usable() {
    let db = TestDatabaseManager::new_temp();
    db.corpus.seed_topics();
    db.index();
    db.corpus.seed_numbered(3);

    let TestDatabaseManager { session, corpus, .. } = db;
    let (handle, _rx) = session.spawn_indexing().unwrap();
    let worker_store = Arc::clone(session.store());

    let session = match session.rebuild() {
        Err(RebuildError::Busy(session)) => *session,
        Err(RebuildError::Failed(e)) => panic!("rebuild failed instead of being refused: {e}"),
        Ok(_) => panic!("rebuild must be refused while indexing"),
    };

    // Nothing was deleted and queries still work
    let hits = session.search("borrow checker lifetimes").unwrap();
    assert_eq!(hits[0].path, corpus.path("rust.txt").to_string_lossy());

    drop(worker_store);
    join_indexing(handle).await.unwrap();
    assert_eq!(session.stats().unwrap().documents, 6);
}
