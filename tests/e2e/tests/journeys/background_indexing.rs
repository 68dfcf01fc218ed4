//! Journey: index on a worker while the session keeps answering queries

use std::sync::Arc;

use passage_probe_core::{join_indexing, IndexEvent, IndexReport};
use passage_probe_e2e_tests::harness::TEST_DIMENSIONS;
use passage_probe_e2e_tests::{FailingEmbedder, TestDatabaseManager};
use tokio::sync::mpsc::UnboundedReceiver;

async fn drain(mut rx: UnboundedReceiver<IndexEvent>) -> Vec<IndexEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_progress_events_cover_every_document() {
    let db = TestDatabaseManager::new_temp();
    db.corpus.seed_numbered(6);

    let (handle, rx) = db.session.spawn_indexing().unwrap();
    let events = drain(rx).await;
    let report = join_indexing(handle).await.unwrap();

    assert_eq!(events.first(), Some(&IndexEvent::Started { total: 6 }));
    assert_eq!(events.last(), Some(&IndexEvent::Finished(report)));
    let indexed = events
        .iter()
        .filter(|e| matches!(e, IndexEvent::DocumentIndexed { passages: 1, .. }))
        .count();
    assert_eq!(indexed, 6);
    assert_eq!(report.indexed, 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queries_run_while_indexing() {
    let db = TestDatabaseManager::new_temp();
    db.corpus.seed_numbered(40);

    let (handle, mut rx) = db.session.spawn_indexing().unwrap();

    // Query between progress events; every answer must be consistent
    while let Some(event) = rx.recv().await {
        let hits = db.session.search("numbered document").unwrap();
        let stats = db.stats();
        assert!(hits.len() <= stats.documents);
        if let IndexEvent::Finished(report) = event {
            assert_eq!(report.indexed, 40);
        }
    }

    join_indexing(handle).await.unwrap();
    assert_eq!(db.stats().documents, 40);
    assert_eq!(db.session.search("topic7").unwrap()[0].path, db.corpus.path("doc-7.txt").to_string_lossy());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failures_are_reported_as_events() {
    let embedder = Arc::new(FailingEmbedder::new(TEST_DIMENSIONS, "POISON"));
    let db = TestDatabaseManager::with_embedder(embedder);
    db.corpus.write("a.txt", "healthy");
    db.corpus.write("b.txt", "POISON inside");

    let (handle, rx) = db.session.spawn_indexing().unwrap();
    let events = drain(rx).await;
    let report = join_indexing(handle).await.unwrap();

    let failed: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            IndexEvent::DocumentFailed { path, .. } => Some(path.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].ends_with("b.txt"));
    assert_eq!(
        report,
        IndexReport {
            discovered: 2,
            skipped_existing: 0,
            indexed: 1,
            failed: 1,
            passages: 1,
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_nothing_new_only_finishes() {
    let db = TestDatabaseManager::new_temp();
    db.corpus.seed_numbered(2);
    db.index();

    let (handle, rx) = db.session.spawn_indexing().unwrap();
    let events = drain(rx).await;
    let report = join_indexing(handle).await.unwrap();

    assert_eq!(events, vec![IndexEvent::Finished(report)]);
    assert_eq!(report.skipped_existing, 2);
}
