//! All-versions and sharing events against an already indexed object.

use std::collections::BTreeSet;

use pretty_assertions::assert_eq;
use serde_json::json;

use e2e_tests::{guid, new_version_event, object_event, rules_registry, timestamp, TestHarness};
use objsearch_indexing::{ErrorKind, IndexerWorker, IndexingStorage, WorkerConfig};
use objsearch_types::{StatusEvent, StatusEventType};

const GENOME_RULES: &str = r#"{
    "global_object_type": "Genome",
    "storage_code": "WS",
    "storage_object_type": "KBaseGenomes.Genome",
    "indexing_rules": [{"path": "/scientific_name", "full_text": true}]
}"#;

/// Harness with `WS:1/2/3` indexed, plus its worker.
async fn indexed_genome() -> (TestHarness, IndexerWorker) {
    let harness = TestHarness::new();
    harness.handler.put_object(
        guid("WS:1/2/3"),
        "KBaseGenomes.Genome",
        "ecoli",
        json!({"scientific_name": "Escherichia coli"}),
    );
    harness.ingest(vec![new_version_event(1, "2", 3, "KBaseGenomes.Genome", 1_000)]);

    let worker = harness.worker(rules_registry(&[GENOME_RULES]).unwrap(), WorkerConfig::default());
    let stats = worker.run_once(Some("WS")).await.unwrap();
    assert_eq!(stats.indexed, 1);
    (harness, worker)
}

async fn apply(harness: &TestHarness, worker: &IndexerWorker, event: StatusEvent) {
    harness.ingest(vec![event]);
    let stats = worker.run_once(Some("WS")).await.unwrap();
    assert_eq!(stats.indexed, 1, "event was not applied: {:?}", stats);
}

async fn text_hits(harness: &TestHarness, groups: &[i32]) -> BTreeSet<String> {
    harness
        .indexing
        .search_ids_by_text(Some("Genome"), "coli", &groups.iter().copied().collect())
        .await
        .unwrap()
        .into_iter()
        .map(|g| g.to_string())
        .collect()
}

#[tokio::test]
async fn test_rename_all_versions() {
    let (harness, worker) = indexed_genome().await;
    let rename = StatusEvent::builder("WS", StatusEventType::RenameAllVersions, timestamp(2_000))
        .with_access_group(1)
        .with_object_id("2")
        .with_new_name("ecoli_k12")
        .build();
    apply(&harness, &worker, rename).await;

    let objects = harness
        .indexing
        .get_objects_by_ids(&[guid("WS:1/2/3")].into_iter().collect())
        .await
        .unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].name, "ecoli_k12");
}

#[tokio::test]
async fn test_rename_without_name_fails() {
    let (harness, worker) = indexed_genome().await;
    harness.ingest(vec![object_event(StatusEventType::RenameAllVersions, 1, "2", 2_000)]);

    let stats = worker.run_once(Some("WS")).await.unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(harness.unprocessed(), 0);
}

#[tokio::test]
async fn test_delete_and_undelete() {
    let (harness, worker) = indexed_genome().await;

    apply(&harness, &worker, object_event(StatusEventType::DeleteAllVersions, 1, "2", 2_000)).await;
    assert!(harness.indexing.document_ids().is_empty());
    assert!(text_hits(&harness, &[1]).await.is_empty());

    apply(&harness, &worker, object_event(StatusEventType::UndeleteAllVersions, 1, "2", 3_000)).await;
    assert_eq!(text_hits(&harness, &[1]).await, BTreeSet::from(["WS:1/2/3".to_string()]));
}

#[tokio::test]
async fn test_publish_and_unpublish() {
    let (harness, worker) = indexed_genome().await;
    assert!(text_hits(&harness, &[]).await.is_empty());

    apply(&harness, &worker, object_event(StatusEventType::PublishAllVersions, 1, "2", 2_000)).await;
    assert_eq!(text_hits(&harness, &[]).await.len(), 1);

    apply(&harness, &worker, object_event(StatusEventType::UnpublishAllVersions, 1, "2", 3_000)).await;
    assert!(text_hits(&harness, &[]).await.is_empty());
}

#[tokio::test]
async fn test_unshare_and_share() {
    let (harness, worker) = indexed_genome().await;
    assert_eq!(text_hits(&harness, &[1]).await.len(), 1);

    apply(&harness, &worker, object_event(StatusEventType::Unshared, 1, "2", 2_000)).await;
    assert!(text_hits(&harness, &[1]).await.is_empty());

    let shared = StatusEvent::builder("WS", StatusEventType::Shared, timestamp(3_000))
        .with_access_group(1)
        .with_object_id("2")
        .with_public(true)
        .build();
    apply(&harness, &worker, shared).await;
    assert_eq!(text_hits(&harness, &[1]).await.len(), 1);
    // public share is visible without group membership
    assert_eq!(text_hits(&harness, &[]).await.len(), 1);
}

#[tokio::test]
async fn test_unknown_storage_code_halts() {
    let (harness, worker) = indexed_genome().await;
    let event = StatusEvent::builder("FS", StatusEventType::DeleteAllVersions, timestamp(2_000))
        .with_object_id("readme")
        .build();
    harness.ingest(vec![event]);

    // scoped to WS: the FS event is not seen
    let stats = worker.run_once(Some("WS")).await.unwrap();
    assert_eq!(stats.total(), 0);

    let err = worker.run_once(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fatal);
}
