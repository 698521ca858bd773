use std::sync::Arc;

use common::storage::BlobStore;
use common::storage::filesystem::FilesystemBlobStore;
use common::storage::memory::MemoryDocumentStore;
use serde_json::json;

use janitor::GarbageCollector;

use crate::fixtures::{APPLY_WITH_BLOBS, BUCKET, DRY_RUN_WITH_BLOBS, media_url, test_config};

async fn local_bucket(dir: &tempfile::TempDir) -> FilesystemBlobStore {
    let store = FilesystemBlobStore::new(dir.path().join("blobs"), 2)
        .await
        .unwrap();
    for key in [
        "u/a/b/v1.mp4",
        "u/a/b/t1.jpg",
        "u/a/b/orphan.mp4",
        "profile-pictures/x.png",
        "system/logo.svg",
    ] {
        store.put(BUCKET, key, b"bytes").await.unwrap();
    }
    store
}

fn documents() -> MemoryDocumentStore {
    let documents = MemoryDocumentStore::default();
    documents.insert("courses", json!({ "courseId": "c1" }));
    documents.insert("assignments", json!({ "assignmentId": "a1", "courseId": "c1" }));
    documents.insert(
        "submissions",
        json!({
            "submissionId": "s1",
            "assignmentId": "a1",
            "videoUrl": media_url("u/a/b/v1.mp4"),
            "thumbnailUrl": media_url("u/a/b/t1.jpg"),
        }),
    );
    documents.create_table("peer-responses");
    documents
}

#[tokio::test]
async fn reclaims_unreferenced_files_from_a_local_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let blobs = local_bucket(&dir).await;
    let collector = GarbageCollector::new(
        test_config(),
        Arc::new(documents()),
        Some(Arc::new(blobs) as Arc<dyn BlobStore>),
    );

    let dry = collector.run(DRY_RUN_WITH_BLOBS).await.unwrap();
    assert_eq!(dry.scanned.blob_objects, Some(5));
    assert!(dir.path().join("blobs/bkt/u/a/b/orphan.mp4").exists());

    let applied = collector.run(APPLY_WITH_BLOBS).await.unwrap();
    let deleted = applied.deleted.unwrap().blob_objects.unwrap();
    assert_eq!(deleted.sample, vec!["u/a/b/orphan.mp4"]);
    assert!(!dir.path().join("blobs/bkt/u/a/b/orphan.mp4").exists());
    assert!(dir.path().join("blobs/bkt/u/a/b/v1.mp4").exists());
    assert!(dir.path().join("blobs/bkt/profile-pictures/x.png").exists());
}

#[tokio::test]
async fn missing_local_bucket_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let blobs = FilesystemBlobStore::new(dir.path().join("empty"), 100)
        .await
        .unwrap();
    let collector = GarbageCollector::new(
        test_config(),
        Arc::new(documents()),
        Some(Arc::new(blobs) as Arc<dyn BlobStore>),
    );

    let aborted = collector.run(APPLY_WITH_BLOBS).await.unwrap_err();
    assert!(aborted.to_string().contains("not found"));
    assert_eq!(aborted.report.scanned.courses, Some(1));
}
