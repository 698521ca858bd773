use janitor::{JanitorError, KindCounts};

use crate::fixtures::{
    APPLY, APPLY_WITH_BLOBS, DRY_RUN, DRY_RUN_WITH_BLOBS, TestStores, media_url, test_config,
};

/// A snapshot with orphans of every kind, including chained ones.
fn messy_stores() -> TestStores {
    let stores = TestStores::new();
    stores.course("c1").course("c2");
    for i in 0..40 {
        let course = if i % 4 == 0 { "gone" } else { "c1" };
        stores.assignment(&format!("a{i:02}"), course);
    }
    for i in 0..60 {
        let assignment = format!("a{:02}", i % 50);
        let key = format!("u/{i}/video/v.mp4");
        stores.submission_with_media(&format!("s{i:02}"), &assignment, &media_url(&key), None);
        stores.blob(&key);
        stores.blob(&format!("u/{i}/video/stale.mp4"));
    }
    for i in 0..70 {
        let video = format!("s{:02}", i % 80);
        if i % 3 == 0 {
            stores.legacy_peer_response(&format!("r{i:02}"), &video);
        } else {
            stores.peer_response(&format!("p{i:02}"), &video);
        }
    }
    stores.blob("profile-pictures/u1.png").blob("system/logo.svg");
    stores
}

fn total(counts: &Option<KindCounts>) -> usize {
    counts.as_ref().map_or(0, KindCounts::total)
}

#[tokio::test]
async fn analysis_is_deterministic() {
    let stores = messy_stores();
    let first = stores.run(DRY_RUN_WITH_BLOBS).await;
    let second = stores.run(DRY_RUN_WITH_BLOBS).await;

    assert_eq!(first.scanned, second.scanned);
    assert_eq!(first.orphaned, second.orphaned);
    assert_eq!(first.unresolved_urls, second.unresolved_urls);
    assert!(total(&first.orphaned) > 0);
}

#[tokio::test]
async fn dry_run_never_calls_a_delete_endpoint() {
    let stores = messy_stores();
    let report = stores.run(DRY_RUN_WITH_BLOBS).await;

    assert!(total(&report.orphaned) > 0);
    assert!(stores.documents.delete_calls().is_empty());
    assert!(stores.blobs.delete_calls().is_empty());
}

#[tokio::test]
async fn second_apply_run_on_a_converged_store_deletes_nothing() {
    let stores = messy_stores();
    // Chained orphans surface one level per pass.
    let mut passes = 0;
    loop {
        let report = stores.run(APPLY_WITH_BLOBS).await;
        passes += 1;
        assert!(report.errors.is_empty());
        if total(&report.orphaned) == 0 {
            assert_eq!(total(&report.deleted), 0);
            break;
        }
        assert!(passes < 5, "store did not converge");
    }

    let calls_before = stores.documents.delete_calls().len() + stores.blobs.delete_calls().len();
    let report = stores.run(APPLY_WITH_BLOBS).await;
    assert_eq!(total(&report.orphaned), 0);
    assert_eq!(total(&report.deleted), 0);
    let calls_after = stores.documents.delete_calls().len() + stores.blobs.delete_calls().len();
    assert_eq!(calls_before, calls_after);
}

#[tokio::test]
async fn transitive_orphans_are_cleaned_on_the_next_pass() {
    let stores = TestStores::new();
    stores
        .assignment("a1", "c404")
        .submission("s1", "a1")
        .peer_response("p1", "s1");

    let first = stores.run(APPLY).await;
    let orphaned = first.orphaned.unwrap();
    assert_eq!(orphaned.assignments.count, 1);
    assert_eq!(orphaned.submissions.count, 0);
    assert_eq!(orphaned.peer_responses.count, 0);

    let second = stores.run(APPLY).await;
    assert_eq!(second.orphaned.unwrap().submissions.sample, vec!["s1"]);

    let third = stores.run(APPLY).await;
    assert_eq!(third.orphaned.unwrap().peer_responses.sample, vec!["p1"]);

    let fourth = stores.run(APPLY).await;
    assert_eq!(total(&fourth.orphaned), 0);
    assert!(stores.documents.documents("peer-responses").is_empty());
}

#[tokio::test]
async fn protected_keys_are_never_candidates() {
    let stores = messy_stores();
    for i in 0..20 {
        stores.blob(&format!("profile-pictures/user-{i}.png"));
        stores.blob(&format!("system/assets/{i}.css"));
    }

    let report = stores.run(DRY_RUN_WITH_BLOBS).await;
    let blobs = report.orphaned.unwrap().blob_objects.unwrap();
    assert!(blobs.count > 0);

    stores.run(APPLY_WITH_BLOBS).await;
    for call in stores.blobs.delete_calls() {
        assert!(
            call.keys
                .iter()
                .all(|k| !k.starts_with("profile-pictures/") && !k.starts_with("system/"))
        );
    }
    let kept = stores.blobs.keys("bkt");
    assert!(kept.contains(&"system/logo.svg".to_string()));
    assert_eq!(
        kept.iter()
            .filter(|k| k.starts_with("profile-pictures/"))
            .count(),
        21
    );
}

#[tokio::test]
async fn extra_protected_prefix_from_config() {
    let stores = TestStores::new();
    stores.blob("exports/2024.csv").blob("u/a/b/stale.mp4");

    let mut config = test_config();
    config.protected_prefixes.push("exports/".into());
    let report = stores
        .collector_with(config)
        .run(DRY_RUN_WITH_BLOBS)
        .await
        .unwrap();
    assert_eq!(
        report.orphaned.unwrap().blob_objects.unwrap().sample,
        vec!["u/a/b/stale.mp4"]
    );
}

#[tokio::test]
async fn every_delete_call_respects_the_store_caps() {
    let stores = TestStores::new();
    for i in 0..130 {
        stores.assignment(&format!("a{i:03}"), "gone");
    }
    for i in 0..2600 {
        stores.blob(&format!("u/{i}/x/stale.mp4"));
    }

    let report = stores.run(APPLY_WITH_BLOBS).await;
    assert!(report.errors.is_empty());

    let deleted = report.deleted.unwrap();
    assert_eq!(deleted.assignments.count, 130);
    assert_eq!(deleted.blob_objects.unwrap().count, 2600);
    assert!(stores.documents.delete_calls().iter().all(|c| c.keys.len() <= 25));
    assert!(stores.blobs.delete_calls().iter().all(|c| c.keys.len() <= 1000));
    assert_eq!(stores.blobs.delete_calls().len(), 3);
}

#[tokio::test]
async fn smaller_configured_caps_are_honoured() {
    let stores = TestStores::new();
    for i in 0..12 {
        stores.assignment(&format!("a{i:02}"), "gone");
    }
    let mut config = test_config();
    config.batch_caps.document = 5;

    stores.collector_with(config).run(APPLY).await.unwrap();
    let sizes: Vec<usize> = stores
        .documents
        .delete_calls()
        .iter()
        .map(|c| c.keys.len())
        .collect();
    assert_eq!(sizes, vec![5, 5, 2]);
}

mod fatal_scan {
    use super::*;

    #[tokio::test]
    async fn failing_collection_aborts_before_any_delete() {
        let stores = messy_stores();
        stores.documents.fail_scans("assignments", "ProvisionedThroughputExceeded");

        let aborted = stores.run_aborted(APPLY_WITH_BLOBS).await;

        assert!(matches!(aborted.error, JanitorError::Scan(_)));
        assert!(aborted.to_string().contains("ProvisionedThroughputExceeded"));
        assert_eq!(aborted.report.scanned.courses, Some(2));
        assert_eq!(aborted.report.scanned.assignments, None);
        assert!(aborted.report.orphaned.is_none());
        assert!(aborted.report.deleted.is_none());
        assert_eq!(aborted.report.errors.len(), 1);
        assert!(stores.documents.delete_calls().is_empty());
        assert!(stores.blobs.delete_calls().is_empty());
    }

    #[tokio::test]
    async fn failed_page_is_retried_before_aborting() {
        let stores = TestStores::new();
        stores.documents.fail_scans("courses", "timeout");

        stores.run_aborted(DRY_RUN).await;
        let course_reads = stores
            .documents
            .scan_calls()
            .iter()
            .filter(|t| *t == "courses")
            .count();
        // One retry configured by the fixture.
        assert_eq!(course_reads, 2);
    }

    #[tokio::test]
    async fn failing_bucket_listing_is_fatal_too() {
        let stores = messy_stores();
        stores.blobs.fail_listing("bkt", "SlowDown");

        let aborted = stores.run_aborted(APPLY_WITH_BLOBS).await;
        assert_eq!(aborted.report.scanned.submissions, Some(60));
        assert_eq!(aborted.report.scanned.blob_objects, None);
        assert!(stores.documents.delete_calls().is_empty());
    }

    #[tokio::test]
    async fn every_failed_read_is_listed() {
        let stores = TestStores::new();
        stores.documents.fail_scans("courses", "down");
        stores.documents.fail_scans("submissions", "down");

        let aborted = stores.run_aborted(DRY_RUN).await;
        assert_eq!(aborted.report.errors.len(), 2);
    }

    #[tokio::test]
    async fn mistyped_table_aborts_instead_of_reading_as_empty() {
        let stores = messy_stores();
        let mut config = test_config();
        config.tables.courses = "coursse".into();

        let aborted = stores
            .collector_with(config)
            .run(APPLY_WITH_BLOBS)
            .await
            .unwrap_err();

        assert!(matches!(aborted.error, JanitorError::Scan(_)));
        assert!(aborted.to_string().contains("coursse"));
        assert_eq!(aborted.report.scanned.courses, None);
        assert!(aborted.report.orphaned.is_none());
        assert!(stores.documents.delete_calls().is_empty());
        assert!(stores.blobs.delete_calls().is_empty());
        assert_eq!(stores.ids("assignments", "assignmentId").len(), 40);
    }

    #[tokio::test]
    async fn malformed_record_is_a_scan_failure() {
        let stores = TestStores::new();
        stores
            .documents
            .insert("courses", serde_json::json!({ "title": "no id" }));

        let aborted = stores.run_aborted(APPLY).await;
        assert!(matches!(aborted.error, JanitorError::Scan(_)));
        assert!(stores.documents.delete_calls().is_empty());
    }
}
