use janitor::{KindSummary, RunMode};

use crate::fixtures::{APPLY, APPLY_WITH_BLOBS, DRY_RUN, DRY_RUN_WITH_BLOBS, TestStores, media_url};

mod orphaned_records {
    use super::*;

    #[tokio::test]
    async fn assignment_with_missing_course() {
        let stores = TestStores::new();
        stores.course("c1").assignment("a1", "c1").assignment("a2", "c404");

        let report = stores.run(APPLY).await;

        let orphaned = report.orphaned.unwrap();
        assert_eq!(
            orphaned.assignments,
            KindSummary {
                count: 1,
                sample: vec!["a2".into()],
            }
        );
        assert_eq!(report.deleted.unwrap().assignments.count, 1);
        assert_eq!(stores.ids("assignments", "assignmentId"), vec!["a1"]);
    }

    #[tokio::test]
    async fn submission_with_missing_assignment() {
        let stores = TestStores::new();
        stores
            .course("c1")
            .assignment("a1", "c1")
            .submission("s1", "a1")
            .submission("s2", "a404");

        let report = stores.run(APPLY).await;

        assert_eq!(report.orphaned.unwrap().submissions.sample, vec!["s2"]);
        assert!(report.errors.is_empty());
        assert_eq!(stores.ids("submissions", "submissionId"), vec!["s1"]);
    }

    #[tokio::test]
    async fn peer_response_with_missing_submission() {
        let stores = TestStores::new();
        stores
            .course("c1")
            .assignment("a1", "c1")
            .submission("s1", "a1")
            .peer_response("p1", "s1")
            .legacy_peer_response("r1", "s404");

        let report = stores.run(APPLY).await;

        assert_eq!(report.orphaned.unwrap().peer_responses.sample, vec!["r1"]);
        assert_eq!(report.deleted.unwrap().peer_responses.count, 1);
        assert_eq!(stores.ids("peer-responses", "id"), vec!["p1"]);
        assert!(stores.ids("peer-responses", "responseId").is_empty());
    }
}

mod blob_reclamation {
    use super::*;

    #[tokio::test]
    async fn referenced_and_protected_keys_survive() {
        let stores = TestStores::new();
        stores
            .course("c1")
            .assignment("a1", "c1")
            .submission_with_media("s1", "a1", &media_url("u/a/b/v1.mp4"), None)
            .blob("u/a/b/v1.mp4")
            .blob("u/a/b/orphan.mp4")
            .blob("profile-pictures/x.png");

        let report = stores.run(DRY_RUN_WITH_BLOBS).await;
        assert_eq!(
            report.orphaned.unwrap().blob_objects,
            Some(KindSummary {
                count: 1,
                sample: vec!["u/a/b/orphan.mp4".into()],
            })
        );

        stores.run(APPLY_WITH_BLOBS).await;
        assert_eq!(
            stores.blobs.keys("bkt"),
            vec!["profile-pictures/x.png", "system/.keep", "u/a/b/v1.mp4"]
        );
    }

    #[tokio::test]
    async fn thumbnails_and_path_style_urls_count_as_references() {
        let stores = TestStores::new();
        stores
            .course("c1")
            .assignment("a1", "c1")
            .submission_with_media(
                "s1",
                "a1",
                "https://s3.us-east-1.amazonaws.com/bkt/u/a/b/v1.mp4",
                Some("https://bkt.example.com/u/a/b/t1.jpg?X-Amz-Expires=900"),
            )
            .blob("u/a/b/v1.mp4")
            .blob("u/a/b/t1.jpg");

        let report = stores.run(DRY_RUN_WITH_BLOBS).await;
        assert_eq!(report.orphaned.unwrap().blob_objects.unwrap().count, 0);
    }

    #[tokio::test]
    async fn keys_with_spaces_and_accents_stay_referenced() {
        let stores = TestStores::new();
        stores
            .course("c1")
            .assignment("a1", "c1")
            .submission_with_media(
                "s1",
                "a1",
                "https://bkt.example.com/u/a/b/my clip.mp4",
                Some("https://bkt.example.com/u/a/b/aper%C3%A7u.jpg"),
            )
            .blob("u/a/b/my clip.mp4")
            .blob("u/a/b/aperçu.jpg")
            .blob("u/a/b/other clip.mp4");

        let report = stores.run(APPLY_WITH_BLOBS).await;
        assert_eq!(
            report.orphaned.unwrap().blob_objects.unwrap().sample,
            vec!["u/a/b/other clip.mp4"]
        );
        assert_eq!(
            stores.blobs.keys("bkt"),
            vec!["system/.keep", "u/a/b/aperçu.jpg", "u/a/b/my clip.mp4"]
        );
    }

    #[tokio::test]
    async fn malformed_urls_resolve_through_the_fallback() {
        let stores = TestStores::new();
        stores
            .course("c1")
            .assignment("a1", "c1")
            .submission_with_media("s1", "a1", "bkt.example.com/u/a/b/v1.mp4", None)
            .submission_with_media("s2", "a1", "::garbage::", None)
            .blob("u/a/b/v1.mp4");

        let report = stores.run(DRY_RUN_WITH_BLOBS).await;
        assert_eq!(report.orphaned.unwrap().blob_objects.unwrap().count, 0);
        assert_eq!(report.unresolved_urls.count, 1);
        assert_eq!(report.unresolved_urls.sample, vec!["s2: ::garbage::"]);
    }

    #[tokio::test]
    async fn blobs_are_ignored_unless_requested() {
        let stores = TestStores::new();
        stores.blob("u/a/b/orphan.mp4");

        let report = stores.run(APPLY).await;
        assert_eq!(report.scanned.blob_objects, None);
        assert!(report.orphaned.unwrap().blob_objects.is_none());
        assert!(stores.blobs.list_calls().is_empty());
        assert!(stores.blobs.delete_calls().is_empty());
        assert!(stores.blobs.keys("bkt").contains(&"u/a/b/orphan.mp4".to_string()));
    }
}

mod failing_batches {
    use super::*;

    #[tokio::test]
    async fn failed_first_batch_is_reported_and_the_run_completes() {
        let stores = TestStores::new();
        stores.course("c1").assignment("a1", "c1");
        for i in 0..35 {
            stores.submission(&format!("s{i:02}"), "a404");
        }
        stores.documents.fail_delete_call("submissions", 0);

        let report = stores.run(APPLY).await;

        assert_eq!(report.mode, RunMode::Apply);
        assert_eq!(report.orphaned.as_ref().unwrap().submissions.count, 35);
        assert_eq!(report.deleted.as_ref().unwrap().submissions.count, 10);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("submissions"));
        assert!(report.has_errors());

        let sizes: Vec<usize> = stores
            .documents
            .delete_calls()
            .iter()
            .filter(|c| c.target == "submissions")
            .map(|c| c.keys.len())
            .collect();
        assert_eq!(sizes, vec![25, 10]);
        assert_eq!(stores.ids("submissions", "submissionId").len(), 25);
    }

    #[tokio::test]
    async fn rejected_blobs_are_not_counted() {
        let stores = TestStores::new();
        stores.blob("u/a/b/one.mp4").blob("u/a/b/two.mp4");
        stores.blobs.reject_key("u/a/b/two.mp4");

        let report = stores.run(APPLY_WITH_BLOBS).await;
        let deleted = report.deleted.unwrap();
        assert_eq!(deleted.blob_objects.unwrap().count, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("AccessDenied"));
    }
}

mod mixed_peer_response_keys {
    use super::*;

    #[tokio::test]
    async fn each_batch_uses_its_first_record_key() {
        let stores = TestStores::new();
        for i in 0..25 {
            stores.peer_response(&format!("p{i:02}"), "s404");
        }
        for i in 0..10 {
            stores.legacy_peer_response(&format!("r{i:02}"), "s404");
        }

        let report = stores.run(APPLY).await;

        let calls = stores.documents.delete_calls();
        let attributes: Vec<_> = calls
            .iter()
            .map(|c| c.key_attribute.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(attributes, vec!["id", "responseId"]);
        assert_eq!(report.deleted.unwrap().peer_responses.count, 35);
        assert!(report.errors.is_empty());
        assert!(stores.documents.documents("peer-responses").is_empty());
    }

    #[tokio::test]
    async fn no_record_is_skipped_when_keys_interleave() {
        let stores = TestStores::new();
        for i in 0..30 {
            if i % 2 == 0 {
                stores.peer_response(&format!("p{i:02}"), "s404");
            } else {
                stores.legacy_peer_response(&format!("r{i:02}"), "s404");
            }
        }

        let report = stores.run(APPLY).await;

        assert_eq!(report.deleted.unwrap().peer_responses.count, 30);
        assert!(stores.documents.documents("peer-responses").is_empty());
        assert!(
            stores
                .documents
                .delete_calls()
                .iter()
                .all(|c| c.keys.len() <= 25)
        );
    }
}

#[tokio::test]
async fn dry_run_report_has_no_deleted_section() {
    let stores = TestStores::new();
    stores.course("c1").assignment("a2", "c404");

    let report = stores.run(DRY_RUN).await;
    assert_eq!(report.mode, RunMode::DryRun);
    assert!(report.deleted.is_none());
    assert_eq!(report.orphaned.unwrap().assignments.count, 1);
    assert_eq!(stores.ids("assignments", "assignmentId"), vec!["a2"]);
}
