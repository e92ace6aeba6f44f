//! End-to-end runs against the in-memory remote and review surface.

use std::sync::Arc;

use catalog_sync::testing::{MemoryRemote, MockReviewSurface, StaticSource};
use catalog_sync::{
    snapshot_path, PublicationError, PublicationTarget, PublisherConfig, Record, RepositoryLoadError,
    ReviewConfig, ReviewOutcome, ReviewWorkflow, RunError, RunOutcome, RunReport, Snapshot,
    SourceRegistry, ThresholdConfig, VersionHistory, VersionRecord, VERSIONS_PATH,
};
use chrono::{DateTime, TimeZone, Utc};

const DATA_TYPE: &str = "timetable";
const REVIEW_BRANCH: &str = "timetable_1690000000000";

fn course(title: &str, instructor: &str) -> Record {
    Record::new().with("Title", title).with("Instr", instructor)
}

fn started_at() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_690_000_000_000).unwrap()
}

/// Publish `snapshot` on `branch` the way a previous run would have.
fn seed(remote: &MemoryRemote, branch: &str, snapshot: &Snapshot) {
    let bytes = snapshot.to_canonical_json().unwrap();
    let mut history = VersionHistory::default();
    history.record(
        DATA_TYPE,
        VersionRecord {
            timestamp: Utc.with_ymd_and_hms(2023, 7, 1, 0, 0, 0).unwrap(),
            content_hash: snapshot.content_hash().unwrap(),
            changed_ids: vec![],
        },
    );

    remote.seed_file(branch, &snapshot_path(DATA_TYPE), bytes);
    remote.seed_file(branch, VERSIONS_PATH, history.to_json().unwrap());
}

struct Harness {
    remote: MemoryRemote,
    source: StaticSource,
    surface: MockReviewSurface,
}

impl Harness {
    fn new(next: Snapshot) -> Self {
        Self {
            remote: MemoryRemote::new(),
            source: StaticSource::new(next),
            surface: MockReviewSurface::new(),
        }
    }

    fn pipeline(
        &self,
        thresholds: ThresholdConfig,
    ) -> catalog_sync::Pipeline<MemoryRemote, MockReviewSurface> {
        let sources = SourceRegistry::new()
            .with_source(DATA_TYPE, Arc::new(self.source.clone()))
            .unwrap();

        catalog_sync::Pipeline::new(
            sources,
            self.remote.clone(),
            ReviewWorkflow::new(
                self.surface.clone(),
                ReviewConfig::new("main").with_reviewers(["registrar"]),
            ),
            thresholds,
            PublisherConfig::new("main"),
        )
    }

    async fn run(&self, thresholds: ThresholdConfig) -> Result<RunOutcome, RunError> {
        self.pipeline(thresholds).run_at(DATA_TYPE, started_at()).await
    }
}

fn published(outcome: RunOutcome) -> RunReport {
    match outcome {
        RunOutcome::Published(report) => report,
        other => panic!("expected a publication, got {other:?}"),
    }
}

fn stored_history(remote: &MemoryRemote, branch: &str) -> VersionHistory {
    VersionHistory::from_json(&remote.file(branch, VERSIONS_PATH).unwrap()).unwrap()
}

#[tokio::test]
async fn test_large_change_goes_to_review_branch() {
    let current = Snapshot::new().with("K1", course("Calc", "X"));
    let next = Snapshot::new().with("K1", course("Calc", "Y"));
    let harness = Harness::new(next.clone());
    seed(&harness.remote, "main", &current);
    let main_before = harness.remote.head("main");

    let report = published(
        harness
            .run(ThresholdConfig::new().with_field_threshold("Instr", 0.5))
            .await
            .unwrap(),
    );

    assert_eq!(report.target, PublicationTarget::Review(REVIEW_BRANCH.to_string()));
    assert_eq!(report.changed, 1);
    assert_eq!(report.approvals_needed.len(), 1);
    assert_eq!(report.review, Some(ReviewOutcome::Created { number: 1 }));

    // Canonical branch untouched, review branch holds the new snapshot
    assert_eq!(harness.remote.head("main"), main_before);
    assert_eq!(
        harness.remote.file(REVIEW_BRANCH, &snapshot_path(DATA_TYPE)),
        Some(next.to_canonical_json().unwrap())
    );

    let history = stored_history(&harness.remote, REVIEW_BRANCH);
    assert_eq!(history.current_hash(DATA_TYPE), Some(report.content_hash.as_str()));
    assert_eq!(
        history.current_for(DATA_TYPE).unwrap().changed_ids,
        vec!["K1".to_string()]
    );
    assert_eq!(
        history.archive_for(DATA_TYPE)[0].content_hash,
        current.content_hash().unwrap()
    );

    let log = harness.remote.log(REVIEW_BRANCH);
    assert!(log.last().unwrap().starts_with("update in timetable ("));

    let created = harness.surface.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].title, "Unconfirmed Changes (timetable_1690000000000)");
    assert_eq!(created[0].head, REVIEW_BRANCH);
    assert_eq!(created[0].base, "main");
    assert_eq!(created[0].reviewers, vec!["registrar"]);
    assert!(created[0].body.contains("`Instr` has been changed in 100% of entries (> 50%)"));
}

#[tokio::test]
async fn test_change_within_threshold_publishes_to_canonical() {
    let current = Snapshot::new().with("K1", course("Calc", "X"));
    let next = Snapshot::new().with("K1", course("Calc", "Y"));
    let harness = Harness::new(next.clone());
    seed(&harness.remote, "main", &current);

    let thresholds = ThresholdConfig::new()
        .with_field_threshold("Instr", 1.0)
        .with_whitelisted("Instr");
    let report = published(harness.run(thresholds).await.unwrap());

    assert_eq!(report.target, PublicationTarget::Canonical("main".to_string()));
    assert!(report.approvals_needed.is_empty());
    assert_eq!(report.review, Some(ReviewOutcome::NotRequired));
    assert!(harness.surface.calls().is_empty());
    assert_eq!(
        harness.remote.file("main", &snapshot_path(DATA_TYPE)),
        Some(next.to_canonical_json().unwrap())
    );
    assert_eq!(harness.remote.branches(), vec!["main"]);
}

#[tokio::test]
async fn test_pending_branch_is_reused_and_commented() {
    let current = Snapshot::new().with("K1", course("Calc", "X"));
    let pending = Snapshot::new().with("K1", course("Calc", "Y"));
    let next = Snapshot::new().with("K1", course("Calc", "Z"));

    let harness = Harness::new(next.clone());
    seed(&harness.remote, "main", &current);
    harness.remote.create_remote_branch(REVIEW_BRANCH, "main");
    seed(&harness.remote, REVIEW_BRANCH, &pending);
    let surface = harness.surface.clone().with_open_request(7, REVIEW_BRANCH);

    let later = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    let report = published(
        harness
            .pipeline(ThresholdConfig::new())
            .run_at(DATA_TYPE, later)
            .await
            .unwrap(),
    );

    assert_eq!(report.target, PublicationTarget::Pending(REVIEW_BRANCH.to_string()));
    assert_eq!(report.review, Some(ReviewOutcome::Commented { number: 7 }));
    assert!(surface.created().is_empty());

    let comments = surface.comments();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].0, 7);
    assert!(comments[0].1.contains("`Instr` has been changed in 100% of entries"));

    assert_eq!(
        harness.remote.file(REVIEW_BRANCH, &snapshot_path(DATA_TYPE)),
        Some(next.to_canonical_json().unwrap())
    );
    assert!(!harness.remote.branches().contains(&"timetable_1700000000000".to_string()));
}

#[tokio::test]
async fn test_pending_branch_is_sticky_for_small_changes() {
    let current = Snapshot::new().with("K1", course("Calc", "X"));
    let pending = Snapshot::new().with("K1", course("Calc", "Y"));
    let next = Snapshot::new().with("K1", course("Calc", "Z"));

    let harness = Harness::new(next);
    seed(&harness.remote, "main", &current);
    harness.remote.create_remote_branch(REVIEW_BRANCH, "main");
    seed(&harness.remote, REVIEW_BRANCH, &pending);
    let main_before = harness.remote.head("main");

    let permissive = ThresholdConfig::new().with_whitelisted("Instr");
    let report = published(harness.run(permissive).await.unwrap());

    assert!(report.approvals_needed.is_empty());
    assert_eq!(report.target, PublicationTarget::Pending(REVIEW_BRANCH.to_string()));
    assert_eq!(harness.remote.head("main"), main_before);
}

#[tokio::test]
async fn test_open_request_is_not_commented_without_new_reasons() {
    let current = Snapshot::new().with("K1", course("Calc", "X"));
    let pending = Snapshot::new().with("K1", course("Calc", "Y"));
    let next = Snapshot::new().with("K1", course("Calc", "Z"));

    let harness = Harness::new(next);
    seed(&harness.remote, "main", &current);
    harness.remote.create_remote_branch(REVIEW_BRANCH, "main");
    seed(&harness.remote, REVIEW_BRANCH, &pending);
    let surface = harness.surface.clone().with_open_request(7, REVIEW_BRANCH);

    let permissive = ThresholdConfig::new().with_whitelisted("Instr");
    let report = published(harness.run(permissive).await.unwrap());

    assert_eq!(report.target, PublicationTarget::Pending(REVIEW_BRANCH.to_string()));
    assert_eq!(report.review, Some(ReviewOutcome::AlreadyOpen { number: 7 }));
    assert!(surface.comments().is_empty());
    assert!(surface.created().is_empty());
}

#[tokio::test]
async fn test_closed_review_branch_is_not_reused_for_small_changes() {
    let closed_branch = "timetable_1680000000000";
    let current = Snapshot::new().with("K1", course("Calc", "X"));
    let stale = Snapshot::new().with("K1", course("Calc", "Y"));
    let next = Snapshot::new().with("K1", course("Calc", "Z"));

    // Squash-merged: the request is closed but git does not see the branch as merged
    let harness = Harness::new(next.clone());
    seed(&harness.remote, "main", &current);
    harness.remote.create_remote_branch(closed_branch, "main");
    seed(&harness.remote, closed_branch, &stale);
    let surface = harness.surface.clone().with_closed_request(3, closed_branch);
    let stale_head = harness.remote.head(closed_branch);

    let permissive = ThresholdConfig::new().with_whitelisted("Instr");
    let report = published(harness.run(permissive).await.unwrap());

    assert_eq!(report.target, PublicationTarget::Canonical("main".to_string()));
    assert_eq!(report.review, Some(ReviewOutcome::NotRequired));
    assert_eq!(
        harness.remote.file("main", &snapshot_path(DATA_TYPE)),
        Some(next.to_canonical_json().unwrap())
    );
    assert_eq!(harness.remote.head(closed_branch), stale_head);
    assert!(surface.created().is_empty());
}

#[tokio::test]
async fn test_closed_review_branch_gets_a_fresh_branch() {
    let closed_branch = "timetable_1680000000000";
    let current = Snapshot::new().with("K1", course("Calc", "X"));
    let stale = Snapshot::new().with("K1", course("Calc", "Y"));
    let next = Snapshot::new().with("K1", course("Calc", "Z"));

    let harness = Harness::new(next);
    seed(&harness.remote, "main", &current);
    harness.remote.create_remote_branch(closed_branch, "main");
    seed(&harness.remote, closed_branch, &stale);
    let surface = harness.surface.clone().with_closed_request(3, closed_branch);

    let report = published(harness.run(ThresholdConfig::new()).await.unwrap());

    assert_eq!(report.target, PublicationTarget::Review(REVIEW_BRANCH.to_string()));
    assert_eq!(report.review, Some(ReviewOutcome::Created { number: 4 }));
    assert!(surface.comments().is_empty());

    let created = surface.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].head, REVIEW_BRANCH);
}

#[tokio::test]
async fn test_pending_branch_is_kept_when_closed_requests_cannot_be_listed() {
    let current = Snapshot::new().with("K1", course("Calc", "X"));
    let pending = Snapshot::new().with("K1", course("Calc", "Y"));
    let next = Snapshot::new().with("K1", course("Calc", "Z"));

    let harness = Harness::new(next);
    seed(&harness.remote, "main", &current);
    harness.remote.create_remote_branch(REVIEW_BRANCH, "main");
    seed(&harness.remote, REVIEW_BRANCH, &pending);
    harness.surface.fail_with("service unavailable");

    let report = published(harness.run(ThresholdConfig::new()).await.unwrap());

    assert_eq!(report.target, PublicationTarget::Pending(REVIEW_BRANCH.to_string()));
    assert_eq!(report.review, None);
}

#[tokio::test]
async fn test_merged_branch_is_not_reused() {
    let current = Snapshot::new().with("K1", course("Calc", "X"));
    let next = Snapshot::new().with("K1", course("Calc", "Y"));

    let harness = Harness::new(next);
    seed(&harness.remote, "main", &current);
    harness
        .remote
        .create_remote_branch("timetable_1600000000000", "main");
    harness.remote.mark_merged("timetable_1600000000000");

    let report = published(harness.run(ThresholdConfig::new()).await.unwrap());

    assert_eq!(report.target, PublicationTarget::Review(REVIEW_BRANCH.to_string()));
}

#[tokio::test]
async fn test_identical_snapshot_short_circuits() {
    let current = Snapshot::new().with("K1", course("Calc", "X"));
    let harness = Harness::new(current.clone());
    seed(&harness.remote, "main", &current);
    let main_before = harness.remote.head("main");

    let outcome = harness.run(ThresholdConfig::new()).await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Unchanged {
            data_type: DATA_TYPE.to_string(),
            content_hash: current.content_hash().unwrap(),
        }
    );
    assert_eq!(harness.source.fetch_count(), 1);
    assert_eq!(harness.remote.push_count(), 0);
    assert_eq!(harness.remote.head("main"), main_before);
    assert!(harness.surface.calls().is_empty());
}

#[tokio::test]
async fn test_identical_bytes_without_history_short_circuits() {
    let current = Snapshot::new().with("K1", course("Calc", "X"));
    let harness = Harness::new(current.clone());
    harness.remote.seed_file(
        "main",
        &snapshot_path(DATA_TYPE),
        current.to_canonical_json().unwrap(),
    );

    let outcome = harness.run(ThresholdConfig::new()).await.unwrap();

    assert!(!outcome.is_published());
    assert_eq!(harness.remote.push_count(), 0);
}

#[tokio::test]
async fn test_first_publication_to_empty_remote() {
    let next = Snapshot::new()
        .with("K1", course("Calc", "X"))
        .with("K2", course("Algebra", "W"));
    let harness = Harness::new(next.clone());

    let report = published(
        harness
            .run(ThresholdConfig::new().with_addition_threshold(1.0))
            .await
            .unwrap(),
    );

    assert_eq!(report.target, PublicationTarget::Canonical("main".to_string()));
    assert_eq!(report.added, 2);

    let history = stored_history(&harness.remote, "main");
    assert_eq!(history.current_hash(DATA_TYPE), Some(report.content_hash.as_str()));
    assert!(history.archive_for(DATA_TYPE).is_empty());
}

#[tokio::test]
async fn test_push_rejection_is_retryable_and_skips_review() {
    let current = Snapshot::new().with("K1", course("Calc", "X"));
    let next = Snapshot::new().with("K1", course("Calc", "Y"));
    let harness = Harness::new(next);
    seed(&harness.remote, "main", &current);
    harness.remote.reject_next_push();

    let err = harness.run(ThresholdConfig::new()).await.unwrap_err();

    assert!(matches!(
        err,
        RunError::Publication(PublicationError::PushRejected { .. })
    ));
    assert!(err.is_retryable());
    assert_eq!(harness.remote.push_count(), 0);
    assert!(harness.surface.calls().is_empty());
}

#[tokio::test]
async fn test_review_failure_does_not_fail_the_run() {
    let current = Snapshot::new().with("K1", course("Calc", "X"));
    let next = Snapshot::new().with("K1", course("Calc", "Y"));
    let harness = Harness::new(next);
    seed(&harness.remote, "main", &current);
    harness.surface.fail_with("service unavailable");

    let report = published(harness.run(ThresholdConfig::new()).await.unwrap());

    assert_eq!(report.review, None);
    assert_eq!(harness.remote.pushes(), vec![REVIEW_BRANCH]);
}

#[tokio::test]
async fn test_acquisition_failure_leaves_remote_untouched() {
    let current = Snapshot::new().with("K1", course("Calc", "X"));
    let harness = Harness::new(current.clone());
    seed(&harness.remote, "main", &current);
    harness.source.fail_with("timetable table missing");

    let err = harness.run(ThresholdConfig::new()).await.unwrap_err();

    assert!(matches!(err, RunError::Acquisition(_)));
    assert!(!err.is_retryable());
    assert_eq!(harness.remote.connection_count(), 0);
    assert_eq!(harness.remote.push_count(), 0);
}

#[tokio::test]
async fn test_unavailable_remote_is_a_load_error() {
    let harness = Harness::new(Snapshot::new().with("K1", course("Calc", "X")));
    harness.remote.set_unavailable(true);

    let err = harness.run(ThresholdConfig::new()).await.unwrap_err();

    assert!(matches!(err, RunError::RepositoryLoad(RepositoryLoadError::Store(_))));
}

#[tokio::test]
async fn test_corrupt_published_snapshot_is_a_load_error() {
    let harness = Harness::new(Snapshot::new().with("K1", course("Calc", "X")));
    harness
        .remote
        .seed_file("main", &snapshot_path(DATA_TYPE), "[1, 2]");

    let err = harness.run(ThresholdConfig::new()).await.unwrap_err();

    assert!(matches!(
        err,
        RunError::RepositoryLoad(RepositoryLoadError::CorruptSnapshot { .. })
    ));
    assert_eq!(harness.remote.push_count(), 0);
}

#[tokio::test]
async fn test_unknown_data_type_is_rejected() {
    let harness = Harness::new(Snapshot::new());

    let err = harness
        .pipeline(ThresholdConfig::new())
        .run("prereqs")
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::UnknownDataType(name) if name == "prereqs"));
    assert_eq!(harness.source.fetch_count(), 0);
}

#[tokio::test]
async fn test_second_run_continues_on_review_branch() {
    let current = Snapshot::new().with("K1", course("Calc", "X"));
    let harness = Harness::new(Snapshot::new().with("K1", course("Calc", "Y")));
    seed(&harness.remote, "main", &current);

    let first = published(harness.run(ThresholdConfig::new()).await.unwrap());
    assert_eq!(first.review, Some(ReviewOutcome::Created { number: 1 }));

    harness
        .source
        .set_snapshot(Snapshot::new().with("K1", course("Calc", "Z")));
    let later = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    let second = published(
        harness
            .pipeline(ThresholdConfig::new())
            .run_at(DATA_TYPE, later)
            .await
            .unwrap(),
    );

    assert_eq!(second.target, PublicationTarget::Pending(REVIEW_BRANCH.to_string()));
    assert_eq!(second.review, Some(ReviewOutcome::Commented { number: 1 }));
    assert_eq!(harness.surface.created().len(), 1);

    let history = stored_history(&harness.remote, REVIEW_BRANCH);
    assert_eq!(history.archive_for(DATA_TYPE).len(), 2);
}
