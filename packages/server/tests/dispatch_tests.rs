//! Runs triggered over HTTP against the in-memory remote.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use catalog_sync::testing::{MemoryRemote, MockReviewSurface, StaticSource};
use catalog_sync::{
    snapshot_path, Pipeline, PublisherConfig, Record, ReviewConfig, ReviewWorkflow, Snapshot,
    SourceRegistry, ThresholdConfig,
};
use serde_json::json;
use server_core::kernel::RunDispatcher;
use server_core::server::build_app;

use common::{post_json, send};

fn course(title: &str) -> Record {
    Record::new().with("Title", title).with("Instr", "X")
}

fn dispatcher(
    remote: &MemoryRemote,
    source: &StaticSource,
) -> Arc<RunDispatcher<MemoryRemote, MockReviewSurface>> {
    let sources = SourceRegistry::new()
        .with_source("timetable", Arc::new(source.clone()))
        .unwrap();
    Arc::new(RunDispatcher::new(Pipeline::new(
        sources,
        remote.clone(),
        ReviewWorkflow::new(MockReviewSurface::new(), ReviewConfig::new("main")),
        ThresholdConfig::new().with_addition_threshold(1.0),
        PublisherConfig::new("main"),
    )))
}

async fn wait_for_pushes(remote: &MemoryRemote, count: usize) {
    for _ in 0..200 {
        if remote.push_count() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} pushes, saw {}", count, remote.push_count());
}

#[tokio::test]
async fn test_triggered_run_publishes_in_background() {
    let remote = MemoryRemote::new();
    let source = StaticSource::new(
        Snapshot::new()
            .with("K1", course("Calc"))
            .with("K2", course("Algebra")),
    );
    let app = build_app(dispatcher(&remote, &source));

    let (status, body) = send(app, post_json("/runs", json!({"type": "timetable"}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");

    wait_for_pushes(&remote, 1).await;

    let published = remote.file("main", &snapshot_path("timetable")).unwrap();
    let snapshot = Snapshot::from_json(&published).unwrap();
    assert_eq!(snapshot.len(), 2);
}

#[tokio::test]
async fn test_unchanged_run_does_not_push() {
    let remote = MemoryRemote::new();
    let source = StaticSource::new(Snapshot::new().with("K1", course("Calc")));
    let dispatcher = dispatcher(&remote, &source);

    assert!(dispatcher.run_now("timetable").await.unwrap().is_published());
    assert!(!dispatcher.run_now("timetable").await.unwrap().is_published());
    assert_eq!(remote.push_count(), 1);
}
