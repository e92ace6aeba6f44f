//! Background dispatch of pipeline runs.
//!
//! Each data type gets its own lock, so runs for the same type queue up
//! behind each other while different types proceed in parallel.

use catalog_sync::{Pipeline, ReviewSurface, RunError, RunOutcome, StoreConnector};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use super::traits::{BaseRunLauncher, LaunchError};

pub struct RunDispatcher<C: StoreConnector, R: ReviewSurface> {
    pipeline: Arc<Pipeline<C, R>>,
    locks: BTreeMap<String, Arc<Mutex<()>>>,
}

impl<C, R> RunDispatcher<C, R>
where
    C: StoreConnector + 'static,
    R: ReviewSurface + 'static,
{
    pub fn new(pipeline: Pipeline<C, R>) -> Self {
        let locks = pipeline
            .sources()
            .data_types()
            .into_iter()
            .map(|data_type| (data_type, Arc::new(Mutex::new(()))))
            .collect();

        Self {
            pipeline: Arc::new(pipeline),
            locks,
        }
    }

    pub fn pipeline(&self) -> &Pipeline<C, R> {
        &self.pipeline
    }

    /// Run `data_type` to completion once no other run of it is in flight.
    pub async fn run_now(&self, data_type: &str) -> Result<RunOutcome, RunError> {
        let lock = self
            .locks
            .get(data_type)
            .ok_or_else(|| RunError::UnknownDataType(data_type.to_string()))?;

        run_serialized(self.pipeline.clone(), lock.clone(), data_type.to_string()).await
    }
}

async fn run_serialized<C, R>(
    pipeline: Arc<Pipeline<C, R>>,
    lock: Arc<Mutex<()>>,
    data_type: String,
) -> Result<RunOutcome, RunError>
where
    C: StoreConnector,
    R: ReviewSurface,
{
    let _guard = lock.lock().await;
    pipeline.run(&data_type).await
}

impl<C, R> BaseRunLauncher for RunDispatcher<C, R>
where
    C: StoreConnector + 'static,
    R: ReviewSurface + 'static,
{
    fn launch(&self, data_type: &str) -> Result<Uuid, LaunchError> {
        let lock = self
            .locks
            .get(data_type)
            .ok_or_else(|| LaunchError::UnknownDataType(data_type.to_string()))?
            .clone();

        let run_id = Uuid::new_v4();
        let pipeline = self.pipeline.clone();
        let data_type = data_type.to_string();
        let span = tracing::info_span!("run_request", run_id = %run_id, data_type = %data_type);

        tokio::spawn(
            async move {
                match run_serialized(pipeline, lock, data_type).await {
                    Ok(RunOutcome::Unchanged { content_hash, .. }) => {
                        tracing::info!(hash = %content_hash, "Run finished without changes");
                    }
                    Ok(RunOutcome::Published(report)) => {
                        tracing::info!(
                            branch = %report.target.branch(),
                            commit = %report.commit,
                            added = report.added,
                            removed = report.removed,
                            changed = report.changed,
                            "Run published snapshot"
                        );
                    }
                    Err(e) if e.is_retryable() => {
                        tracing::warn!(error = %e, "Run lost a race with another writer");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Run failed");
                    }
                }
            }
            .instrument(span),
        );

        Ok(run_id)
    }

    fn data_types(&self) -> Vec<String> {
        self.locks.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_sync::testing::{MemoryRemote, MockReviewSurface, StaticSource};
    use catalog_sync::{
        PublisherConfig, Record, ReviewConfig, ReviewWorkflow, Snapshot, SourceRegistry,
        ThresholdConfig,
    };

    fn dispatcher(
        remote: &MemoryRemote,
        source: &StaticSource,
    ) -> RunDispatcher<MemoryRemote, MockReviewSurface> {
        let sources = SourceRegistry::new()
            .with_source("timetable", Arc::new(source.clone()))
            .unwrap();
        RunDispatcher::new(Pipeline::new(
            sources,
            remote.clone(),
            ReviewWorkflow::new(MockReviewSurface::new(), ReviewConfig::new("main")),
            ThresholdConfig::new().with_addition_threshold(1.0),
            PublisherConfig::new("main"),
        ))
    }

    fn snapshot() -> Snapshot {
        Snapshot::new().with("K1", Record::new().with("Title", "Calc"))
    }

    #[test]
    fn test_data_types_follow_registry() {
        let d = dispatcher(&MemoryRemote::new(), &StaticSource::new(snapshot()));
        assert_eq!(d.data_types(), vec!["timetable"]);
    }

    #[tokio::test]
    async fn test_launch_rejects_unknown_type() {
        let d = dispatcher(&MemoryRemote::new(), &StaticSource::new(snapshot()));
        assert_eq!(
            d.launch("grades"),
            Err(LaunchError::UnknownDataType("grades".to_string()))
        );
    }

    #[tokio::test]
    async fn test_same_type_runs_are_serialized() {
        let remote = MemoryRemote::new();
        let source = StaticSource::new(snapshot());
        let d = dispatcher(&remote, &source);

        let (first, second) = tokio::join!(d.run_now("timetable"), d.run_now("timetable"));
        let outcomes = [first.unwrap(), second.unwrap()];

        assert_eq!(outcomes.iter().filter(|o| o.is_published()).count(), 1);
        assert_eq!(remote.push_count(), 1);
    }

    #[tokio::test]
    async fn test_run_now_unknown_type() {
        let d = dispatcher(&MemoryRemote::new(), &StaticSource::new(snapshot()));
        assert!(matches!(
            d.run_now("grades").await,
            Err(RunError::UnknownDataType(_))
        ));
    }
}
