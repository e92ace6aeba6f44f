//! Testing utilities including mock implementations.
//!
//! These let applications exercise a full run without touching the
//! network, a git remote or a review service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{AcquisitionError, AcquisitionResult, ReviewResult, ReviewWorkflowError};
use crate::traits::review::{NewReviewRequest, ReviewRequest, ReviewState, ReviewSurface};
use crate::traits::source::{RawDocument, SnapshotSource};
use crate::types::snapshot::Snapshot;

pub use crate::stores::memory::{MemoryRemote, MemoryWorkingCopy};

/// A source that returns a configurable snapshot.
///
/// Clones share state, so a test can keep a handle and swap the snapshot
/// between runs.
#[derive(Clone, Default)]
pub struct StaticSource {
    snapshot: Arc<RwLock<Snapshot>>,
    failure: Arc<RwLock<Option<String>>>,
    fetches: Arc<AtomicUsize>,
}

impl StaticSource {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(snapshot)),
            ..Default::default()
        }
    }

    /// Replace the snapshot returned by later fetches.
    pub fn set_snapshot(&self, snapshot: Snapshot) {
        *self.snapshot.write().unwrap() = snapshot;
    }

    /// Make every fetch fail with `reason` until cleared.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.write().unwrap() = Some(reason.into());
    }

    pub fn clear_failure(&self) {
        *self.failure.write().unwrap() = None;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for StaticSource {
    async fn fetch(&self) -> AcquisitionResult<RawDocument> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = self.failure.read().unwrap().clone() {
            return Err(AcquisitionError::Parse { reason });
        }

        let snapshot = self.snapshot.read().unwrap();
        let body = snapshot.to_canonical_json()?;
        Ok(RawDocument::new(String::from_utf8_lossy(&body)))
    }

    fn parse(&self, document: &RawDocument) -> AcquisitionResult<Snapshot> {
        Ok(Snapshot::from_json(document.body.as_bytes())?)
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Record of a call made to the mock review surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReviewCall {
    ListOpen,
    ListClosed,
    Create(NewReviewRequest),
    Comment { number: u64, body: String },
}

#[derive(Debug, Default)]
struct MockReviewState {
    requests: Vec<ReviewRequest>,
    calls: Vec<MockReviewCall>,
    next_number: u64,
    failure: Option<String>,
}

/// A review surface that keeps requests in memory.
#[derive(Clone, Default)]
pub struct MockReviewSurface {
    state: Arc<RwLock<MockReviewState>>,
}

impl MockReviewSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend a request is already open for `head`.
    pub fn with_open_request(self, number: u64, head: impl Into<String>) -> Self {
        self.with_request(number, head, ReviewState::Open)
    }

    /// Pretend a request for `head` was closed or merged.
    pub fn with_closed_request(self, number: u64, head: impl Into<String>) -> Self {
        self.with_request(number, head, ReviewState::Closed)
    }

    fn with_request(self, number: u64, head: impl Into<String>, review: ReviewState) -> Self {
        {
            let mut state = self.state.write().unwrap();
            state.requests.push(ReviewRequest {
                number,
                head: head.into(),
                state: review,
            });
            state.next_number = state.next_number.max(number);
        }
        self
    }

    /// Make every call fail until cleared.
    pub fn fail_with(&self, message: impl Into<String>) {
        self.state.write().unwrap().failure = Some(message.into());
    }

    pub fn calls(&self) -> Vec<MockReviewCall> {
        self.state.read().unwrap().calls.clone()
    }

    /// Requests opened through this surface.
    pub fn created(&self) -> Vec<NewReviewRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockReviewCall::Create(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    /// `(number, body)` of every comment posted.
    pub fn comments(&self) -> Vec<(u64, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockReviewCall::Comment { number, body } => Some((number, body)),
                _ => None,
            })
            .collect()
    }

    fn list(&self, call: MockReviewCall, review: ReviewState) -> ReviewResult<Vec<ReviewRequest>> {
        self.check_failure()?;
        let mut state = self.state.write().unwrap();
        state.calls.push(call);
        Ok(state
            .requests
            .iter()
            .filter(|r| r.state == review)
            .cloned()
            .collect())
    }

    fn check_failure(&self) -> ReviewResult<()> {
        match &self.state.read().unwrap().failure {
            Some(message) => Err(ReviewWorkflowError::Api {
                status: 502,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ReviewSurface for MockReviewSurface {
    async fn list_open_requests(&self) -> ReviewResult<Vec<ReviewRequest>> {
        self.list(MockReviewCall::ListOpen, ReviewState::Open)
    }

    async fn list_closed_requests(&self) -> ReviewResult<Vec<ReviewRequest>> {
        self.list(MockReviewCall::ListClosed, ReviewState::Closed)
    }

    async fn create_review_request(&self, request: &NewReviewRequest) -> ReviewResult<u64> {
        self.check_failure()?;
        let mut state = self.state.write().unwrap();
        state.next_number += 1;
        let number = state.next_number;
        state.requests.push(ReviewRequest {
            number,
            head: request.head.clone(),
            state: ReviewState::Open,
        });
        state.calls.push(MockReviewCall::Create(request.clone()));
        Ok(number)
    }

    async fn add_comment(&self, number: u64, body: &str) -> ReviewResult<()> {
        self.check_failure()?;
        self.state.write().unwrap().calls.push(MockReviewCall::Comment {
            number,
            body: body.to_string(),
        });
        Ok(())
    }
}
