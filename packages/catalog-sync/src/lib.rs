//! Catalog Snapshot Synchronization Library
//!
//! Periodically captures keyed snapshots of course catalog data, compares
//! each one with the last published version, and publishes the result to a
//! git-versioned data repository.
//!
//! # How a run works
//!
//! 1. A [`SnapshotSource`] fetches and parses the upstream data.
//! 2. If its content hash matches the published version, the run stops.
//! 3. Otherwise the snapshots are [`compare`]d and the diff is
//!    [`classify`]d against per-field and per-category thresholds.
//! 4. Small changes go straight to the canonical branch. Large ones go to a
//!    review branch, and a review request is opened or updated.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use catalog_sync::{Pipeline, PublisherConfig, ReviewConfig, ReviewWorkflow, SourceRegistry, ThresholdConfig};
//! use catalog_sync::testing::{MemoryRemote, MockReviewSurface, StaticSource};
//!
//! let sources = SourceRegistry::new().with_source("timetable", Arc::new(StaticSource::default()))?;
//! let pipeline = Pipeline::new(
//!     sources,
//!     MemoryRemote::new(),
//!     ReviewWorkflow::new(MockReviewSurface::new(), ReviewConfig::new("main")),
//!     ThresholdConfig::new().with_field_threshold("Instr", 0.5),
//!     PublisherConfig::new("main"),
//! );
//! let outcome = pipeline.run("timetable").await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator contracts (SnapshotSource, VersionStore, ReviewSurface)
//! - [`types`] - Snapshots, diffs, thresholds, version history
//! - [`pipeline`] - Diff, classification, publication, review and orchestration
//! - [`sources`] - Source registry, the timetable scraper and the course catalog crawler
//! - [`stores`] - Git and in-memory version stores
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod pipeline;
pub mod sources;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{
    AcquisitionError, ConfigError, PublicationError, RepositoryLoadError, ReviewWorkflowError,
    ReviewResult, RunError, SnapshotError, StoreError,
};
pub use traits::{
    review::{NewReviewRequest, ReviewRequest, ReviewState, ReviewSurface},
    source::{RawDocument, SnapshotSource},
    store::{CommitAuthor, RemoteBranch, StoreConnector, VersionStore},
};
pub use types::{
    config::{normalize_field_name, ThresholdConfig, DEFAULT_APPROVAL_THRESHOLD},
    decision::ApprovalDecision,
    diff::{DiffResult, FieldChange},
    publication::{PublicationReceipt, PublicationState, PublicationTarget},
    snapshot::{content_hash, FieldValue, Record, Snapshot},
    version::{VersionHistory, VersionRecord},
};

// Re-export pipeline components
pub use pipeline::{
    classify, compare, compare_records, find_pending_branch, snapshot_path, Pipeline, Publisher,
    PublisherConfig, ReviewConfig, ReviewOutcome, ReviewWorkflow, RunOutcome, RunReport,
    VERSIONS_PATH,
};

// Re-export sources and stores
pub use sources::{HttpFetcher, HttpFetcherConfig, OrcSource, SourceRegistry, TimetableSource};
pub use stores::{GitConnector, GitCredentials, GitRemoteConfig, GitWorkingCopy, MemoryRemote};
