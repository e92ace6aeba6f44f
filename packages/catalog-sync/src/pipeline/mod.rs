//! Run stages: compare, classify, publish, review, and the orchestration
//! that ties them together.

pub mod classify;
pub mod diff;
pub mod publish;
pub mod review;
pub mod run;

pub use classify::classify;
pub use diff::{compare, compare_records};
pub use publish::{find_pending_branch, snapshot_path, Publisher, PublisherConfig, VERSIONS_PATH};
pub use review::{ReviewConfig, ReviewOutcome, ReviewWorkflow};
pub use run::{Pipeline, RunOutcome, RunReport};
