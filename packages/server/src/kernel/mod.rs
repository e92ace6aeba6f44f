//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod dispatcher;
pub mod test_dependencies;
pub mod traits;

pub use deps::{build_pipeline, build_source_registry, GitHubAdapter, ServerPipeline};
pub use dispatcher::RunDispatcher;
pub use traits::{BaseRunLauncher, LaunchError};
