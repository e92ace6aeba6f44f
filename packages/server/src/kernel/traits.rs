// Trait definitions for dependency injection
//
// Naming convention: Base* for trait names (e.g., BaseRunLauncher)

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LaunchError {
    #[error("unknown data type: '{0}'")]
    UnknownDataType(String),
}

// =============================================================================
// Run Launcher Trait (Infrastructure - starts pipeline runs in the background)
// =============================================================================

pub trait BaseRunLauncher: Send + Sync {
    /// Start a run for `data_type` and return its id without waiting for it
    fn launch(&self, data_type: &str) -> Result<Uuid, LaunchError>;

    /// Data types runs can be launched for, sorted
    fn data_types(&self) -> Vec<String>;
}
