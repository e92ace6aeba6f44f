// TestDependencies - mock implementations for testing
//
// Provides a launcher that records requests instead of running the pipeline.

use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::{BaseRunLauncher, LaunchError};

// =============================================================================
// Mock Run Launcher
// =============================================================================

#[derive(Clone, Default)]
pub struct MockRunLauncher {
    data_types: Vec<String>,
    launched: Arc<Mutex<Vec<(Uuid, String)>>>,
}

impl MockRunLauncher {
    pub fn new(data_types: &[&str]) -> Self {
        let mut data_types: Vec<String> = data_types.iter().map(|s| s.to_string()).collect();
        data_types.sort();
        Self {
            data_types,
            launched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Runs launched so far, in order
    pub fn launched(&self) -> Vec<(Uuid, String)> {
        self.launched.lock().unwrap().clone()
    }
}

impl BaseRunLauncher for MockRunLauncher {
    fn launch(&self, data_type: &str) -> Result<Uuid, LaunchError> {
        if !self.data_types.iter().any(|t| t == data_type) {
            return Err(LaunchError::UnknownDataType(data_type.to_string()));
        }
        let run_id = Uuid::new_v4();
        self.launched
            .lock()
            .unwrap()
            .push((run_id, data_type.to_string()));
        Ok(run_id)
    }

    fn data_types(&self) -> Vec<String> {
        self.data_types.clone()
    }
}
