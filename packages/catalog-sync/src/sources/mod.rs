//! Snapshot sources and the registry that maps data types to them.

pub mod http;
pub mod orc;
pub mod timetable;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::traits::source::SnapshotSource;

pub use http::{HttpFetcher, HttpFetcherConfig};
pub use orc::OrcSource;
pub use timetable::TimetableSource;

/// Data types and the sources that produce them.
///
/// Identifiers become branch prefixes and file names, so only lowercase
/// ASCII letters, digits and `-` are accepted.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Arc<dyn SnapshotSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source, rejecting bad or duplicate identifiers.
    pub fn register(
        &mut self,
        data_type: impl Into<String>,
        source: Arc<dyn SnapshotSource>,
    ) -> Result<(), ConfigError> {
        let data_type = data_type.into();
        if !is_valid_data_type(&data_type) {
            return Err(ConfigError::InvalidDataType(data_type));
        }
        if self.sources.contains_key(&data_type) {
            return Err(ConfigError::DuplicateDataType(data_type));
        }
        self.sources.insert(data_type, source);
        Ok(())
    }

    /// Register a source (builder pattern).
    pub fn with_source(
        mut self,
        data_type: impl Into<String>,
        source: Arc<dyn SnapshotSource>,
    ) -> Result<Self, ConfigError> {
        self.register(data_type, source)?;
        Ok(self)
    }

    pub fn get(&self, data_type: &str) -> Option<&Arc<dyn SnapshotSource>> {
        self.sources.get(data_type)
    }

    pub fn contains(&self, data_type: &str) -> bool {
        self.sources.contains_key(data_type)
    }

    /// Registered data types in sorted order.
    pub fn data_types(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Check that every enabled data type has a source.
    pub fn validate_enabled<S: AsRef<str>>(&self, enabled: &[S]) -> Result<(), ConfigError> {
        for data_type in enabled {
            if !self.contains(data_type.as_ref()) {
                return Err(ConfigError::UnknownDataType(data_type.as_ref().to_string()));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("data_types", &self.data_types())
            .finish()
    }
}

fn is_valid_data_type(data_type: &str) -> bool {
    !data_type.is_empty()
        && data_type
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticSource;
    use crate::types::snapshot::Snapshot;

    fn source() -> Arc<dyn SnapshotSource> {
        Arc::new(StaticSource::new(Snapshot::new()))
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = SourceRegistry::new()
            .with_source("timetable", source())
            .unwrap()
            .with_source("orc", source())
            .unwrap();

        assert!(registry.get("timetable").is_some());
        assert!(registry.get("prereqs").is_none());
        assert_eq!(registry.data_types(), vec!["orc", "timetable"]);
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = SourceRegistry::new();
        registry.register("timetable", source()).unwrap();

        assert!(matches!(
            registry.register("timetable", source()),
            Err(ConfigError::DuplicateDataType(_))
        ));
    }

    #[test]
    fn test_register_rejects_branch_unsafe_identifiers() {
        let mut registry = SourceRegistry::new();
        for bad in ["", "Timetable", "time_table", "time table", "a/b"] {
            assert!(
                matches!(
                    registry.register(bad, source()),
                    Err(ConfigError::InvalidDataType(_))
                ),
                "{bad:?} should be rejected"
            );
        }
        assert!(registry.register("course-desc2", source()).is_ok());
    }

    #[test]
    fn test_validate_enabled() {
        let registry = SourceRegistry::new()
            .with_source("timetable", source())
            .unwrap();

        assert!(registry.validate_enabled(&["timetable"]).is_ok());
        assert!(matches!(
            registry.validate_enabled(&["timetable", "orc"]),
            Err(ConfigError::UnknownDataType(name)) if name == "orc"
        ));
    }
}
