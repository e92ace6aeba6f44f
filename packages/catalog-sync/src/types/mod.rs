//! Data types shared across the pipeline stages.

pub mod config;
pub mod decision;
pub mod diff;
pub mod publication;
pub mod snapshot;
pub mod version;
