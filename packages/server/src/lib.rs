// Catalog Sync - API Core
//
// HTTP front door and process wiring for the catalog snapshot pipeline.
// The pipeline itself lives in the catalog-sync package; this crate loads
// configuration, adapts the GitHub client to the review surface, and
// dispatches runs triggered over HTTP.

pub mod config;
pub mod kernel;
pub mod server;

pub use config::*;
