//! Snapshot acquisition contract.
//!
//! A source is a `{fetch, parse}` pair: `fetch` talks to the network and
//! returns the raw document, `parse` turns it into a keyed [`Snapshot`]
//! without I/O. Keeping them apart lets parsers be tested against fixture
//! documents.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AcquisitionResult;
use crate::types::snapshot::Snapshot;

/// Raw upstream document before parsing.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub body: String,

    /// Where the document came from, if it has a URL
    pub url: Option<String>,

    pub fetched_at: DateTime<Utc>,
}

impl RawDocument {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            url: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Produces complete snapshots for one data type.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the raw upstream document.
    async fn fetch(&self) -> AcquisitionResult<RawDocument>;

    /// Parse a fetched document into a snapshot.
    fn parse(&self, document: &RawDocument) -> AcquisitionResult<Snapshot>;

    /// Fetch and parse. All or nothing: a partial snapshot is never returned.
    async fn acquire(&self) -> AcquisitionResult<Snapshot> {
        let document = self.fetch().await?;
        self.parse(&document)
    }

    /// Source name for logging.
    fn name(&self) -> &str {
        "unknown"
    }
}
