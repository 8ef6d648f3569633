//! Discovery aggregation across transports
//!
//! Every registered transport scans concurrently; their event streams are
//! merged into one. Dropping the merged stream drops each transport's
//! stream, which aborts its scan.

use std::sync::Arc;

use futures::stream::{self, SelectAll};
use meshlink_core::{DiscoveryStream, Transport, TransportKind};
use tracing::debug;

pub type MergedDiscovery = SelectAll<DiscoveryStream>;

#[derive(Clone, Default)]
pub struct DiscoveryAggregator {
    transports: Vec<Arc<dyn Transport>>,
}

impl DiscoveryAggregator {
    pub fn new(transports: Vec<Arc<dyn Transport>>) -> Self {
        Self { transports }
    }

    /// Start a scan on every transport and merge the results
    pub fn discover_all(&self) -> MergedDiscovery {
        debug!("Starting discovery on {} transport(s)", self.transports.len());
        stream::select_all(self.transports.iter().map(|t| t.discover()))
    }

    /// Transport responsible for devices of `kind`
    pub fn transport_for(&self, kind: TransportKind) -> Option<Arc<dyn Transport>> {
        self.transports.iter().find(|t| t.kind() == kind).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }
}
