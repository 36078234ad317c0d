//! Service watch: matched/terminated notification streams for one service
//! class, plus the idempotent "list everything currently matching" re-query
//! the consumer issues after a termination.

use std::sync::Arc;

use hidsys_core::RawServiceId;
use tokio::sync::mpsc;
use tracing::error;

use super::{DiscoveryError, ServiceDiscovery, WatchEvent};

/// Watches one service class on a discovery transport.
pub struct ServiceWatch {
    discovery: Arc<dyn ServiceDiscovery>,
    class: String,
}

impl ServiceWatch {
    pub fn new(discovery: Arc<dyn ServiceDiscovery>, class: impl Into<String>) -> Self {
        Self {
            discovery,
            class: class.into(),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// Subscribes to matched/terminated batches for the class.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::InvalidFilter`] if the transport cannot
    /// build the matching filter. The failure is fatal for this class; the
    /// caller logs once and stays inert.
    pub fn subscribe(&self) -> Result<mpsc::Receiver<WatchEvent>, DiscoveryError> {
        self.discovery.watch(&self.class)
    }

    /// Lists all currently matching instances.
    ///
    /// A query failure is logged and degraded to "no instances this round";
    /// a future matched/terminated event triggers another attempt.
    pub fn current_matches(&self) -> Vec<RawServiceId> {
        match self.discovery.query_current_matches(&self.class) {
            Ok(ids) => ids,
            Err(e) => {
                error!("re-query for {:?} failed: {e}", self.class);
                Vec::new()
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
