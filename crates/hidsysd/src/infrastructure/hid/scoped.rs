//! Scoped ownership of transport references.
//!
//! The transport hands out reference-counted handles; every reference taken
//! must be returned exactly once. These guards tie one reference to one
//! value: move-only, released on drop, so early returns and error paths
//! cannot leak. Explicit [`ConnectionGuard::close`] exists for the teardown
//! path where the caller wants to log the outcome.

use std::sync::Arc;

use hidsys_core::{RawConnectionId, RawServiceId};
use tracing::warn;

use super::{HidError, HidPort};

/// Owns one reference on a service instance; releases it on drop.
pub struct ServiceGuard {
    id: RawServiceId,
    port: Arc<dyn HidPort>,
}

impl ServiceGuard {
    /// Takes ownership of a reference the transport already handed out
    /// (a batch entry or a query result). Returns `None` for the null
    /// sentinel, which carries nothing to release.
    pub fn adopt(port: Arc<dyn HidPort>, id: RawServiceId) -> Option<Self> {
        if id.is_null() {
            return None;
        }
        Some(Self { id, port })
    }

    /// Takes an additional reference on `id`, independent of whatever
    /// reference the caller already holds.
    pub fn claim(port: Arc<dyn HidPort>, id: RawServiceId) -> Self {
        port.retain_service(id);
        Self { id, port }
    }

    pub fn id(&self) -> RawServiceId {
        self.id
    }
}

impl Drop for ServiceGuard {
    fn drop(&mut self) {
        self.port.release_service(self.id);
    }
}

impl std::fmt::Debug for ServiceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceGuard").field("id", &self.id).finish()
    }
}

/// Owns an open channel; closes it on drop.
pub struct ConnectionGuard {
    id: RawConnectionId,
    port: Arc<dyn HidPort>,
    open: bool,
}

impl ConnectionGuard {
    /// Takes ownership of a channel returned by [`HidPort::open`].
    pub fn adopt(port: Arc<dyn HidPort>, id: RawConnectionId) -> Self {
        Self {
            id,
            port,
            open: true,
        }
    }

    pub fn id(&self) -> RawConnectionId {
        self.id
    }

    /// Closes the channel, reporting the outcome to the caller.
    pub fn close(mut self) -> Result<(), HidError> {
        self.open = false;
        self.port.close(self.id)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.port.close(self.id) {
                warn!("close on drop failed for {}: {e}", self.id);
            }
        }
    }
}

impl std::fmt::Debug for ConnectionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGuard")
            .field("id", &self.id)
            .field("open", &self.open)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
