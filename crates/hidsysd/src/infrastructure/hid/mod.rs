//! HID system infrastructure: the trait seams to the discovery transport
//! and the service's request port.
//!
//! The real transport is an OS-specific registry that enumerates the shared
//! input service once per physical device and delivers asynchronous
//! matched/terminated batches. Everything above this module talks to two
//! traits instead:
//!
//! - [`ServiceDiscovery`] — watch a service class and re-query its current
//!   matches. Batches arrive on a channel drained by the consumer's pump.
//! - [`HidPort`] — reference counting, open/close, event posting, and
//!   modifier-lock access against raw handles.
//!
//! Reference discipline: every [`RawServiceId`] delivered in a
//! [`WatchEvent`] batch or returned by `query_current_matches` carries one
//! reference the consumer owes back via [`HidPort::release_service`]. The
//! scoped guards in [`scoped`] enforce this on every exit path.
//!
//! # Testability
//!
//! [`mock::MockHidSystem`] implements both traits in memory and is used by
//! unit tests, the integration tests, and the daemon's `--simulate` mode.

use hidsys_core::{EventRecord, LockSelector, RawConnectionId, RawServiceId};
use thiserror::Error;
use tokio::sync::mpsc;

pub mod mock;
pub mod scoped;
pub mod watch;

/// Error type for port operations against the HID system service.
///
/// The embedded codes are kernel-style return values, logged verbatim.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HidError {
    #[error("service open failed: {code:#x}")]
    Open { code: i32 },
    #[error("connection close failed: {code:#x}")]
    Close { code: i32 },
    #[error("event post failed: {code:#x}")]
    Post { code: i32 },
    #[error("modifier lock read failed: {code:#x}")]
    LockRead { code: i32 },
    #[error("modifier lock write failed: {code:#x}")]
    LockWrite { code: i32 },
    #[error("no HID system backend is available on this target")]
    UnsupportedPlatform,
}

/// Error type for discovery transport operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The matching filter for the service class could not be built.
    /// Fatal to the watch: the consumer becomes permanently inert.
    #[error("could not build matching filter for service class {class:?}")]
    InvalidFilter { class: String },
    /// A top-level re-query of current matches failed.
    #[error("query for current matches failed: {code:#x}")]
    Query { code: i32 },
}

/// A batch notification from the discovery transport.
///
/// Delivery order of instances within one batch is unspecified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// New instances of the watched class became visible.
    Matched(Vec<RawServiceId>),
    /// Instances stopped being visible. The batch contents identify which,
    /// but the consumer treats any non-empty batch as "my connection is now
    /// invalid" because the service is one logical system-wide resource.
    Terminated(Vec<RawServiceId>),
}

/// Request port to the HID system service.
///
/// All calls are bounded, non-blocking-in-practice system calls; callers may
/// hold a lock across them.
pub trait HidPort: Send + Sync {
    /// Takes an additional reference on a service instance.
    fn retain_service(&self, id: RawServiceId);

    /// Returns one reference on a service instance to the system.
    fn release_service(&self, id: RawServiceId);

    /// Opens a channel to a service instance.
    fn open(&self, id: RawServiceId) -> Result<RawConnectionId, HidError>;

    /// Closes an open channel.
    fn close(&self, conn: RawConnectionId) -> Result<(), HidError>;

    /// Posts a synthetic event record through an open channel.
    fn post_event(&self, conn: RawConnectionId, record: &EventRecord) -> Result<(), HidError>;

    /// Reads a modifier-lock flag through an open channel.
    fn modifier_lock_state(
        &self,
        conn: RawConnectionId,
        selector: LockSelector,
    ) -> Result<bool, HidError>;

    /// Writes a modifier-lock flag through an open channel.
    fn set_modifier_lock_state(
        &self,
        conn: RawConnectionId,
        selector: LockSelector,
        value: bool,
    ) -> Result<(), HidError>;
}

/// Discovery transport for a named service class.
pub trait ServiceDiscovery: Send + Sync {
    /// Begins watching `class`. Matched/terminated batches arrive on the
    /// returned channel for the lifetime of the transport.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::InvalidFilter`] if the matching filter
    /// cannot be built; the class cannot be watched in that case.
    fn watch(&self, class: &str) -> Result<mpsc::Receiver<WatchEvent>, DiscoveryError>;

    /// Lists all currently matching instances of `class`.
    ///
    /// Each returned id carries one reference the caller owes back.
    fn query_current_matches(&self, class: &str) -> Result<Vec<RawServiceId>, DiscoveryError>;
}
