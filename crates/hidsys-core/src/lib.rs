//! # hidsys-core
//!
//! Shared domain types for `hidsysd`: opaque handle identifiers for the
//! system input service, fixed-layout synthetic event records, and the
//! loader status record persisted for other processes to observe.
//!
//! This crate has zero dependencies on OS APIs, the async runtime, or
//! network sockets. Everything that touches the real system lives behind
//! the trait seams in the `hidsysd` crate.

pub mod event;
pub mod handle;
pub mod status;

// Re-export the most-used types at the crate root so callers can write
// `hidsys_core::EventRecord` instead of `hidsys_core::event::EventRecord`.
pub use event::{
    aux_control_button_event, key_event, modifier_flags_event, EventData, EventKind, EventRecord,
    KeyData, KeyDirection, LockSelector, ModifierFlags, Point, PostKeyKind,
};
pub use handle::{RawConnectionId, RawServiceId};
pub use status::{LoaderState, StatusCode};
