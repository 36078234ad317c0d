//! Application layer: the two long-lived state machines of the daemon.
//!
//! Both depend only on trait seams from `infrastructure` and domain types
//! from `hidsys-core`, so they are fully unit-testable.

pub mod connection_manager;
pub mod extension_loader;
