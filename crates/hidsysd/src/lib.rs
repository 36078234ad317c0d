//! hidsysd library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.

pub mod application;
pub mod config;
pub mod infrastructure;

pub use application::connection_manager::ConnectionManager;
pub use application::extension_loader::{
    ExtensionLoaded, ExtensionLoader, LoaderHandle, LoadPrimitive, StatusStore, VersionMonitor,
};
pub use infrastructure::status_store::JsonStatusStore;
