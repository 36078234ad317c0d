//! Infrastructure: trait seams to the OS-facing collaborators and their
//! in-memory/file-system implementations.

pub mod hid;
pub mod status_store;
