//! Extension loader status: the result code of a load attempt and the
//! record persisted after every attempt so other processes can observe the
//! loader's progress.

use serde::{Deserialize, Serialize};

/// Result code returned by the privileged load primitive.
///
/// Zero denotes success. Every other value (including "already loaded") is
/// an opaque integer logged verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub i32);

impl StatusCode {
    pub const SUCCESS: StatusCode = StatusCode(0);

    /// Returns `true` if the code denotes a successful load.
    pub fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// The loader state record written to the status store.
///
/// Persisted before the first attempt (`attempted: false` announces "in
/// progress") and again after every attempt with the latest result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderState {
    pub attempted: bool,
    pub last_result: Option<StatusCode>,
}

impl Default for LoaderState {
    fn default() -> Self {
        Self {
            attempted: false,
            last_result: None,
        }
    }
}

impl LoaderState {
    /// Returns `true` once a successful result has been recorded.
    pub fn is_loaded(&self) -> bool {
        matches!(self.last_result, Some(code) if code.is_success())
    }
}
