//! Opaque identifiers for discovered services and open connections.
//!
//! These are plain `Copy` values handed out by the discovery transport.
//! They carry no ownership: reference counting and release-on-drop live in
//! the daemon's scoped guards, which wrap these ids together with the port
//! that can release them.

use serde::{Deserialize, Serialize};

/// Identifier for a discovered instance of the watched service class.
///
/// `0` is the null sentinel (no object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawServiceId(pub u64);

impl RawServiceId {
    /// The null sentinel: "no service".
    pub const NULL: RawServiceId = RawServiceId(0);

    /// Returns `true` if this is the null sentinel.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for RawServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "service:{:#x}", self.0)
    }
}

/// Identifier for an open channel to a service instance.
///
/// `0` is the null sentinel (no connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawConnectionId(pub u64);

impl RawConnectionId {
    /// The null sentinel: "no connection".
    pub const NULL: RawConnectionId = RawConnectionId(0);

    /// Returns `true` if this is the null sentinel.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for RawConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "connection:{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_service_id_is_null() {
        assert!(RawServiceId::NULL.is_null());
        assert!(RawServiceId(0).is_null());
        assert!(!RawServiceId(1).is_null());
    }

    #[test]
    fn test_null_connection_id_is_null() {
        assert!(RawConnectionId::NULL.is_null());
        assert!(!RawConnectionId(7).is_null());
    }

    #[test]
    fn test_display_formats_as_hex() {
        assert_eq!(RawServiceId(0xab).to_string(), "service:0xab");
        assert_eq!(RawConnectionId(0x10).to_string(), "connection:0x10");
    }
}
