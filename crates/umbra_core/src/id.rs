//! Unique identifiers for UMBRA entities.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Context identifier - identifies one logical thread of sandboxed execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Create a new random ContextId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from UUID bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Get as UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx_{}", self.0)
    }
}

/// Invocation identifier - identifies one host-to-sandbox call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Create a new random InvocationId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get as UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "inv_{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_id_unique() {
        assert_ne!(ContextId::new(), ContextId::new());
    }

    #[test]
    fn test_context_id_display() {
        let id = ContextId::from_bytes([0; 16]);
        assert_eq!(id.to_string(), "ctx_00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn test_invocation_id_display_prefix() {
        assert!(InvocationId::new().to_string().starts_with("inv_"));
    }

    #[test]
    fn test_context_id_serde() {
        let id = ContextId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: ContextId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
