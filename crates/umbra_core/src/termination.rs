//! Faults raised by the sandbox machinery itself.
//!
//! These are host-native faults: sandboxed code must never be able to catch
//! them, so the bridge always transports them opaquely and never translates
//! them into shadow exceptions.

use serde::{Deserialize, Serialize};

/// Termination fault raised by the sandbox's own machinery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum Termination {
    /// A resource threshold (cost budget, call depth, cleanup allowance) was exceeded
    #[error("Threshold violation: {resource} exceeded limit {limit}")]
    ThresholdViolation {
        /// Name of the exhausted resource
        resource: String,
        /// Configured limit
        limit: u64,
    },

    /// Sandboxed code attempted an operation the sandbox does not permit
    #[error("Rule violation: {0}")]
    RuleViolation(String),

    /// The execution context was cancelled by the host
    #[error("Execution cancelled")]
    Cancelled,
}

impl Termination {
    /// Shorthand for a threshold violation
    #[must_use]
    pub fn threshold(resource: impl Into<String>, limit: u64) -> Self {
        Self::ThresholdViolation {
            resource: resource.into(),
            limit,
        }
    }

    /// Shorthand for a rule violation
    #[must_use]
    pub fn rule(reason: impl Into<String>) -> Self {
        Self::RuleViolation(reason.into())
    }
}
