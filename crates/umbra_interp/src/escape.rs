//! What a host caller can observe when sandboxed execution ends abruptly.

use umbra_bridge::{BridgeViolation, HostFault, Surfaced};
use umbra_core::{ContextId, CoreError};
use umbra_shadow::ShadowThrowable;

/// Abrupt end of a boundary invocation
///
/// No variant can hold a carrier: by the time an `Escape` exists, every
/// carrier has been unwrapped.
#[derive(Debug, thiserror::Error)]
pub enum Escape {
    /// Sandboxed code's own fault, uncaught
    #[error("Uncaught sandbox fault: {0}")]
    Sandbox(ShadowThrowable),

    /// The original host fault
    #[error("Host fault: {0}")]
    Host(HostFault),

    /// An internal defect aborted the context
    #[error("Context aborted: {0}")]
    Defect(#[from] Defect),

    /// The invocation was refused before sandboxed code ran
    #[error("Invocation rejected: {0}")]
    Rejected(CoreError),
}

impl Escape {
    /// The host fault, if one surfaced
    #[must_use]
    pub fn host_fault(&self) -> Option<&HostFault> {
        match self {
            Self::Host(fault) => Some(fault),
            _ => None,
        }
    }

    /// The uncaught shadow throwable, if any
    #[must_use]
    pub fn sandbox_fault(&self) -> Option<&ShadowThrowable> {
        match self {
            Self::Sandbox(throwable) => Some(throwable),
            _ => None,
        }
    }
}

impl From<Surfaced> for Escape {
    fn from(surfaced: Surfaced) -> Self {
        match surfaced {
            Surfaced::Sandbox(throwable) => Self::Sandbox(throwable),
            Surfaced::Host(fault) => Self::Host(fault),
        }
    }
}

/// Internal defects that abort a context
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Defect {
    /// The bridge contract was violated
    #[error(transparent)]
    Bridge(#[from] BridgeViolation),

    /// The context was aborted by an earlier defect
    #[error("Context {0} was aborted by an earlier defect")]
    ContextAborted(ContextId),
}
