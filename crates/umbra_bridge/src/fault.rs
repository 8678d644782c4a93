//! Faults in flight through sandboxed frames.

use crate::carrier::Carrier;
use umbra_shadow::ShadowThrowable;

/// A fault unwinding through sandboxed frames
///
/// The two variants are disjoint families: shadow throwables, which
/// sandboxed catch clauses may match, and carriers, which they never may.
#[derive(Debug)]
pub enum Fault {
    /// A fault within the shadow hierarchy
    Sandbox(ShadowThrowable),
    /// A host fault in transit
    Opaque(Carrier),
}

impl Fault {
    /// Borrow the shadow throwable, if this is a sandbox fault
    #[must_use]
    pub fn as_sandbox(&self) -> Option<&ShadowThrowable> {
        match self {
            Self::Sandbox(throwable) => Some(throwable),
            Self::Opaque(_) => None,
        }
    }
}

impl From<ShadowThrowable> for Fault {
    fn from(throwable: ShadowThrowable) -> Self {
        Self::Sandbox(throwable)
    }
}

/// Whether a fault is a carrier and must bypass every catch clause
///
/// Every place that matches faults against catch clauses consults this
/// before looking at types.
#[must_use]
pub fn is_opaque_carrier(fault: &Fault) -> bool {
    matches!(fault, Fault::Opaque(_))
}
