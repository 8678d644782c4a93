//! The opaque carrier for host faults in transit.

use crate::bridge::BridgeViolation;
use crate::host::HostFault;
use std::error::Error;
use std::fmt;

/// Opaque, non-catchable wrapper around a host fault
///
/// Only this crate can build or open a carrier. Its `Debug` and `Display`
/// output reveal nothing about the enclosed fault.
pub struct Carrier {
    fault: HostFault,
}

impl Carrier {
    /// Enclose a host fault
    ///
    /// # Errors
    ///
    /// Returns [`BridgeViolation::NestedCarrier`] if a carrier appears anywhere
    /// in the fault's error chain
    pub(crate) fn wrap(fault: HostFault) -> Result<Self, BridgeViolation> {
        if Self::is_enclosed_in(&fault) {
            return Err(BridgeViolation::NestedCarrier);
        }
        Ok(Self { fault })
    }

    /// Whether `fault` is a carrier or has one among its sources
    pub(crate) fn is_enclosed_in(fault: &HostFault) -> bool {
        let mut next: Option<&(dyn Error + 'static)> = Some(fault.as_error());
        while let Some(error) = next {
            if error.is::<Carrier>() {
                return true;
            }
            next = error.source();
        }
        false
    }

    /// Release the enclosed host fault
    pub(crate) fn unwrap(self) -> HostFault {
        self.fault
    }
}

impl fmt::Debug for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Carrier { .. }")
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("opaque host fault in transit")
    }
}

impl Error for Carrier {}
