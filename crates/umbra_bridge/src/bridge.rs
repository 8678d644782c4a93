//! Bridge operations: the only way in and out of a carrier.

use crate::carrier::Carrier;
use crate::fault::Fault;
use crate::host::HostFault;
use crate::translate::TranslationTable;
use umbra_shadow::ShadowThrowable;

/// Internal contract violations of the bridge
///
/// These are defects in the sandbox machinery. They abort the enclosing
/// context and are never delivered to sandboxed code as a fault.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeViolation {
    /// Attempted to wrap a carrier inside another carrier
    #[error("Bridge contract violated: host fault is already a carrier")]
    NestedCarrier,
}

/// What the host side observes once a fault leaves sandboxed execution
#[derive(Debug)]
pub enum Surfaced {
    /// Sandboxed code's own uncaught fault
    Sandbox(ShadowThrowable),
    /// The original host fault, exactly as it was raised
    Host(HostFault),
}

impl std::fmt::Display for Surfaced {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sandbox(throwable) => write!(f, "sandbox fault: {}", throwable),
            Self::Host(fault) => write!(f, "host fault: {}", fault),
        }
    }
}

/// Wrap a host fault so it can unwind through sandboxed frames
///
/// The returned fault is raised through the interpreter's normal unwinding
/// path; cleanup blocks still run, catch clauses never match it.
///
/// # Errors
///
/// Returns [`BridgeViolation::NestedCarrier`] if `fault` already encloses a carrier
pub fn raise_opaque(fault: HostFault) -> Result<Fault, BridgeViolation> {
    let carrier = Carrier::wrap(fault).inspect_err(|violation| {
        tracing::error!(%violation, "refusing to nest carrier");
    })?;
    tracing::debug!("host fault entering sandboxed frames");
    Ok(Fault::Opaque(carrier))
}

/// Produce the value seen by the host once a fault reaches the boundary
///
/// Carriers are unwrapped back into the original host fault; shadow faults
/// pass through unchanged. Never fails.
#[must_use]
pub fn resolve_boundary(fault: Fault) -> Surfaced {
    match fault {
        Fault::Opaque(carrier) => {
            tracing::debug!("host fault leaving sandboxed frames");
            Surfaced::Host(carrier.unwrap())
        }
        Fault::Sandbox(throwable) => Surfaced::Sandbox(throwable),
    }
}

/// Admit a host fault raised by a host function into sandboxed frames
///
/// Ordinary host errors with a registered shadow equivalent become catchable
/// shadow faults. Everything else, including every termination fault,
/// travels opaquely.
///
/// # Errors
///
/// Returns [`BridgeViolation::NestedCarrier`] if `fault` already encloses a carrier
pub fn admit(fault: HostFault, table: &TranslationTable) -> Result<Fault, BridgeViolation> {
    if fault.termination().is_some() || Carrier::is_enclosed_in(&fault) {
        return raise_opaque(fault);
    }
    match table.translate(fault.as_error()) {
        Some(throwable) => {
            tracing::debug!(class = %throwable.class, "host fault translated into shadow fault");
            Ok(Fault::Sandbox(throwable))
        }
        None => raise_opaque(fault),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::is_opaque_carrier;
    use proptest::prelude::*;
    use umbra_core::Termination;
    use umbra_shadow::ClassName;

    #[derive(Debug, thiserror::Error)]
    #[error("host sample {0}")]
    struct Sample(String);

    #[test]
    fn test_raise_opaque_produces_carrier() {
        let fault = raise_opaque(HostFault::new(Termination::Cancelled)).unwrap();
        assert!(is_opaque_carrier(&fault));
    }

    #[test]
    fn test_resolve_boundary_unwraps_carrier() {
        let fault = raise_opaque(HostFault::new(Termination::rule("no"))).unwrap();
        match resolve_boundary(fault) {
            Surfaced::Host(host) => {
                assert_eq!(host.termination(), Some(&Termination::rule("no")));
            }
            Surfaced::Sandbox(t) => panic!("unexpected sandbox fault {t}"),
        }
    }

    #[test]
    fn test_resolve_boundary_passes_shadow_fault_through() {
        let throwable = ShadowThrowable::new(ClassName::EXCEPTION).with_message("mine");
        match resolve_boundary(Fault::Sandbox(throwable.clone())) {
            Surfaced::Sandbox(t) => assert_eq!(t, throwable),
            Surfaced::Host(h) => panic!("unexpected host fault {h}"),
        }
    }

    #[test]
    fn test_raise_opaque_rejects_nested_carrier() {
        let Fault::Opaque(carrier) = raise_opaque(HostFault::new(Sample("a".into()))).unwrap()
        else {
            panic!("expected carrier");
        };
        let err = raise_opaque(HostFault::new(carrier)).unwrap_err();
        assert_eq!(err, BridgeViolation::NestedCarrier);
    }

    #[test]
    fn test_raise_opaque_rejects_layered_carrier() {
        let Fault::Opaque(carrier) = raise_opaque(HostFault::new(Sample("b".into()))).unwrap()
        else {
            panic!("expected carrier");
        };
        let err = raise_opaque(HostFault::new(HostFault::new(carrier))).unwrap_err();
        assert_eq!(err, BridgeViolation::NestedCarrier);
    }

    #[derive(Debug, thiserror::Error)]
    #[error("retry exhausted")]
    struct RetryExhausted(#[source] Carrier);

    #[test]
    fn test_admit_rejects_carrier_behind_translatable_error() {
        let Fault::Opaque(carrier) = raise_opaque(HostFault::new(Termination::Cancelled)).unwrap()
        else {
            panic!("expected carrier");
        };
        let mut table = TranslationTable::new();
        table.register::<RetryExhausted>(ClassName::ILLEGAL_STATE_EXCEPTION);
        let err = admit(HostFault::new(RetryExhausted(carrier)), &table).unwrap_err();
        assert_eq!(err, BridgeViolation::NestedCarrier);
    }

    #[test]
    fn test_admit_translates_registered_error() {
        let table = TranslationTable::with_defaults();
        let err = "x1".parse::<i64>().unwrap_err();
        let fault = admit(HostFault::new(err), &table).unwrap();
        let throwable = fault.as_sandbox().unwrap();
        assert_eq!(throwable.class.as_str(), ClassName::NUMBER_FORMAT_EXCEPTION);
    }

    #[test]
    fn test_admit_keeps_unknown_error_opaque() {
        let table = TranslationTable::with_defaults();
        let fault = admit(HostFault::new(Sample("io".into())), &table).unwrap();
        assert!(is_opaque_carrier(&fault));
    }

    #[test]
    fn test_admit_never_translates_termination() {
        let mut table = TranslationTable::new();
        table.register::<Termination>(ClassName::EXCEPTION);
        let fault = admit(HostFault::new(Termination::Cancelled), &table).unwrap();
        assert!(is_opaque_carrier(&fault));
    }

    #[test]
    fn test_admit_rejects_nested_carrier() {
        let Fault::Opaque(carrier) = raise_opaque(HostFault::new(Termination::Cancelled)).unwrap()
        else {
            panic!("expected carrier");
        };
        let err = admit(HostFault::new(carrier), &TranslationTable::new()).unwrap_err();
        assert_eq!(err, BridgeViolation::NestedCarrier);
    }

    proptest! {
        #[test]
        fn prop_raise_then_resolve_is_identity(message in ".*") {
            let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(Sample(message.clone()));
            let ptr = boxed.as_ref() as *const (dyn std::error::Error + Send + Sync) as *const ();

            let fault = raise_opaque(HostFault::from_boxed(boxed)).unwrap();
            let Surfaced::Host(host) = resolve_boundary(fault) else {
                return Err(TestCaseError::fail("carrier surfaced as sandbox fault"));
            };

            let inner = host.into_inner();
            prop_assert_eq!(inner.as_ref() as *const (dyn std::error::Error + Send + Sync) as *const (), ptr);
            prop_assert_eq!(inner.to_string(), format!("host sample {}", message));
        }
    }
}
