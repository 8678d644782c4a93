//! Exception dispatch: the single place faults are matched against handlers.
//!
//! Every frame the interpreter unwinds goes through [`dispatch`]. Carriers
//! are recognised with [`is_opaque_carrier`] before any catch entry is
//! looked at, so no catch clause, however broad, can ever receive one.
//! Finally entries still apply to carriers; the interpreter runs those
//! cleanups in opaque mode.

use crate::program::HandlerEntry;
use std::ops::Range;
use umbra_bridge::{is_opaque_carrier, Fault};
use umbra_shadow::{Hierarchy, ShadowThrowable};

/// Outcome of dispatching a fault within one frame
#[derive(Debug)]
pub enum Dispatched {
    /// A catch entry matched; control moves to `handler` with the throwable
    Caught {
        /// Handler entry point
        handler: usize,
        /// The caught throwable
        throwable: ShadowThrowable,
    },
    /// A finally entry applies; its cleanup region runs with the fault pending
    Cleanup {
        /// Cleanup region
        region: Range<usize>,
        /// The pending fault
        fault: Fault,
    },
    /// Nothing in this frame applies; unwind to the caller
    Unwind(Fault),
}

/// Find the handler for a fault raised at `pc`
///
/// Entries are searched in table order. When `within` is given, only entries
/// whose protected range lies inside it are eligible.
#[must_use]
pub fn dispatch(
    table: &[HandlerEntry],
    pc: usize,
    fault: Fault,
    hierarchy: &Hierarchy,
    within: Option<&Range<usize>>,
) -> Dispatched {
    let opaque = is_opaque_carrier(&fault);

    let eligible = table.iter().filter(|entry| entry.covers(pc)).filter(|entry| {
        within.is_none_or(|region| {
            let protected = entry.protected();
            region.start <= protected.start && protected.end <= region.end
        })
    });

    for entry in eligible {
        match entry {
            HandlerEntry::Catch { class, handler, .. } => {
                if opaque {
                    tracing::trace!(pc, %class, "catch entry skipped for carrier");
                    continue;
                }
                let matched = fault
                    .as_sandbox()
                    .is_some_and(|throwable| hierarchy.is_subclass_of(&throwable.class, class));
                if matched {
                    if let Fault::Sandbox(throwable) = fault {
                        return Dispatched::Caught {
                            handler: *handler,
                            throwable,
                        };
                    }
                }
            }
            HandlerEntry::Finally { handler, end, .. } => {
                return Dispatched::Cleanup {
                    region: *handler..*end,
                    fault,
                };
            }
        }
    }
    Dispatched::Unwind(fault)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use umbra_bridge::{raise_opaque, HostFault};
    use umbra_core::Termination;
    use umbra_shadow::ClassName;

    fn carrier() -> Fault {
        raise_opaque(HostFault::new(Termination::Cancelled)).unwrap()
    }

    fn shadow(class: &str) -> Fault {
        Fault::Sandbox(ShadowThrowable::new(class))
    }

    #[test]
    fn test_catch_matches_subclass() {
        let table = vec![HandlerEntry::catch(0, 4, ClassName::RUNTIME_EXCEPTION, 10)];
        let h = Hierarchy::with_builtins();
        match dispatch(&table, 2, shadow(ClassName::ARITHMETIC_EXCEPTION), &h, None) {
            Dispatched::Caught { handler, throwable } => {
                assert_eq!(handler, 10);
                assert_eq!(throwable.class.as_str(), ClassName::ARITHMETIC_EXCEPTION);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_first_matching_entry_wins() {
        let table = vec![
            HandlerEntry::catch(0, 4, ClassName::ARITHMETIC_EXCEPTION, 10),
            HandlerEntry::catch(0, 4, ClassName::THROWABLE, 20),
        ];
        let h = Hierarchy::with_builtins();
        let result = dispatch(&table, 0, shadow(ClassName::ILLEGAL_STATE_EXCEPTION), &h, None);
        assert!(matches!(result, Dispatched::Caught { handler: 20, .. }));
    }

    #[test]
    fn test_uncovered_pc_unwinds() {
        let table = vec![HandlerEntry::catch(0, 4, ClassName::THROWABLE, 10)];
        let h = Hierarchy::with_builtins();
        let result = dispatch(&table, 4, shadow(ClassName::EXCEPTION), &h, None);
        assert!(matches!(result, Dispatched::Unwind(_)));
    }

    #[test]
    fn test_carrier_skips_root_catch() {
        let table = vec![HandlerEntry::catch(0, 4, ClassName::THROWABLE, 10)];
        let h = Hierarchy::with_builtins();
        match dispatch(&table, 1, carrier(), &h, None) {
            Dispatched::Unwind(fault) => assert!(is_opaque_carrier(&fault)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_carrier_reaches_finally_after_skipped_catch() {
        let table = vec![
            HandlerEntry::catch(0, 4, ClassName::THROWABLE, 10),
            HandlerEntry::finally(0, 4, 20, 22),
        ];
        let h = Hierarchy::with_builtins();
        match dispatch(&table, 1, carrier(), &h, None) {
            Dispatched::Cleanup { region, fault } => {
                assert_eq!(region, 20..22);
                assert!(is_opaque_carrier(&fault));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_within_restricts_entries() {
        let table = vec![
            HandlerEntry::catch(0, 30, ClassName::THROWABLE, 40),
            HandlerEntry::catch(21, 23, ClassName::EXCEPTION, 25),
        ];
        let h = Hierarchy::with_builtins();
        let region = 20..28;
        let result = dispatch(&table, 22, shadow(ClassName::ERROR), &h, Some(&region));
        assert!(matches!(result, Dispatched::Unwind(_)));
        let result = dispatch(&table, 22, shadow(ClassName::EXCEPTION), &h, Some(&region));
        assert!(matches!(result, Dispatched::Caught { handler: 25, .. }));
    }

    fn class_strategy() -> impl Strategy<Value = &'static str> {
        prop_oneof![
            Just(ClassName::THROWABLE),
            Just(ClassName::EXCEPTION),
            Just(ClassName::ERROR),
            Just(ClassName::RUNTIME_EXCEPTION),
            Just(ClassName::ARITHMETIC_EXCEPTION),
            Just(ClassName::ILLEGAL_STATE_EXCEPTION),
        ]
    }

    proptest! {
        #[test]
        fn prop_carrier_never_caught(
            classes in proptest::collection::vec(class_strategy(), 1..8),
            pc in 0usize..10,
        ) {
            let table: Vec<_> = classes
                .iter()
                .enumerate()
                .map(|(i, class)| HandlerEntry::catch(0, 10, *class, 100 + i))
                .collect();
            let h = Hierarchy::with_builtins();
            let result = dispatch(&table, pc, carrier(), &h, None);
            prop_assert!(matches!(result, Dispatched::Unwind(ref f) if is_opaque_carrier(f)));
        }

        #[test]
        fn prop_root_catch_takes_every_shadow_fault(class in class_strategy(), pc in 0usize..10) {
            let table = vec![HandlerEntry::catch(0, 10, ClassName::THROWABLE, 50)];
            let h = Hierarchy::with_builtins();
            let result = dispatch(&table, pc, shadow(class), &h, None);
            let caught = matches!(result, Dispatched::Caught { handler: 50, .. });
            prop_assert!(caught);
        }
    }
}
