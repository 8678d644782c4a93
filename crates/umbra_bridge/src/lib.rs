//! UMBRA Exception Bridge
//!
//! Host-native faults (resource exhaustion, rule violations, cancellation,
//! arbitrary host errors) sometimes have to unwind through frames of
//! sandboxed code. They do so inside a [`Carrier`]: an opaque value that the
//! interpreter propagates like any other throw, that no sandboxed catch
//! clause can match, and that is unwrapped back into the original host fault
//! at the boundary of sandboxed execution.
//!
//! The lifecycle of a bridged fault is:
//!
//! 1. [`raise_opaque`] wraps a [`HostFault`] into [`Fault::Opaque`].
//! 2. The interpreter unwinds with it. Its dispatcher consults
//!    [`is_opaque_carrier`] before any type-based catch match.
//! 3. [`resolve_boundary`] unwraps it into [`Surfaced::Host`].
//!
//! A carrier can only be created and destroyed by those two operations.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod carrier;
pub mod fault;
pub mod host;
pub mod translate;

pub use bridge::{admit, raise_opaque, resolve_boundary, BridgeViolation, Surfaced};
pub use carrier::Carrier;
pub use fault::{is_opaque_carrier, Fault};
pub use host::HostFault;
pub use translate::TranslationTable;
