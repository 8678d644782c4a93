//! UMBRA Core Types
//!
//! Pure types shared by every UMBRA crate: identifiers, the core error
//! type, and the termination faults raised by the sandbox machinery.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod id;
pub mod termination;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use id::{ContextId, InvocationId};
pub use termination::Termination;
