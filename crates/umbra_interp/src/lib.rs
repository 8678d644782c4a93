//! UMBRA Interpreter
//!
//! A small deterministic stack interpreter for sandboxed code, and the
//! boundary trampoline that is the only way into it.
//!
//! Sandboxed code throws and catches shadow throwables from a closed class
//! hierarchy. Host faults (cost exhaustion, cancellation, rule violations,
//! host function errors) unwind through it as opaque carriers that no catch
//! clause can match; cleanup blocks still run for them. At the boundary every
//! carrier is unwrapped and the original host fault is returned.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod boundary;
pub mod config;
pub mod context;
pub mod cost;
pub mod dispatch;
pub mod escape;
pub mod host;
mod interpreter;
pub mod program;
pub mod value;

// Re-exports
pub use boundary::{Boundary, ExecutionReport, Outcome};
pub use config::InterpreterConfig;
pub use context::{ContextState, ExecutionContext};
pub use cost::{CostKind, CostLimits};
pub use dispatch::{dispatch, Dispatched};
pub use escape::{Defect, Escape};
pub use host::{HostContext, HostFn, HostFunction, HostRegistry};
pub use program::{ClassDecl, HandlerEntry, Instruction, Method, Program};
pub use value::Value;
