//! UMBRA Shadow Hierarchy
//!
//! The exception types sandboxed code is allowed to see. Catch clauses in
//! sandboxed programs only ever match against classes registered in a
//! [`Hierarchy`]; host fault types have no place in it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod class;
pub mod throwable;

pub use class::{ClassName, Hierarchy};
pub use throwable::ShadowThrowable;
