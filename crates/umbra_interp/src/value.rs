//! Values manipulated by sandboxed code.

use serde::{Deserialize, Serialize};
use umbra_shadow::ShadowThrowable;

/// A sandbox value
///
/// No variant can hold a host fault or a carrier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// No value
    #[default]
    Unit,
    /// Boolean
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// String
    Str(String),
    /// A shadow exception object
    Throwable(ShadowThrowable),
}

impl Value {
    /// Name of the value's type, for diagnostics
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "str",
            Self::Throwable(_) => "throwable",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unit => write!(f, "()"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Str(s) => f.write_str(s),
            Self::Throwable(t) => write!(f, "{}", t),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
