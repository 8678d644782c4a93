//! Shadow throwable values.

use crate::class::ClassName;
use serde::{Deserialize, Serialize};

/// An exception object visible to sandboxed code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowThrowable {
    /// Runtime class
    pub class: ClassName,
    /// Detail message
    pub message: Option<String>,
    /// Underlying cause
    pub cause: Option<Box<ShadowThrowable>>,
}

impl ShadowThrowable {
    /// Create a throwable with no message
    #[must_use]
    pub fn new(class: impl Into<ClassName>) -> Self {
        Self {
            class: class.into(),
            message: None,
            cause: None,
        }
    }

    /// Set the message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Set the cause
    #[must_use]
    pub fn with_cause(mut self, cause: ShadowThrowable) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Iterate over this throwable and its causes, outermost first
    pub fn chain(&self) -> impl Iterator<Item = &ShadowThrowable> {
        std::iter::successors(Some(self), |t| t.cause.as_deref())
    }
}

impl std::fmt::Display for ShadowThrowable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.class, message),
            None => write!(f, "{}", self.class),
        }
    }
}
