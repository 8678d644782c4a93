//! Translation of ordinary host errors into shadow exceptions.
//!
//! Some host errors correspond to exceptions sandboxed code is entitled to
//! catch, such as a malformed number handed to a parsing host function. Those
//! are registered here and surface as shadow throwables. Unregistered errors
//! stay opaque.

use indexmap::IndexMap;
use std::any::TypeId;
use std::error::Error;
use umbra_shadow::{ClassName, ShadowThrowable};

type Matcher = fn(&(dyn Error + 'static)) -> bool;

fn matches<E: Error + 'static>(error: &(dyn Error + 'static)) -> bool {
    error.is::<E>()
}

#[derive(Debug, Clone)]
struct Translation {
    class: ClassName,
    matcher: Matcher,
}

/// Registry mapping host error types to shadow classes
#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    entries: IndexMap<TypeId, Translation>,
}

impl TranslationTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with the standard library translations
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.register::<std::num::ParseIntError>(ClassName::NUMBER_FORMAT_EXCEPTION);
        table.register::<std::num::ParseFloatError>(ClassName::NUMBER_FORMAT_EXCEPTION);
        table.register::<std::str::Utf8Error>(ClassName::ILLEGAL_ARGUMENT_EXCEPTION);
        table.register::<std::string::FromUtf8Error>(ClassName::ILLEGAL_ARGUMENT_EXCEPTION);
        table
    }

    /// Map host error type `E` to a shadow class, replacing any earlier mapping
    pub fn register<E: Error + 'static>(&mut self, class: impl Into<ClassName>) {
        self.entries.insert(
            TypeId::of::<E>(),
            Translation {
                class: class.into(),
                matcher: matches::<E>,
            },
        );
    }

    /// Number of registered translations
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no translations are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn class_for(&self, error: &(dyn Error + 'static)) -> Option<&ClassName> {
        self.entries
            .values()
            .find(|t| (t.matcher)(error))
            .map(|t| &t.class)
    }

    /// Translate a host error and its cause chain
    ///
    /// Returns `None` when the outermost error is not registered. Causes that
    /// are not registered are dropped from the chain.
    #[must_use]
    pub fn translate(&self, error: &(dyn Error + 'static)) -> Option<ShadowThrowable> {
        let class = self.class_for(error)?;
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            if let Some(cause_class) = self.class_for(cause) {
                causes.push(ShadowThrowable::new(cause_class.clone()).with_message(cause.to_string()));
            }
            source = cause.source();
        }

        let cause = causes
            .into_iter()
            .rev()
            .reduce(|inner, outer| outer.with_cause(inner));

        let throwable = ShadowThrowable::new(class.clone()).with_message(error.to_string());
        Some(match cause {
            Some(cause) => throwable.with_cause(cause),
            None => throwable,
        })
    }
}
