//! Shadow exception classes and their hierarchy.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use umbra_core::{CoreError, CoreResult};

/// Name of a shadow exception class
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassName(String);

impl ClassName {
    /// Root of every shadow exception class
    pub const THROWABLE: &'static str = "Throwable";
    /// Root of recoverable exceptions
    pub const EXCEPTION: &'static str = "Exception";
    /// Root of serious errors
    pub const ERROR: &'static str = "Error";
    /// Unchecked exceptions
    pub const RUNTIME_EXCEPTION: &'static str = "RuntimeException";
    /// Arithmetic failures such as division by zero
    pub const ARITHMETIC_EXCEPTION: &'static str = "ArithmeticException";
    /// Bad argument
    pub const ILLEGAL_ARGUMENT_EXCEPTION: &'static str = "IllegalArgumentException";
    /// Malformed number
    pub const NUMBER_FORMAT_EXCEPTION: &'static str = "NumberFormatException";
    /// Bad state
    pub const ILLEGAL_STATE_EXCEPTION: &'static str = "IllegalStateException";
    /// Unsupported operation
    pub const UNSUPPORTED_OPERATION_EXCEPTION: &'static str = "UnsupportedOperationException";
    /// Index out of range
    pub const INDEX_OUT_OF_BOUNDS_EXCEPTION: &'static str = "IndexOutOfBoundsException";

    /// Create a class name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The root `Throwable` class
    #[must_use]
    pub fn throwable() -> Self {
        Self::new(Self::THROWABLE)
    }

    /// Get as string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClassName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Built-in classes as (name, parent) in definition order
const BUILTINS: &[(&str, &str)] = &[
    (ClassName::EXCEPTION, ClassName::THROWABLE),
    (ClassName::ERROR, ClassName::THROWABLE),
    (ClassName::RUNTIME_EXCEPTION, ClassName::EXCEPTION),
    (ClassName::ARITHMETIC_EXCEPTION, ClassName::RUNTIME_EXCEPTION),
    (ClassName::ILLEGAL_ARGUMENT_EXCEPTION, ClassName::RUNTIME_EXCEPTION),
    (ClassName::NUMBER_FORMAT_EXCEPTION, ClassName::ILLEGAL_ARGUMENT_EXCEPTION),
    (ClassName::ILLEGAL_STATE_EXCEPTION, ClassName::RUNTIME_EXCEPTION),
    (ClassName::UNSUPPORTED_OPERATION_EXCEPTION, ClassName::RUNTIME_EXCEPTION),
    (ClassName::INDEX_OUT_OF_BOUNDS_EXCEPTION, ClassName::RUNTIME_EXCEPTION),
];

/// The shadow exception hierarchy
///
/// A single-rooted tree under `Throwable`. Insertion order is preserved so
/// listings are deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hierarchy {
    /// Class -> parent (`None` only for the root)
    parents: IndexMap<ClassName, Option<ClassName>>,
}

impl Hierarchy {
    /// Create a hierarchy holding only the root class
    #[must_use]
    pub fn root_only() -> Self {
        let mut parents = IndexMap::new();
        parents.insert(ClassName::throwable(), None);
        Self { parents }
    }

    /// Create a hierarchy with all built-in classes
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut hierarchy = Self::root_only();
        for (name, parent) in BUILTINS {
            hierarchy
                .parents
                .insert(ClassName::new(*name), Some(ClassName::new(*parent)));
        }
        hierarchy
    }

    /// Define a new class under an existing parent
    ///
    /// # Errors
    ///
    /// Returns error if the class already exists or the parent is unknown
    pub fn define(&mut self, name: ClassName, parent: ClassName) -> CoreResult<()> {
        if self.parents.contains_key(&name) {
            return Err(CoreError::AlreadyExists {
                kind: "Class".to_string(),
                id: name.to_string(),
            });
        }
        if !self.parents.contains_key(&parent) {
            return Err(CoreError::not_found("Class", parent.to_string()));
        }
        self.parents.insert(name, Some(parent));
        Ok(())
    }

    /// Check whether a class is known
    #[must_use]
    pub fn contains(&self, name: &ClassName) -> bool {
        self.parents.contains_key(name)
    }

    /// Get the parent of a class
    #[must_use]
    pub fn parent(&self, name: &ClassName) -> Option<&ClassName> {
        self.parents.get(name).and_then(Option::as_ref)
    }

    /// Check whether `child` is `ancestor` or descends from it
    ///
    /// Unknown classes are never subclasses of anything.
    #[must_use]
    pub fn is_subclass_of(&self, child: &ClassName, ancestor: &ClassName) -> bool {
        let mut current = Some(child);
        while let Some(name) = current {
            if !self.parents.contains_key(name) {
                return false;
            }
            if name == ancestor {
                return true;
            }
            current = self.parent(name);
        }
        false
    }

    /// Chain from a class up to the root, inclusive
    #[must_use]
    pub fn ancestry(&self, name: &ClassName) -> Vec<ClassName> {
        let mut chain = Vec::new();
        let mut current = self.contains(name).then_some(name);
        while let Some(class) = current {
            chain.push(class.clone());
            current = self.parent(class);
        }
        chain
    }

    /// Number of classes
    #[must_use]
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    /// Always false: the root class is always present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Iterate over class names in definition order
    pub fn classes(&self) -> impl Iterator<Item = &ClassName> {
        self.parents.keys()
    }
}

impl Default for Hierarchy {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_present() {
        let h = Hierarchy::with_builtins();
        assert!(h.contains(&ClassName::throwable()));
        assert!(h.contains(&ClassName::new(ClassName::ARITHMETIC_EXCEPTION)));
        assert_eq!(h.len(), BUILTINS.len() + 1);
    }

    #[test]
    fn test_is_subclass_of_reflexive() {
        let h = Hierarchy::with_builtins();
        let exc = ClassName::new(ClassName::EXCEPTION);
        assert!(h.is_subclass_of(&exc, &exc));
    }

    #[test]
    fn test_is_subclass_of_transitive() {
        let h = Hierarchy::with_builtins();
        let nfe = ClassName::new(ClassName::NUMBER_FORMAT_EXCEPTION);
        assert!(h.is_subclass_of(&nfe, &ClassName::new(ClassName::RUNTIME_EXCEPTION)));
        assert!(h.is_subclass_of(&nfe, &ClassName::throwable()));
        assert!(!h.is_subclass_of(&nfe, &ClassName::new(ClassName::ERROR)));
    }

    #[test]
    fn test_unknown_class_matches_nothing() {
        let h = Hierarchy::with_builtins();
        let ghost = ClassName::new("Ghost");
        assert!(!h.is_subclass_of(&ghost, &ClassName::throwable()));
        assert!(!h.is_subclass_of(&ghost, &ghost));
    }

    #[test]
    fn test_define_user_class() {
        let mut h = Hierarchy::with_builtins();
        h.define("MyBaseException".into(), ClassName::EXCEPTION.into())
            .unwrap();
        h.define("MyExampleException".into(), "MyBaseException".into())
            .unwrap();
        assert!(h.is_subclass_of(
            &"MyExampleException".into(),
            &ClassName::new(ClassName::EXCEPTION)
        ));
        assert_eq!(
            h.ancestry(&"MyExampleException".into()),
            vec![
                ClassName::new("MyExampleException"),
                ClassName::new("MyBaseException"),
                ClassName::new(ClassName::EXCEPTION),
                ClassName::throwable(),
            ]
        );
    }

    #[test]
    fn test_define_duplicate_rejected() {
        let mut h = Hierarchy::with_builtins();
        let err = h
            .define(ClassName::EXCEPTION.into(), ClassName::THROWABLE.into())
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists { .. }));
    }

    #[test]
    fn test_define_unknown_parent_rejected() {
        let mut h = Hierarchy::with_builtins();
        let err = h.define("Orphan".into(), "Missing".into()).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn test_class_name_serde_transparent() {
        let json = serde_json::to_string(&ClassName::throwable()).unwrap();
        assert_eq!(json, "\"Throwable\"");
    }
}
