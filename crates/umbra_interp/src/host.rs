//! Host functions callable from sandboxed code.

use crate::value::Value;
use indexmap::IndexMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use umbra_bridge::HostFault;
use umbra_core::{ContextId, Termination};

/// Host function implementation
pub type HostFn = Arc<dyn Fn(&[Value], &HostContext) -> Result<Value, HostFault> + Send + Sync>;

/// Context handed to a host function
#[derive(Debug, Clone)]
pub struct HostContext {
    /// Context making the call
    pub context_id: ContextId,
    /// Cancellation token of that context
    pub cancellation: CancellationToken,
}

/// Host function definition
#[derive(Clone)]
pub struct HostFunction {
    /// Function name
    pub name: String,
    /// Cost charged on top of the base host call cost
    pub cost: u64,
    implementation: HostFn,
}

impl HostFunction {
    /// Create a new host function
    #[must_use]
    pub fn new(name: impl Into<String>, cost: u64, implementation: HostFn) -> Self {
        Self {
            name: name.into(),
            cost,
            implementation,
        }
    }

    /// Call the host function
    ///
    /// # Errors
    ///
    /// Returns the host fault raised by the implementation
    pub fn call(&self, args: &[Value], ctx: &HostContext) -> Result<Value, HostFault> {
        (self.implementation)(args, ctx)
    }
}

impl std::fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("cost", &self.cost)
            .finish_non_exhaustive()
    }
}

/// Registry of host functions
#[derive(Debug, Clone, Default)]
pub struct HostRegistry {
    functions: IndexMap<String, HostFunction>,
}

impl HostRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host function, replacing any function of the same name
    pub fn register(&mut self, func: HostFunction) {
        self.functions.insert(func.name.clone(), func);
    }

    /// Register a host function, builder style
    #[must_use]
    pub fn with(mut self, func: HostFunction) -> Self {
        self.register(func);
        self
    }

    /// Get a function by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&HostFunction> {
        self.functions.get(name)
    }

    /// List registered function names in registration order
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    /// Create a registry with the standard host functions
    #[must_use]
    pub fn with_standard_functions() -> Self {
        Self::new()
            .with(HostFunction::new(
                "log",
                10,
                Arc::new(|args: &[Value], ctx: &HostContext| {
                    let line = args.iter().map(Value::to_string).collect::<Vec<_>>().join(" ");
                    tracing::debug!(context = %ctx.context_id, "guest log: {}", line);
                    Ok(Value::Unit)
                }),
            ))
            .with(HostFunction::new(
                "parse_int",
                20,
                Arc::new(|args: &[Value], _ctx: &HostContext| match args {
                    [Value::Str(text)] => text
                        .trim()
                        .parse::<i64>()
                        .map(Value::Int)
                        .map_err(HostFault::new),
                    _ => Err(Termination::rule("parse_int expects one string").into()),
                }),
            ))
            .with(HostFunction::new(
                "len",
                5,
                Arc::new(|args: &[Value], _ctx: &HostContext| match args {
                    [Value::Str(text)] => Ok(Value::Int(text.chars().count() as i64)),
                    _ => Err(Termination::rule("len expects one string").into()),
                }),
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> HostContext {
        HostContext {
            context_id: ContextId::new(),
            cancellation: CancellationToken::new(),
        }
    }

    #[test]
    fn test_registry_register_and_get() {
        let registry = HostRegistry::new().with(HostFunction::new(
            "answer",
            1,
            Arc::new(|_args: &[Value], _ctx: &HostContext| Ok(Value::Int(42))),
        ));
        let func = registry.get("answer").unwrap();
        assert_eq!(func.call(&[], &ctx()).unwrap(), Value::Int(42));
    }

    #[test]
    fn test_standard_functions_listed_in_order() {
        let registry = HostRegistry::with_standard_functions();
        assert_eq!(registry.list(), vec!["log", "parse_int", "len"]);
    }

    #[test]
    fn test_parse_int_success() {
        let registry = HostRegistry::with_standard_functions();
        let result = registry
            .get("parse_int")
            .unwrap()
            .call(&[Value::from(" 12 ")], &ctx())
            .unwrap();
        assert_eq!(result, Value::Int(12));
    }

    #[test]
    fn test_parse_int_failure_is_parse_error() {
        let registry = HostRegistry::with_standard_functions();
        let fault = registry
            .get("parse_int")
            .unwrap()
            .call(&[Value::from("twelve")], &ctx())
            .unwrap_err();
        assert!(fault.is::<std::num::ParseIntError>());
    }

    #[test]
    fn test_len_wrong_argument_is_rule_violation() {
        let registry = HostRegistry::with_standard_functions();
        let fault = registry
            .get("len")
            .unwrap()
            .call(&[Value::Int(1)], &ctx())
            .unwrap_err();
        assert!(matches!(fault.termination(), Some(Termination::RuleViolation(_))));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = HostRegistry::with_standard_functions();
        registry.register(HostFunction::new(
            "len",
            1,
            Arc::new(|_args: &[Value], _ctx: &HostContext| Ok(Value::Int(0))),
        ));
        assert_eq!(registry.list().len(), 3);
        assert_eq!(registry.get("len").unwrap().cost, 1);
    }
}
