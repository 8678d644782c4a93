//! Interpreter configuration.

use crate::cost::CostLimits;
use serde::{Deserialize, Serialize};
use std::path::Path;
use umbra_core::{CoreError, CoreResult};

/// Interpreter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Cost budget per context
    pub max_cost: u64,
    /// Maximum number of sandboxed frames on the call stack
    pub max_call_depth: usize,
    /// Cost any code may still spend after the budget is exhausted
    ///
    /// Once the budget trips, every later charge in the invocation draws from
    /// this allowance, whether or not it comes from a cleanup region.
    pub cleanup_allowance: u64,
    /// Cost charged per operation kind
    pub limits: CostLimits,
}

impl InterpreterConfig {
    /// Create a new config
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_cost: 10_000_000,
            max_call_depth: 256,
            cleanup_allowance: 10_000,
            limits: CostLimits::new(),
        }
    }

    /// Set the cost budget
    #[must_use]
    pub fn with_max_cost(mut self, cost: u64) -> Self {
        self.max_cost = cost;
        self
    }

    /// Set the maximum call depth
    #[must_use]
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Set the cleanup allowance
    #[must_use]
    pub fn with_cleanup_allowance(mut self, allowance: u64) -> Self {
        self.cleanup_allowance = allowance;
        self
    }

    /// Set the cost table
    #[must_use]
    pub fn with_limits(mut self, limits: CostLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Check the config is usable
    ///
    /// # Errors
    ///
    /// Returns error if the call depth is zero
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_call_depth == 0 {
            return Err(CoreError::validation("max_call_depth", "must be at least 1"));
        }
        Ok(())
    }

    /// Parse a config from JSON; missing fields take their defaults
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or the config is invalid
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| CoreError::NotFound {
            kind: "Config file".to_string(),
            id: format!("{} ({})", path.display(), e),
        })?;
        Self::from_json(&json)
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self::new()
    }
}
