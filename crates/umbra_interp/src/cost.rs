//! Deterministic cost accounting for sandboxed execution.

use serde::{Deserialize, Serialize};

/// Kind of operation being charged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CostKind {
    /// Any executed instruction
    Instruction,
    /// Entering a sandboxed method
    Invocation,
    /// Throwing a fault
    Throw,
    /// Creating a throwable
    Allocation,
    /// Calling a host function (on top of the function's own cost)
    HostCall,
}

/// Budget of one execution context
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CostMeter {
    remaining: u64,
    initial: u64,
    consumed: u64,
}

impl CostMeter {
    pub(crate) fn new(budget: u64) -> Self {
        Self {
            remaining: budget,
            initial: budget,
            consumed: 0,
        }
    }

    /// Consume budget for an operation; on failure nothing is consumed
    pub(crate) fn consume(&mut self, amount: u64) -> Result<(), CostError> {
        if amount > self.remaining {
            return Err(CostError::Exhausted {
                requested: amount,
                remaining: self.remaining,
            });
        }
        self.remaining -= amount;
        self.consumed += amount;
        Ok(())
    }

    pub(crate) fn remaining(&self) -> u64 {
        self.remaining
    }

    pub(crate) fn consumed(&self) -> u64 {
        self.consumed
    }

    pub(crate) fn initial(&self) -> u64 {
        self.initial
    }
}

/// Cost charged per operation kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostLimits {
    /// Cost per executed instruction
    pub instruction: u64,
    /// Cost per method invocation
    pub invocation: u64,
    /// Cost per throw
    pub throw: u64,
    /// Cost per throwable allocation
    pub allocation: u64,
    /// Base cost per host call
    pub host_call: u64,
}

impl CostLimits {
    /// Create the default cost table
    #[must_use]
    pub fn new() -> Self {
        Self {
            instruction: 1,
            invocation: 10,
            throw: 20,
            allocation: 10,
            host_call: 100,
        }
    }

    /// Cost of one operation of `kind`
    #[must_use]
    pub fn cost_of(&self, kind: CostKind) -> u64 {
        match kind {
            CostKind::Instruction => self.instruction,
            CostKind::Invocation => self.invocation,
            CostKind::Throw => self.throw,
            CostKind::Allocation => self.allocation,
            CostKind::HostCall => self.host_call,
        }
    }
}

impl Default for CostLimits {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum CostError {
    #[error("Cost budget exhausted: requested {requested}, remaining {remaining}")]
    Exhausted { requested: u64, remaining: u64 },
}
