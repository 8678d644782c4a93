//! Per-context execution state.
//!
//! An [`ExecutionContext`] is one logical thread of sandboxed execution. It
//! owns the cost meter, the cancellation token and the output log. Faults in
//! flight never live here: they stay on the interpreter's call stack.

use crate::config::InterpreterConfig;
use crate::cost::{CostKind, CostLimits, CostMeter};
use crate::escape::Defect;
use crate::host::HostContext;
use tokio_util::sync::CancellationToken;
use umbra_core::{ContextId, Termination};

/// Context lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextState {
    /// Ready to run
    Ready,
    /// Sandboxed code is running
    Running,
    /// Last invocation completed (normally or by fault)
    Finished,
    /// A defect aborted the context; it cannot run again
    Aborted(String),
}

/// Execution context for sandboxed code
#[derive(Debug)]
pub struct ExecutionContext {
    id: ContextId,
    state: ContextState,
    meter: CostMeter,
    limits: CostLimits,
    max_call_depth: usize,
    cleanup_allowance: u64,
    overrun_remaining: u64,
    budget_tripped: bool,
    cancellation: CancellationToken,
    cancel_delivered: bool,
    output: Vec<String>,
}

impl ExecutionContext {
    /// Create a new context
    #[must_use]
    pub fn new(config: &InterpreterConfig) -> Self {
        Self {
            id: ContextId::new(),
            state: ContextState::Ready,
            meter: CostMeter::new(config.max_cost),
            limits: config.limits.clone(),
            max_call_depth: config.max_call_depth,
            cleanup_allowance: config.cleanup_allowance,
            overrun_remaining: config.cleanup_allowance,
            budget_tripped: false,
            cancellation: CancellationToken::new(),
            cancel_delivered: false,
            output: Vec::new(),
        }
    }

    /// Context ID
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> &ContextState {
        &self.state
    }

    /// Lines emitted by sandboxed code so far
    #[must_use]
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Take the emitted lines, leaving the log empty
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    /// Cost consumed from the budget so far
    #[must_use]
    pub fn cost_consumed(&self) -> u64 {
        self.meter.consumed()
    }

    /// Budget remaining
    #[must_use]
    pub fn remaining_cost(&self) -> u64 {
        self.meter.remaining()
    }

    /// Maximum call depth
    #[must_use]
    pub fn max_call_depth(&self) -> usize {
        self.max_call_depth
    }

    /// Token the host can use to cancel this context from any thread
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Request cancellation at the next safe point
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub(crate) fn host_context(&self) -> HostContext {
        HostContext {
            context_id: self.id,
            cancellation: self.cancellation.clone(),
        }
    }

    pub(crate) fn record(&mut self, line: String) {
        self.output.push(line);
    }

    /// Charge one operation of `kind`
    pub(crate) fn charge(&mut self, kind: CostKind) -> Result<(), Termination> {
        self.charge_amount(self.limits.cost_of(kind))
    }

    /// Charge an explicit amount
    ///
    /// The first failure trips the budget. From then on every charge in the
    /// invocation is drawn from the post-exhaustion allowance, not only those
    /// made by cleanup regions. Cleanup code and the instructions that carry
    /// the termination back to the boundary share it.
    pub(crate) fn charge_amount(&mut self, amount: u64) -> Result<(), Termination> {
        if self.budget_tripped {
            if amount > self.overrun_remaining {
                self.overrun_remaining = 0;
                return Err(Termination::threshold("cleanup allowance", self.cleanup_allowance));
            }
            self.overrun_remaining -= amount;
            return Ok(());
        }
        match self.meter.consume(amount) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::debug!(error = %e, "cost budget tripped");
                self.budget_tripped = true;
                Err(Termination::threshold("cost", self.meter.initial()))
            }
        }
    }

    /// Cancellation observed at a safe point, delivered once per invocation
    pub(crate) fn poll_cancellation(&mut self) -> Option<Termination> {
        if self.cancel_delivered || !self.cancellation.is_cancelled() {
            return None;
        }
        self.cancel_delivered = true;
        Some(Termination::Cancelled)
    }

    pub(crate) fn begin(&mut self) -> Result<(), Defect> {
        if let ContextState::Aborted(_) = self.state {
            return Err(Defect::ContextAborted(self.id));
        }
        self.state = ContextState::Running;
        self.cancel_delivered = false;
        self.budget_tripped = false;
        self.overrun_remaining = self.cleanup_allowance;
        Ok(())
    }

    pub(crate) fn finish(&mut self) {
        self.state = ContextState::Finished;
    }

    pub(crate) fn abort(&mut self, reason: impl Into<String>) {
        self.state = ContextState::Aborted(reason.into());
    }
}
