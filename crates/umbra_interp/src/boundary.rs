//! The boundary of sandboxed execution.
//!
//! [`Boundary::invoke`] is the only way into sandboxed code. It runs the
//! interpreter and then resolves whatever fault is still in flight: shadow
//! faults surface as themselves, carriers are unwrapped into the original
//! host fault. Nothing that leaves this module can be a carrier.

use crate::config::InterpreterConfig;
use crate::context::ExecutionContext;
use crate::escape::{Defect, Escape};
use crate::host::{HostFunction, HostRegistry};
use crate::interpreter::{Abrupt, Interpreter};
use crate::program::Program;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use umbra_bridge::{resolve_boundary, Surfaced, TranslationTable};
use umbra_core::{ContextId, CoreError, CoreResult, InvocationId, Termination};
use umbra_shadow::{Hierarchy, ShadowThrowable};

/// Entry point for running a validated program
#[derive(Debug)]
pub struct Boundary {
    program: Program,
    hierarchy: Hierarchy,
    registry: HostRegistry,
    translations: TranslationTable,
    config: InterpreterConfig,
}

impl Boundary {
    /// Create a new boundary for `program`
    ///
    /// Starts with the standard host functions and default translations.
    ///
    /// # Errors
    ///
    /// Returns error if the program or the config is invalid
    pub fn new(program: Program, config: InterpreterConfig) -> CoreResult<Self> {
        config.validate()?;
        let hierarchy = program.validate()?;
        Ok(Self {
            program,
            hierarchy,
            registry: HostRegistry::with_standard_functions(),
            translations: TranslationTable::with_defaults(),
            config,
        })
    }

    /// Register an extra host function
    #[must_use]
    pub fn with_host_function(mut self, func: HostFunction) -> Self {
        self.registry.register(func);
        self
    }

    /// Replace the translation table
    #[must_use]
    pub fn with_translations(mut self, translations: TranslationTable) -> Self {
        self.translations = translations;
        self
    }

    /// The program
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The program's shadow hierarchy
    #[must_use]
    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// The config
    #[must_use]
    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Names of the host functions sandboxed code may call
    #[must_use]
    pub fn host_functions(&self) -> Vec<String> {
        self.registry.list()
    }

    /// Create a fresh context for this boundary
    #[must_use]
    pub fn new_context(&self) -> ExecutionContext {
        ExecutionContext::new(&self.config)
    }

    /// Invoke `entry` with `args` on `ctx`
    ///
    /// A panic inside the interpreter aborts the context and is then
    /// propagated to the caller unchanged.
    ///
    /// # Errors
    ///
    /// Returns the escaped fault: a sandbox fault, the original host fault,
    /// a defect, or a rejected invocation
    pub fn invoke(&self, ctx: &mut ExecutionContext, entry: &str, args: Vec<Value>) -> Result<Value, Escape> {
        let invocation = InvocationId::new();
        let span = tracing::info_span!("invoke", context = %ctx.id(), %invocation, entry);
        let _guard = span.enter();

        let Some((name, method)) = self.program.methods.get_key_value(entry) else {
            return Err(Escape::Rejected(CoreError::not_found("Method", entry)));
        };
        if method.params != args.len() {
            return Err(Escape::Rejected(CoreError::validation(
                entry,
                format!("expects {} arguments, got {}", method.params, args.len()),
            )));
        }
        ctx.begin()?;
        tracing::debug!("entering sandboxed code");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            Interpreter::new(
                &self.program,
                &self.hierarchy,
                &self.registry,
                &self.translations,
                &mut *ctx,
            )
            .run(name, method, args)
        }));

        match outcome {
            Ok(Ok(value)) => {
                ctx.finish();
                tracing::debug!(%value, "returned");
                Ok(value)
            }
            Ok(Err(Abrupt::Fault(fault))) => {
                ctx.finish();
                let surfaced = resolve_boundary(fault);
                match &surfaced {
                    Surfaced::Sandbox(throwable) => tracing::info!(%throwable, "uncaught sandbox fault"),
                    Surfaced::Host(fault) => tracing::info!(%fault, "host fault surfaced"),
                }
                Err(surfaced.into())
            }
            Ok(Err(Abrupt::Violation(violation))) => {
                tracing::error!(%violation, "bridge contract violated; aborting context");
                ctx.abort(violation.to_string());
                Err(Defect::from(violation).into())
            }
            Err(payload) => {
                tracing::error!("interpreter panicked; aborting context");
                ctx.abort("interpreter panicked");
                panic::resume_unwind(payload)
            }
        }
    }

    /// Run `entry` on a fresh context and summarise the outcome
    #[must_use]
    pub fn run(&self, entry: &str, args: Vec<Value>) -> ExecutionReport {
        let mut ctx = self.new_context();
        let result = self.invoke(&mut ctx, entry, args);
        ExecutionReport::new(&mut ctx, result)
    }
}

/// How an invocation ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Sandboxed code returned a value
    Returned {
        /// Returned value
        value: Value,
    },
    /// Sandboxed code's own fault escaped
    SandboxFault {
        /// The uncaught throwable
        throwable: ShadowThrowable,
    },
    /// A host fault surfaced
    HostFault {
        /// Display form of the host fault
        message: String,
        /// The termination, if the host fault was one
        termination: Option<Termination>,
    },
    /// A defect aborted the context
    Defect {
        /// Defect description
        message: String,
    },
    /// The invocation was rejected
    Rejected {
        /// Rejection reason
        message: String,
    },
}

/// Serializable summary of one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Context that ran
    pub context: ContextId,
    /// How it ended
    pub outcome: Outcome,
    /// Lines emitted by sandboxed code
    pub output: Vec<String>,
    /// Cost consumed
    pub cost_consumed: u64,
}

impl ExecutionReport {
    /// Summarise an invocation result, draining the context's output
    #[must_use]
    pub fn new(ctx: &mut ExecutionContext, result: Result<Value, Escape>) -> Self {
        let outcome = match result {
            Ok(value) => Outcome::Returned { value },
            Err(Escape::Sandbox(throwable)) => Outcome::SandboxFault { throwable },
            Err(Escape::Host(fault)) => Outcome::HostFault {
                message: fault.to_string(),
                termination: fault.termination().cloned(),
            },
            Err(Escape::Defect(defect)) => Outcome::Defect {
                message: defect.to_string(),
            },
            Err(Escape::Rejected(error)) => Outcome::Rejected {
                message: error.to_string(),
            },
        };
        Self {
            context: ctx.id(),
            outcome,
            output: ctx.take_output(),
            cost_consumed: ctx.cost_consumed(),
        }
    }

    /// Whether sandboxed code returned normally
    #[must_use]
    pub fn success(&self) -> bool {
        matches!(self.outcome, Outcome::Returned { .. })
    }
}
