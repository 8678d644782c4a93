//! The instruction loop.
//!
//! The interpreter runs one boundary invocation to completion on its own
//! frame stack. Faults in flight are values: a raised fault is handed to
//! [`dispatch`] frame by frame until a catch or a cleanup takes it, or the
//! stack is empty and the boundary gets it back.
//!
//! A cleanup region entered for a carrier runs in opaque mode. The carrier
//! waits in the frame's pending slot and is resumed when the region ends,
//! whichever way it ends. Shadow faults raised inside the region may be
//! caught by handlers nested in it; anything that would escape the region is
//! discarded in favour of the carrier.

use crate::context::ExecutionContext;
use crate::cost::CostKind;
use crate::dispatch::{dispatch, Dispatched};
use crate::host::HostRegistry;
use crate::program::{Instruction, Method, Program};
use crate::value::Value;
use std::ops::Range;
use umbra_bridge::{admit, is_opaque_carrier, raise_opaque, BridgeViolation, Fault, TranslationTable};
use umbra_core::Termination;
use umbra_shadow::{ClassName, Hierarchy, ShadowThrowable};

/// How an interpreter run ended, other than by returning
#[derive(Debug)]
pub(crate) enum Abrupt {
    /// A fault unwound every frame
    Fault(Fault),
    /// The bridge contract was violated
    Violation(BridgeViolation),
}

#[derive(Debug)]
enum Interrupt {
    Terminate(Termination),
    Violation(BridgeViolation),
}

impl From<Termination> for Interrupt {
    fn from(termination: Termination) -> Self {
        Self::Terminate(termination)
    }
}

impl From<BridgeViolation> for Interrupt {
    fn from(violation: BridgeViolation) -> Self {
        Self::Violation(violation)
    }
}

enum Step<'a> {
    Next,
    Jump(usize),
    Raise(Fault),
    Return(Value),
    Invoke {
        name: &'a str,
        method: &'a Method,
        args: Vec<Value>,
    },
}

/// A cleanup region running with a fault pending
#[derive(Debug)]
struct PendingCleanup {
    region: Range<usize>,
    fault: Fault,
}

#[derive(Debug)]
struct Frame<'a> {
    name: &'a str,
    method: &'a Method,
    pc: usize,
    stack: Vec<Value>,
    locals: Vec<Value>,
    cleanups: Vec<PendingCleanup>,
}

impl<'a> Frame<'a> {
    fn new(name: &'a str, method: &'a Method, args: Vec<Value>) -> Self {
        let mut locals = args;
        locals.resize(method.locals.max(locals.len()), Value::Unit);
        Self {
            name,
            method,
            pc: 0,
            stack: Vec::new(),
            locals,
            cleanups: Vec::new(),
        }
    }

    fn pop(&mut self) -> Result<Value, Termination> {
        self.stack
            .pop()
            .ok_or_else(|| Termination::rule(format!("operand stack underflow in {}", self.name)))
    }

    fn pop_int(&mut self) -> Result<i64, Termination> {
        match self.pop()? {
            Value::Int(value) => Ok(value),
            other => Err(Termination::rule(format!("expected int, found {}", other.type_name()))),
        }
    }

    fn pop_n(&mut self, count: usize) -> Result<Vec<Value>, Termination> {
        if self.stack.len() < count {
            return Err(Termination::rule(format!("operand stack underflow in {}", self.name)));
        }
        let at = self.stack.len() - count;
        Ok(self.stack.split_off(at))
    }

    fn enter_catch(&mut self, handler: usize, throwable: ShadowThrowable) {
        self.stack.clear();
        self.stack.push(Value::Throwable(throwable));
        self.pc = handler;
    }

    fn enter_cleanup(&mut self, region: Range<usize>, fault: Fault) {
        self.stack.clear();
        self.pc = region.start;
        self.cleanups.push(PendingCleanup { region, fault });
    }

    /// Pending cleanup whose region contains the current pc, if opaque
    fn opaque_region(&self) -> Option<Range<usize>> {
        self.cleanups
            .last()
            .filter(|pending| pending.region.contains(&self.pc))
            .filter(|pending| is_opaque_carrier(&pending.fault))
            .map(|pending| pending.region.clone())
    }

    /// Close every pending cleanup that control is leaving
    ///
    /// `target` is the jump destination, or `None` when the frame returns.
    /// Pending shadow faults are dropped. If any carrier was pending, the
    /// outermost one is returned and must be resumed.
    fn leave_cleanups(&mut self, target: Option<usize>) -> Option<Fault> {
        let mut resumed = None;
        while let Some(pending) = self.cleanups.last() {
            let leaving = match target {
                None => true,
                Some(target) => pending.region.contains(&self.pc) && !pending.region.contains(&target),
            };
            if !leaving {
                break;
            }
            let Some(pending) = self.cleanups.pop() else {
                break;
            };
            if is_opaque_carrier(&pending.fault) {
                if resumed.is_some() {
                    tracing::warn!(pc = self.pc, "inner carrier discarded on cleanup exit");
                }
                resumed = Some(pending.fault);
            } else {
                tracing::trace!(pc = self.pc, "pending sandbox fault dropped by early cleanup exit");
            }
        }
        if resumed.is_some() {
            tracing::debug!(method = self.name, pc = self.pc, "cleanup exit resumes carrier");
        }
        resumed
    }
}

/// Interpreter for one boundary invocation
pub(crate) struct Interpreter<'a> {
    program: &'a Program,
    hierarchy: &'a Hierarchy,
    registry: &'a HostRegistry,
    translations: &'a TranslationTable,
    ctx: &'a mut ExecutionContext,
    frames: Vec<Frame<'a>>,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(
        program: &'a Program,
        hierarchy: &'a Hierarchy,
        registry: &'a HostRegistry,
        translations: &'a TranslationTable,
        ctx: &'a mut ExecutionContext,
    ) -> Self {
        Self {
            program,
            hierarchy,
            registry,
            translations,
            ctx,
            frames: Vec::new(),
        }
    }

    /// Run `method` to completion
    pub(crate) fn run(mut self, name: &'a str, method: &'a Method, args: Vec<Value>) -> Result<Value, Abrupt> {
        self.frames.push(Frame::new(name, method, args));
        loop {
            match self.step().map_err(Abrupt::Violation)? {
                Step::Next => {
                    if let Some(frame) = self.frames.last_mut() {
                        frame.pc += 1;
                    }
                }
                Step::Jump(target) => {
                    if let Some(frame) = self.frames.last_mut() {
                        frame.pc = target;
                    }
                }
                Step::Raise(fault) => {
                    if let Some(fault) = self.unwind(fault) {
                        return Err(Abrupt::Fault(fault));
                    }
                }
                Step::Return(value) => {
                    self.frames.pop();
                    match self.frames.last_mut() {
                        Some(caller) => {
                            caller.stack.push(value);
                            caller.pc += 1;
                        }
                        None => return Ok(value),
                    }
                }
                Step::Invoke { name, method, args } => {
                    tracing::trace!(method = name, depth = self.frames.len() + 1, "invoke");
                    self.frames.push(Frame::new(name, method, args));
                }
            }
        }
    }

    /// Safe point, then one instruction
    fn step(&mut self) -> Result<Step<'a>, BridgeViolation> {
        let outcome = self.safe_point().and_then(|()| {
            let (pc, instruction) = self.fetch()?;
            self.execute(pc, instruction)
        });
        match outcome {
            Ok(step) => Ok(step),
            Err(Interrupt::Terminate(termination)) => {
                tracing::debug!(%termination, "termination raised");
                Ok(Step::Raise(raise_opaque(termination.into())?))
            }
            Err(Interrupt::Violation(violation)) => Err(violation),
        }
    }

    fn safe_point(&mut self) -> Result<(), Interrupt> {
        if let Some(termination) = self.ctx.poll_cancellation() {
            tracing::info!("cancellation observed at safe point");
            return Err(termination.into());
        }
        self.ctx.charge(CostKind::Instruction)?;
        Ok(())
    }

    fn fetch(&self) -> Result<(usize, &'a Instruction), Interrupt> {
        let frame = self
            .frames
            .last()
            .ok_or_else(|| Termination::rule("no active frame"))?;
        let method: &'a Method = frame.method;
        let instruction = method
            .code
            .get(frame.pc)
            .ok_or_else(|| Termination::rule(format!("control fell off the end of {}", frame.name)))?;
        Ok((frame.pc, instruction))
    }

    fn frame_mut(&mut self) -> Result<&mut Frame<'a>, Termination> {
        self.frames
            .last_mut()
            .ok_or_else(|| Termination::rule("no active frame"))
    }

    fn execute(&mut self, pc: usize, instruction: &'a Instruction) -> Result<Step<'a>, Interrupt> {
        let step = match instruction {
            Instruction::Push(value) => {
                self.frame_mut()?.stack.push(value.clone());
                Step::Next
            }
            Instruction::Pop => {
                self.frame_mut()?.pop()?;
                Step::Next
            }
            Instruction::Load(slot) => {
                let frame = self.frame_mut()?;
                let value = frame
                    .locals
                    .get(*slot)
                    .cloned()
                    .ok_or_else(|| Termination::rule(format!("local {} out of range", slot)))?;
                frame.stack.push(value);
                Step::Next
            }
            Instruction::Store(slot) => {
                let frame = self.frame_mut()?;
                let value = frame.pop()?;
                let local = frame
                    .locals
                    .get_mut(*slot)
                    .ok_or_else(|| Termination::rule(format!("local {} out of range", slot)))?;
                *local = value;
                Step::Next
            }
            Instruction::Add => {
                let frame = self.frame_mut()?;
                let rhs = frame.pop_int()?;
                let lhs = frame.pop_int()?;
                match lhs.checked_add(rhs) {
                    Some(sum) => {
                        frame.stack.push(Value::Int(sum));
                        Step::Next
                    }
                    None => Step::Raise(arithmetic("integer overflow")),
                }
            }
            Instruction::Div => {
                let frame = self.frame_mut()?;
                let divisor = frame.pop_int()?;
                let dividend = frame.pop_int()?;
                if divisor == 0 {
                    Step::Raise(arithmetic("/ by zero"))
                } else {
                    match dividend.checked_div(divisor) {
                        Some(quotient) => {
                            frame.stack.push(Value::Int(quotient));
                            Step::Next
                        }
                        None => Step::Raise(arithmetic("integer overflow")),
                    }
                }
            }
            Instruction::Concat => {
                let frame = self.frame_mut()?;
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                frame.stack.push(Value::Str(format!("{}{}", lhs, rhs)));
                Step::Next
            }
            Instruction::Emit(line) => {
                self.ctx.record(line.clone());
                Step::Next
            }
            Instruction::Record => {
                let value = self.frame_mut()?.pop()?;
                self.ctx.record(value.to_string());
                Step::Next
            }
            Instruction::New { class, message } => {
                self.ctx.charge(CostKind::Allocation)?;
                if !self.hierarchy.contains(class) {
                    return Err(Termination::rule(format!("unknown class {}", class)).into());
                }
                let mut throwable = ShadowThrowable::new(class.clone());
                if let Some(message) = message {
                    throwable = throwable.with_message(message.clone());
                }
                self.frame_mut()?.stack.push(Value::Throwable(throwable));
                Step::Next
            }
            Instruction::Throw => {
                let value = self.frame_mut()?.pop()?;
                match value {
                    Value::Throwable(throwable) => {
                        self.ctx.charge(CostKind::Throw)?;
                        tracing::trace!(pc, class = %throwable.class, "throw");
                        Step::Raise(Fault::Sandbox(throwable))
                    }
                    other => {
                        return Err(Termination::rule(format!("cannot throw a {}", other.type_name())).into());
                    }
                }
            }
            Instruction::Message => {
                let frame = self.frame_mut()?;
                match frame.pop()? {
                    Value::Throwable(throwable) => {
                        frame.stack.push(Value::Str(throwable.message.unwrap_or_default()));
                        Step::Next
                    }
                    other => {
                        return Err(Termination::rule(format!("expected throwable, found {}", other.type_name())).into());
                    }
                }
            }
            Instruction::Call { method, argc } => {
                let limit = self.ctx.max_call_depth();
                if self.frames.len() >= limit {
                    return Err(Termination::threshold("call depth", limit as u64).into());
                }
                self.ctx.charge(CostKind::Invocation)?;
                let program = self.program;
                let callee = program
                    .method(method)
                    .ok_or_else(|| Termination::rule(format!("unknown method {}", method)))?;
                let args = self.frame_mut()?.pop_n(*argc)?;
                Step::Invoke {
                    name: method,
                    method: callee,
                    args,
                }
            }
            Instruction::HostCall { function, argc } => {
                self.ctx.charge(CostKind::HostCall)?;
                let registry = self.registry;
                let func = registry
                    .get(function)
                    .ok_or_else(|| Termination::rule(format!("unknown host function {}", function)))?;
                self.ctx.charge_amount(func.cost)?;
                let args = self.frame_mut()?.pop_n(*argc)?;
                let host_ctx = self.ctx.host_context();
                match func.call(&args, &host_ctx) {
                    Ok(value) => {
                        self.frame_mut()?.stack.push(value);
                        Step::Next
                    }
                    Err(fault) => {
                        tracing::debug!(function = %function, error = %fault, "host function failed");
                        Step::Raise(admit(fault, self.translations)?)
                    }
                }
            }
            Instruction::Goto(target) => match self.frame_mut()?.leave_cleanups(Some(*target)) {
                Some(carrier) => Step::Raise(carrier),
                None => Step::Jump(*target),
            },
            Instruction::Return => {
                let frame = self.frame_mut()?;
                let value = frame.stack.pop().unwrap_or_default();
                match frame.leave_cleanups(None) {
                    Some(carrier) => Step::Raise(carrier),
                    None => Step::Return(value),
                }
            }
            Instruction::EndFinally => {
                let frame = self.frame_mut()?;
                let closes = frame
                    .cleanups
                    .last()
                    .is_some_and(|pending| pending.region.contains(&pc));
                match if closes { frame.cleanups.pop() } else { None } {
                    Some(pending) => Step::Raise(pending.fault),
                    None => Step::Next,
                }
            }
        };
        Ok(step)
    }

    /// Unwind until a handler takes the fault; returns it if none does
    fn unwind(&mut self, mut fault: Fault) -> Option<Fault> {
        let hierarchy = self.hierarchy;
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Some(fault);
            };
            let pc = frame.pc;
            let method: &'a Method = frame.method;
            let table = &method.handlers;

            loop {
                while frame.cleanups.last().is_some_and(|pending| {
                    pending.region.contains(&pc) && !is_opaque_carrier(&pending.fault)
                }) {
                    tracing::trace!(method = frame.name, pc, "new fault replaces pending sandbox fault");
                    frame.cleanups.pop();
                }
                let Some(region) = frame.opaque_region() else {
                    break;
                };
                let discarded = match dispatch(table, pc, fault, hierarchy, Some(&region)) {
                    Dispatched::Caught { handler, throwable } if region.contains(&handler) => {
                        frame.enter_catch(handler, throwable);
                        return None;
                    }
                    Dispatched::Cleanup { region: nested, fault }
                        if region.start <= nested.start && nested.end <= region.end =>
                    {
                        frame.enter_cleanup(nested, fault);
                        return None;
                    }
                    Dispatched::Caught { throwable, .. } => Fault::Sandbox(throwable),
                    Dispatched::Cleanup { fault, .. } | Dispatched::Unwind(fault) => fault,
                };
                tracing::warn!(
                    method = frame.name,
                    pc,
                    opaque = is_opaque_carrier(&discarded),
                    "fault raised during opaque cleanup discarded"
                );
                fault = match frame.cleanups.pop() {
                    Some(pending) => pending.fault,
                    None => discarded,
                };
            }

            match dispatch(table, pc, fault, hierarchy, None) {
                Dispatched::Caught { handler, throwable } => {
                    frame.enter_catch(handler, throwable);
                    return None;
                }
                Dispatched::Cleanup { region, fault } => {
                    frame.enter_cleanup(region, fault);
                    return None;
                }
                Dispatched::Unwind(unhandled) => {
                    tracing::trace!(method = frame.name, pc, opaque = is_opaque_carrier(&unhandled), "frame unwound");
                    fault = match frame.leave_cleanups(None) {
                        Some(carrier) => {
                            tracing::warn!(method = frame.name, pc, "pending carrier resumed over unwinding fault");
                            carrier
                        }
                        None => unhandled,
                    };
                    self.frames.pop();
                }
            }
        }
    }
}

fn arithmetic(message: &str) -> Fault {
    Fault::Sandbox(ShadowThrowable::new(ClassName::ARITHMETIC_EXCEPTION).with_message(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterpreterConfig;
    use crate::program::{HandlerEntry, Instruction as I};
    use umbra_bridge::{resolve_boundary, HostFault, Surfaced};

    struct Bench {
        program: Program,
        hierarchy: Hierarchy,
        registry: HostRegistry,
        translations: TranslationTable,
        ctx: ExecutionContext,
    }

    impl Bench {
        /// A single-method program, deliberately not validated
        fn new(main: Method) -> Self {
            Self {
                program: Program::new().with_method("main", main),
                hierarchy: Hierarchy::with_builtins(),
                registry: HostRegistry::with_standard_functions(),
                translations: TranslationTable::with_defaults(),
                ctx: ExecutionContext::new(&InterpreterConfig::new()),
            }
        }

        fn interpreter(&mut self) -> (Interpreter<'_>, &Method) {
            let main = self.program.method("main").unwrap();
            let interpreter = Interpreter::new(
                &self.program,
                &self.hierarchy,
                &self.registry,
                &self.translations,
                &mut self.ctx,
            );
            (interpreter, main)
        }

        fn run(&mut self) -> Result<Value, Abrupt> {
            let (interpreter, main) = self.interpreter();
            interpreter.run("main", main, Vec::new())
        }
    }

    fn surfaced_termination(result: Result<Value, Abrupt>) -> Termination {
        match result {
            Err(Abrupt::Fault(fault)) => match resolve_boundary(fault) {
                Surfaced::Host(host) => host.termination().cloned().unwrap(),
                Surfaced::Sandbox(throwable) => panic!("sandbox fault surfaced: {throwable}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_nested_cleanup_outside_region_cannot_swallow_carrier() {
        let main = Method::new(0)
            .with_code(vec![
                I::HostCall {
                    function: "nope".into(),
                    argc: 0,
                },
                I::New {
                    class: ClassName::EXCEPTION.into(),
                    message: Some("inner".into()),
                },
                I::Throw,
                I::Emit("A done".into()),
                I::EndFinally,
                I::Return,
                I::Emit("B cleanup".into()),
                I::EndFinally,
                I::Emit("caught".into()),
                I::Throw,
            ])
            .with_handler(HandlerEntry::finally(1, 3, 6, 8))
            .with_handler(HandlerEntry::finally(0, 1, 1, 5))
            .with_handler(HandlerEntry::catch(6, 8, ClassName::THROWABLE, 8));
        let mut bench = Bench::new(main);

        let result = bench.run();
        assert!(matches!(surfaced_termination(result), Termination::RuleViolation(_)));
        assert_eq!(bench.ctx.output(), ["B cleanup"]);
    }

    #[test]
    fn test_popped_frame_resumes_pending_carrier() {
        let mut bench = Bench::new(Method::new(0).with_code(vec![I::Return, I::EndFinally]));
        let carrier = raise_opaque(HostFault::new(Termination::Cancelled)).unwrap();
        let (mut interpreter, main) = bench.interpreter();

        let mut frame = Frame::new("main", main, Vec::new());
        frame.cleanups.push(PendingCleanup {
            region: 1..2,
            fault: carrier,
        });
        interpreter.frames.push(frame);

        let stray = Fault::Sandbox(ShadowThrowable::new(ClassName::EXCEPTION));
        let escaped = interpreter.unwind(stray).unwrap();
        assert!(is_opaque_carrier(&escaped));
        assert!(interpreter.frames.is_empty());
    }

    #[test]
    fn test_leave_cleanups_keeps_outermost_carrier() {
        let main = Method::new(0).with_code(vec![I::Return]);
        let mut frame = Frame::new("main", &main, Vec::new());
        let first = raise_opaque(HostFault::new(Termination::Cancelled)).unwrap();
        let second = raise_opaque(HostFault::new(Termination::rule("late"))).unwrap();
        frame.cleanups.push(PendingCleanup { region: 0..1, fault: first });
        frame.cleanups.push(PendingCleanup { region: 0..1, fault: second });

        let resumed = frame.leave_cleanups(None).unwrap();
        match resolve_boundary(resumed) {
            Surfaced::Host(host) => assert_eq!(host.termination(), Some(&Termination::Cancelled)),
            Surfaced::Sandbox(throwable) => panic!("unexpected {throwable}"),
        }
        assert!(frame.cleanups.is_empty());
    }
}
