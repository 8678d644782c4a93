//! Program model for sandboxed code.
//!
//! A program is a set of user exception classes and named methods. Each
//! method is a flat instruction list plus an exception table, in the style of
//! a JVM method body: handler entries protect half-open instruction ranges
//! and are searched in declaration order, so inner and more specific
//! handlers must be listed first.

use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use umbra_core::{CoreError, CoreResult};
use umbra_shadow::{ClassName, Hierarchy};

/// A single interpreter instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Push a constant
    Push(Value),
    /// Discard the top of the stack
    Pop,
    /// Push a local variable
    Load(usize),
    /// Pop into a local variable
    Store(usize),
    /// Pop two integers, push their sum
    Add,
    /// Pop divisor then dividend, push the quotient
    Div,
    /// Pop two values, push their concatenated display forms
    Concat,
    /// Append a literal line to the context output
    Emit(String),
    /// Pop a value and append its display form to the context output
    Record,
    /// Push a new throwable of a shadow class
    New {
        /// Class to instantiate
        class: ClassName,
        /// Optional detail message
        #[serde(default)]
        message: Option<String>,
    },
    /// Pop a throwable and throw it
    Throw,
    /// Pop a throwable, push its message (empty string if none)
    Message,
    /// Call a sandboxed method; arguments are popped in declaration order
    Call {
        /// Method name
        method: String,
        /// Number of arguments
        argc: usize,
    },
    /// Call a host function; arguments are popped in declaration order
    HostCall {
        /// Host function name
        function: String,
        /// Number of arguments
        argc: usize,
    },
    /// Jump to an instruction
    Goto(usize),
    /// Return the top of the stack, or unit if the stack is empty
    Return,
    /// Close a finally block: rethrow the pending fault, if any
    EndFinally,
}

/// An exception table entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandlerEntry {
    /// Transfer control to `handler` for faults of `class` raised in `from..to`
    Catch {
        /// First protected instruction
        from: usize,
        /// One past the last protected instruction
        to: usize,
        /// Class caught, including subclasses
        class: ClassName,
        /// Handler entry point
        handler: usize,
    },
    /// Run the cleanup region `handler..end` for any fault raised in `from..to`
    Finally {
        /// First protected instruction
        from: usize,
        /// One past the last protected instruction
        to: usize,
        /// First cleanup instruction
        handler: usize,
        /// One past the cleanup's closing `EndFinally`
        end: usize,
    },
}

impl HandlerEntry {
    /// Create a catch entry
    #[must_use]
    pub fn catch(from: usize, to: usize, class: impl Into<ClassName>, handler: usize) -> Self {
        Self::Catch {
            from,
            to,
            class: class.into(),
            handler,
        }
    }

    /// Create a finally entry
    #[must_use]
    pub fn finally(from: usize, to: usize, handler: usize, end: usize) -> Self {
        Self::Finally {
            from,
            to,
            handler,
            end,
        }
    }

    /// Protected instruction range
    #[must_use]
    pub fn protected(&self) -> Range<usize> {
        match self {
            Self::Catch { from, to, .. } | Self::Finally { from, to, .. } => *from..*to,
        }
    }

    /// Whether this entry protects the instruction at `pc`
    #[must_use]
    pub fn covers(&self, pc: usize) -> bool {
        self.protected().contains(&pc)
    }
}

/// A sandboxed method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    /// Number of parameters, bound to the first locals
    pub params: usize,
    /// Number of local slots (at least `params`)
    pub locals: usize,
    /// Instructions
    pub code: Vec<Instruction>,
    /// Exception table
    #[serde(default)]
    pub handlers: Vec<HandlerEntry>,
}

impl Method {
    /// Create an empty method with `params` parameters
    #[must_use]
    pub fn new(params: usize) -> Self {
        Self {
            params,
            locals: params,
            code: Vec::new(),
            handlers: Vec::new(),
        }
    }

    /// Set the number of locals
    #[must_use]
    pub fn with_locals(mut self, locals: usize) -> Self {
        self.locals = locals;
        self
    }

    /// Set the instructions
    #[must_use]
    pub fn with_code(mut self, code: Vec<Instruction>) -> Self {
        self.code = code;
        self
    }

    /// Append an exception table entry
    #[must_use]
    pub fn with_handler(mut self, entry: HandlerEntry) -> Self {
        self.handlers.push(entry);
        self
    }
}

/// A user-defined exception class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDecl {
    /// Class name
    pub name: ClassName,
    /// Parent class
    pub parent: ClassName,
}

/// A complete sandboxed program
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// User-defined exception classes, parents first
    #[serde(default)]
    pub classes: Vec<ClassDecl>,
    /// Methods by name
    pub methods: IndexMap<String, Method>,
}

impl Program {
    /// Create an empty program
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user exception class
    #[must_use]
    pub fn with_class(mut self, name: impl Into<ClassName>, parent: impl Into<ClassName>) -> Self {
        self.classes.push(ClassDecl {
            name: name.into(),
            parent: parent.into(),
        });
        self
    }

    /// Add a method
    #[must_use]
    pub fn with_method(mut self, name: impl Into<String>, method: Method) -> Self {
        self.methods.insert(name.into(), method);
        self
    }

    /// Parse a program from JSON
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed
    pub fn from_json(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Look up a method
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Build the shadow hierarchy: built-ins plus this program's classes
    ///
    /// # Errors
    ///
    /// Returns error if a class is redefined or has an unknown parent
    pub fn hierarchy(&self) -> CoreResult<Hierarchy> {
        let mut hierarchy = Hierarchy::with_builtins();
        for decl in &self.classes {
            hierarchy.define(decl.name.clone(), decl.parent.clone())?;
        }
        Ok(hierarchy)
    }

    /// Validate the whole program and return its hierarchy
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found
    pub fn validate(&self) -> CoreResult<Hierarchy> {
        let hierarchy = self.hierarchy()?;
        for (name, method) in &self.methods {
            self.validate_method(name, method, &hierarchy)?;
        }
        Ok(hierarchy)
    }

    fn validate_method(&self, name: &str, method: &Method, hierarchy: &Hierarchy) -> CoreResult<()> {
        let len = method.code.len();
        if len == 0 {
            return Err(CoreError::validation(name, "method has no instructions"));
        }
        if method.params > method.locals {
            return Err(CoreError::validation(
                name,
                format!("{} params exceed {} locals", method.params, method.locals),
            ));
        }

        for (pc, instruction) in method.code.iter().enumerate() {
            let field = || format!("{}.code[{}]", name, pc);
            match instruction {
                Instruction::Load(slot) | Instruction::Store(slot) if *slot >= method.locals => {
                    return Err(CoreError::validation(field(), format!("local {} out of range", slot)));
                }
                Instruction::Goto(target) if *target >= len => {
                    return Err(CoreError::validation(field(), format!("jump target {} out of range", target)));
                }
                Instruction::New { class, .. } if !hierarchy.contains(class) => {
                    return Err(CoreError::validation(field(), format!("unknown class {}", class)));
                }
                Instruction::Call { method: callee, argc } => match self.method(callee) {
                    None => return Err(CoreError::validation(field(), format!("unknown method {}", callee))),
                    Some(target) if target.params != *argc => {
                        return Err(CoreError::validation(
                            field(),
                            format!("{} expects {} arguments, got {}", callee, target.params, argc),
                        ));
                    }
                    Some(_) => {}
                },
                _ => {}
            }
        }

        for (index, entry) in method.handlers.iter().enumerate() {
            let field = format!("{}.handlers[{}]", name, index);
            let protected = entry.protected();
            if protected.is_empty() || protected.end > len {
                return Err(CoreError::validation(field, "invalid protected range"));
            }
            match entry {
                HandlerEntry::Catch { class, handler, .. } => {
                    if *handler >= len || protected.contains(handler) {
                        return Err(CoreError::validation(field, "invalid handler target"));
                    }
                    if !hierarchy.contains(class) {
                        return Err(CoreError::validation(field, format!("unknown class {}", class)));
                    }
                }
                HandlerEntry::Finally { handler, end, .. } => {
                    let region = *handler..*end;
                    if region.is_empty() || region.end > len {
                        return Err(CoreError::validation(field, "invalid cleanup region"));
                    }
                    if region.start < protected.end && protected.start < region.end {
                        return Err(CoreError::validation(field, "cleanup region overlaps protected range"));
                    }
                    if method.code[region.end - 1] != Instruction::EndFinally {
                        return Err(CoreError::validation(field, "cleanup region must close with EndFinally"));
                    }
                }
            }
        }

        // Handlers protecting code inside a cleanup region must stay inside it.
        for (outer, entry) in method.handlers.iter().enumerate() {
            let HandlerEntry::Finally { handler: start, end, .. } = entry else {
                continue;
            };
            let region = *start..*end;
            for (index, nested) in method.handlers.iter().enumerate() {
                let protected = nested.protected();
                if index == outer || protected.start < region.start || protected.end > region.end {
                    continue;
                }
                let leaves = match nested {
                    HandlerEntry::Catch { handler, .. } => !region.contains(handler),
                    HandlerEntry::Finally { handler, end, .. } => *handler < region.start || *end > region.end,
                };
                if leaves {
                    return Err(CoreError::validation(
                        format!("{}.handlers[{}]", name, index),
                        format!("handler leaves the cleanup region of handlers[{}]", outer),
                    ));
                }
            }
        }
        Ok(())
    }
}
