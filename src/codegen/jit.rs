//! Closure-compiling backend.
//!
//! Architecture
//! ─────────────
//! A form runs in one of two tiers:
//!
//! 1. **Interpreter tier** (initial): every call walks the form's names with
//!    the reference interpreter.
//!
//! 2. **Compiled tier**: once promoted, calls go through the form's cached
//!    [`EntryPoint`]. This backend builds that entry point as a straight-line
//!    program: every function is resolved and every argument is turned into
//!    a slot index or a constant ahead of time, so a call does no lookups
//!    beyond indexing its own value slots.
//!
//! A form moves from the first tier to the second at most once.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::codegen::{EntryPoint, LoweringBackend};
use crate::error::{InvokeError, LowerError};
use crate::ir::form::LambdaForm;
use crate::ir::function::{Callable, Intrinsic};
use crate::ir::name::Argument;
use crate::ir::types::MethodType;
use crate::ir::value::Value;

/// Which execution tier a form is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Interpreter,
    Compiled,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Interpreter => f.write_str("interpreter"),
            Tier::Compiled => f.write_str("compiled"),
        }
    }
}

/// The default backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClosureBackend;

impl LoweringBackend for ClosureBackend {
    fn name(&self) -> &'static str {
        "closure"
    }

    fn lower(&self, form: &LambdaForm, signature: &MethodType) -> Result<EntryPoint, LowerError> {
        let program = Program::compile(form)?;
        Ok(EntryPoint::new(signature.clone(), self.name(), move |args: &[Value]| {
            program.run(args)
        }))
    }
}

enum Operand {
    Slot(usize),
    Const(Value),
}

struct Step {
    target: Arc<dyn Callable>,
    identity: bool,
    operands: SmallVec<[Operand; 4]>,
}

struct Program {
    arity: usize,
    slots: usize,
    result: Option<usize>,
    steps: Vec<Step>,
}

impl Program {
    fn compile(form: &LambdaForm) -> Result<Program, LowerError> {
        let mut steps = Vec::with_capacity(form.expression_count());
        for name in &form.names()[form.arity()..] {
            let Some(function) = name.function() else {
                return Err(LowerError::Unsupported {
                    backend: "closure",
                    form: form.label().to_owned(),
                    detail: format!("parameter {} in the body", name),
                });
            };
            let operands = name
                .arguments()
                .iter()
                .map(|arg| match arg {
                    Argument::Name(n) => n.index().map(Operand::Slot).ok_or_else(|| {
                        LowerError::Unsupported {
                            backend: "closure",
                            form: form.label().to_owned(),
                            detail: format!("unindexed reference {}", n),
                        }
                    }),
                    Argument::Const(v) => Ok(Operand::Const(v.clone())),
                })
                .collect::<Result<_, _>>()?;
            let target = function.resolve().clone();
            let identity = target.intrinsic() == Intrinsic::Identity;
            steps.push(Step {
                target,
                identity,
                operands,
            });
        }
        Ok(Program {
            arity: form.arity(),
            slots: form.names().len(),
            result: form.result_index(),
            steps,
        })
    }

    fn run(&self, args: &[Value]) -> Result<Value, InvokeError> {
        if args.len() != self.arity {
            return Err(InvokeError::ArityMismatch {
                expected: self.arity,
                found: args.len(),
            });
        }
        let mut values: Vec<Value> = Vec::with_capacity(self.slots);
        values.extend_from_slice(args);
        let mut buf: SmallVec<[Value; 8]> = SmallVec::new();
        for step in &self.steps {
            buf.clear();
            buf.extend(step.operands.iter().map(|op| match op {
                Operand::Slot(i) => values[*i].clone(),
                Operand::Const(v) => v.clone(),
            }));
            let value = if step.identity {
                buf.first().cloned().unwrap_or(Value::Void)
            } else {
                step.target.invoke(&buf)?
            };
            values.push(value);
        }
        Ok(match self.result {
            Some(r) => values[r].clone(),
            None => Value::Void,
        })
    }
}
