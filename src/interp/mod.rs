//! Reference interpreter for lambda forms.
//!
//! Evaluates a form by filling one value slot per name: the arguments
//! occupy the parameter slots, then every temporary is computed in index
//! order from slots that are already filled. Errors raised by called
//! functions are returned as they are.
//!
//! Each interpreted call also bumps the form's invocation counter. Once the
//! counter reaches the configured threshold the form is lowered, and
//! [`LambdaForm::invoke`] prefers the compiled entry from then on.

use std::sync::atomic::Ordering;

use smallvec::SmallVec;

use crate::codegen::jit::Tier;
use crate::config;
use crate::error::{InvokeError, LowerError};
use crate::ir::form::LambdaForm;
use crate::ir::name::{Argument, Name};
use crate::ir::value::Value;

impl LambdaForm {
    /// Runs this form with the interpreter, whatever its tier.
    pub fn interpret(&self, args: &[Value]) -> Result<Value, InvokeError> {
        if args.len() != self.arity() {
            return Err(InvokeError::ArityMismatch {
                expected: self.arity(),
                found: args.len(),
            });
        }
        self.check_invocation_counter()?;

        let names = self.names();
        let mut values: Vec<Value> = Vec::with_capacity(names.len());
        values.extend_from_slice(args);
        for name in &names[self.arity()..] {
            let value = self.interpret_name(name, &values)?;
            values.push(value);
        }
        Ok(match self.result_index() {
            Some(r) => values[r].clone(),
            None => Value::Void,
        })
    }

    fn interpret_name(&self, name: &Name, values: &[Value]) -> Result<Value, InvokeError> {
        let Some(function) = name.function() else {
            unreachable!("parameter {} in the body of {}", name, self.label());
        };
        let args: SmallVec<[Value; 8]> = name
            .arguments()
            .iter()
            .map(|arg| match arg {
                Argument::Name(n) => match n.index() {
                    Some(i) => values[i].clone(),
                    None => unreachable!("unindexed reference {} in {}", n, self.label()),
                },
                Argument::Const(v) => v.clone(),
            })
            .collect();
        tracing::trace!(form = %self.label(), name = %name, function = %function, "interpret");
        let value = function.invoke_with_arguments(&args)?;
        tracing::trace!(form = %self.label(), name = %name, value = %value, "interpret done");
        Ok(value)
    }

    /// Runs this form through its best available entry: the compiled one if
    /// it has been lowered, the registered interpreter entry otherwise.
    pub fn invoke(&self, args: &[Value]) -> Result<Value, InvokeError> {
        match self.compiled_entry() {
            Some(entry) => entry.invoke(args),
            None => self.interpreter_entry().invoke(self, args),
        }
    }

    pub fn tier(&self) -> Tier {
        if self.is_compiled() {
            Tier::Compiled
        } else {
            Tier::Interpreter
        }
    }

    /// Counts an interpreted call and promotes the form once the threshold
    /// is reached. The counter is updated without synchronization, so
    /// concurrent callers may lose increments.
    fn check_invocation_counter(&self) -> Result<(), LowerError> {
        let Some(threshold) = config::get().compile_threshold else {
            return Ok(());
        };
        if self.is_compiled() {
            return Ok(());
        }
        let mut count = self.invocation_counter.load(Ordering::Relaxed);
        if count < threshold {
            count += 1;
            self.invocation_counter.store(count, Ordering::Relaxed);
        }
        if count >= threshold {
            tracing::debug!(form = %self.label(), count, threshold, "promoting form");
            self.compile_to_entry_point()?;
        }
        Ok(())
    }
}
