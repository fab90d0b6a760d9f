//! Interpreter entry points by signature.
//!
//! Every form that is not compiled is entered through an
//! [`InterpreterEntry`] looked up by its basic-type signature. The common
//! signatures are registered up front; any other signature gets a generic
//! entry built on demand.

use std::sync::LazyLock;

use rustc_hash::FxHashMap;

use crate::error::InvokeError;
use crate::ir::form::LambdaForm;
use crate::ir::types::{signature_arity, signature_type, MethodType};
use crate::ir::value::Value;

pub type InterpretFn = fn(&LambdaForm, &[Value]) -> Result<Value, InvokeError>;

/// Signatures with a registered entry. The receiver is always `L`.
const PREDEFINED_SIGNATURES: &[&str] = &[
    "L_L", "L_I", "L_J", "L_F", "L_D", "L_V",
    "LL_L", "LL_I", "LL_V", "LI_L", "LI_I", "LI_V", "LJ_J", "LF_F", "LD_D",
    "LLL_L", "LLL_I", "LLL_V", "LLI_I", "LII_I", "LIJ_J",
    "LLLL_L", "LLLL_I", "LLLL_V",
    "LLLLL_L", "LLLLL_V",
    "LLLLLL_L", "LLLLLL_V",
];

static ENTRIES: LazyLock<FxHashMap<&'static str, InterpreterEntry>> = LazyLock::new(|| {
    PREDEFINED_SIGNATURES
        .iter()
        .map(|&sig| {
            let entry = InterpreterEntry {
                signature: signature_type(sig),
                predefined: true,
                entry: interpret_checked,
            };
            (sig, entry)
        })
        .collect()
});

/// How an uncompiled form of a given signature is run.
#[derive(Debug, Clone)]
pub struct InterpreterEntry {
    signature: MethodType,
    predefined: bool,
    entry: InterpretFn,
}

impl InterpreterEntry {
    pub fn signature(&self) -> &MethodType {
        &self.signature
    }

    pub fn is_predefined(&self) -> bool {
        self.predefined
    }

    pub fn invoke(&self, form: &LambdaForm, args: &[Value]) -> Result<Value, InvokeError> {
        (self.entry)(form, args)
    }
}

/// The entry for `signature`: the registered one if any, otherwise a
/// generic entry of the same shape.
pub fn interpreter_entry(signature: &str) -> InterpreterEntry {
    if let Some(entry) = ENTRIES.get(signature) {
        return entry.clone();
    }
    tracing::trace!(
        signature,
        arity = signature_arity(signature),
        "no predefined interpreter entry"
    );
    InterpreterEntry {
        signature: signature_type(signature),
        predefined: false,
        entry: interpret_checked,
    }
}

pub fn is_predefined(signature: &str) -> bool {
    ENTRIES.contains_key(signature)
}

/// Checks argument count and basic types, then interprets.
fn interpret_checked(form: &LambdaForm, args: &[Value]) -> Result<Value, InvokeError> {
    check_argument_types(form, args)?;
    form.interpret(args)
}

pub(crate) fn check_argument_types(form: &LambdaForm, args: &[Value]) -> Result<(), InvokeError> {
    if args.len() != form.arity() {
        return Err(InvokeError::ArityMismatch {
            expected: form.arity(),
            found: args.len(),
        });
    }
    for (i, arg) in args.iter().enumerate() {
        let expected = form.parameter_type(i);
        let found = arg.basic_type();
        if found != expected {
            return Err(InvokeError::ArgumentType {
                index: i,
                expected,
                found,
            });
        }
    }
    Ok(())
}
