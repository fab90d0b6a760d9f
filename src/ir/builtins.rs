//! Built-in functions and forms shared by every edit.
//!
//! Tables here are built lazily on first use and never change afterwards,
//! except for the invoker table, which only grows.

use std::sync::{Arc, LazyLock, Mutex};

use rustc_hash::FxHashMap;

use crate::error::InvokeError;
use crate::ir::form::{FormResult, LambdaForm};
use crate::ir::function::{Intrinsic, MemberName, NamedFunction};
use crate::ir::name::Name;
use crate::ir::types::{BasicType, MethodType, RichType};
use crate::ir::value::{Ref, Value};

const FORM_OWNER: &str = "LambdaForm";
const INVOKER_OWNER: &str = "MethodHandle";
const ARRAY_OWNER: &str = "Array";

static IDENTITY_FUNCTIONS: LazyLock<Vec<NamedFunction>> = LazyLock::new(|| {
    BasicType::ALL
        .iter()
        .map(|&ty| {
            let params = if ty == BasicType::Void { vec![] } else { vec![ty] };
            let member = MemberName::new(
                FORM_OWNER,
                format!("identity_{}", ty),
                MethodType::new(ty, params),
            );
            NamedFunction::intrinsic_fn(member, Intrinsic::Identity, |args: &[Value]| {
                Ok(args.first().cloned().unwrap_or(Value::Void))
            })
        })
        .collect()
});

static ZERO_FUNCTIONS: LazyLock<Vec<NamedFunction>> = LazyLock::new(|| {
    BasicType::ALL
        .iter()
        .map(|&ty| {
            let member = MemberName::new(FORM_OWNER, format!("zero_{}", ty), MethodType::new(ty, vec![]));
            NamedFunction::intrinsic_fn(member, Intrinsic::ZeroConstant, move |_: &[Value]| {
                Ok(Value::zero(ty))
            })
        })
        .collect()
});

static IDENTITY_FORMS: LazyLock<Vec<Arc<LambdaForm>>> = LazyLock::new(|| {
    BasicType::ALL
        .iter()
        .map(|&ty| {
            if ty == BasicType::Void {
                let names = vec![Name::argument(0, BasicType::Ref)];
                LambdaForm::new("identity_V", 1, names, FormResult::Void)
            } else {
                let names = vec![Name::argument(0, BasicType::Ref), Name::argument(1, ty)];
                LambdaForm::new(&format!("identity_{}", ty), 2, names, FormResult::At(1))
            }
        })
        .collect()
});

static ZERO_FORMS: LazyLock<Vec<Arc<LambdaForm>>> = LazyLock::new(|| {
    BasicType::ALL
        .iter()
        .map(|&ty| {
            if ty == BasicType::Void {
                return identity_form(BasicType::Void);
            }
            let names = vec![
                Name::argument(0, BasicType::Ref),
                Name::new_application(constant_zero(ty), []),
            ];
            LambdaForm::new(&format!("zero_{}", ty), 1, names, FormResult::At(1))
        })
        .collect()
});

static INVOKERS: LazyLock<Mutex<FxHashMap<MethodType, NamedFunction>>> =
    LazyLock::new(|| Mutex::new(FxHashMap::default()));

static ARRAY_GETTERS: LazyLock<Vec<NamedFunction>> = LazyLock::new(|| {
    BasicType::ARG_TYPES
        .iter()
        .map(|&ty| {
            let member = MemberName::new(
                ARRAY_OWNER,
                format!("get_{}", ty),
                MethodType::new(ty, vec![BasicType::Ref, BasicType::Int]),
            );
            NamedFunction::intrinsic_fn(member, Intrinsic::ArrayLoad, move |args: &[Value]| {
                array_load(ty, args)
            })
        })
        .collect()
});

static SPREAD_CHECK: LazyLock<NamedFunction> = LazyLock::new(|| {
    let member = MemberName::new(
        ARRAY_OWNER,
        "checkSpreadArgument",
        MethodType::new(BasicType::Void, vec![BasicType::Ref, BasicType::Int]),
    );
    NamedFunction::intrinsic_fn(member, Intrinsic::SpreadCheck, check_spread)
});

/// `(x) -> x` for `ty`; `() -> void` for `Void`.
pub fn identity(ty: BasicType) -> NamedFunction {
    IDENTITY_FUNCTIONS[ty.ordinal()].clone()
}

/// `() -> zero` for `ty`.
pub fn constant_zero(ty: BasicType) -> NamedFunction {
    ZERO_FUNCTIONS[ty.ordinal()].clone()
}

/// `(receiver, x) -> x`, or `(receiver) -> void`.
pub fn identity_form(ty: BasicType) -> Arc<LambdaForm> {
    IDENTITY_FORMS[ty.ordinal()].clone()
}

/// `(receiver) -> zero`.
pub fn zero_form(ty: BasicType) -> Arc<LambdaForm> {
    ZERO_FORMS[ty.ordinal()].clone()
}

/// A function of type `(callee, params...) -> ret` that calls `callee` with
/// the remaining arguments. One instance per method type.
pub fn invoker(ty: &MethodType) -> NamedFunction {
    let mut invokers = INVOKERS.lock().unwrap_or_else(|e| e.into_inner());
    invokers
        .entry(ty.clone())
        .or_insert_with(|| {
            let member = MemberName::new(INVOKER_OWNER, "invokeBasic", ty.with_receiver());
            NamedFunction::intrinsic_fn(member, Intrinsic::InvokeBasic, invoke_basic)
        })
        .clone()
}

/// `(array, length) -> void`; fails unless the array has exactly `length`
/// elements. A null array passes only for length zero.
pub fn check_spread_argument() -> NamedFunction {
    SPREAD_CHECK.clone()
}

/// `(array, index) -> element` for elements of basic type `ty`.
pub fn array_element_getter(ty: BasicType) -> NamedFunction {
    assert!(ty != BasicType::Void, "no array of void");
    ARRAY_GETTERS[ty.ordinal()].clone()
}

/// `(e0, .., e{count-1}) -> array` collecting elements of `element`.
pub fn array_constructor(element: &RichType, count: usize) -> NamedFunction {
    let ty = element.erase();
    assert!(ty != BasicType::Void, "no array of void");
    let member = MemberName::new(
        ARRAY_OWNER,
        format!("new_{}_{}", element, count),
        MethodType::new(BasicType::Ref, vec![ty; count]),
    );
    NamedFunction::intrinsic_fn(member, Intrinsic::NewArray, |args: &[Value]| {
        Ok(Value::array(args.to_vec()))
    })
}

fn invoke_basic(args: &[Value]) -> Result<Value, InvokeError> {
    let Some((callee, rest)) = args.split_first() else {
        return Err(InvokeError::ArityMismatch {
            expected: 1,
            found: 0,
        });
    };
    match callee {
        Value::Ref(Ref::Function(target)) => target.invoke(rest),
        other => Err(InvokeError::NotCallable {
            found: other.to_string(),
        }),
    }
}

fn check_spread(args: &[Value]) -> Result<Value, InvokeError> {
    let expected = args.get(1).and_then(Value::as_int).unwrap_or(0) as usize;
    match args.first() {
        Some(Value::Ref(Ref::Array(a))) if a.len() == expected => Ok(Value::Void),
        Some(Value::Ref(Ref::Null)) if expected == 0 => Ok(Value::Void),
        Some(other) => Err(InvokeError::raised(format!(
            "array is not of length {}: {}",
            expected, other
        ))),
        None => Err(InvokeError::ArityMismatch {
            expected: 2,
            found: 0,
        }),
    }
}

fn array_load(ty: BasicType, args: &[Value]) -> Result<Value, InvokeError> {
    let (Some(array), Some(index)) = (args.first(), args.get(1).and_then(Value::as_int)) else {
        return Err(InvokeError::ArityMismatch {
            expected: 2,
            found: args.len(),
        });
    };
    let Some(elements) = array.as_array() else {
        return Err(InvokeError::raised(format!("not an array: {}", array)));
    };
    let element = usize::try_from(index)
        .ok()
        .and_then(|i| elements.get(i))
        .ok_or_else(|| {
            InvokeError::raised(format!(
                "index {} out of bounds for length {}",
                index,
                elements.len()
            ))
        })?;
    if element.basic_type() != ty {
        return Err(InvokeError::ArgumentType {
            index: index as usize,
            expected: ty,
            found: element.basic_type(),
        });
    }
    Ok(element.clone())
}
