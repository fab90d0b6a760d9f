//! Lazily resolved members, error plumbing and logging setup.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lambda_form::ir::function::{MemberName, MemberResolver};
use lambda_form::ir::name::{Argument, Name};
use lambda_form::{
    logging, BasicType, Callable, Error, FnCallable, FormResult, InvokeError, LambdaForm, LowerError,
    MethodType, NamedFunction, Value,
};

struct CountingResolver {
    resolved: AtomicUsize,
}

impl MemberResolver for CountingResolver {
    fn resolve(&self, member: &MemberName) -> Arc<dyn Callable> {
        self.resolved.fetch_add(1, Ordering::SeqCst);
        Arc::new(FnCallable::new(member.to_string(), member.ty.clone(), |args: &[Value]| {
            Ok(Value::Int(args[0].as_int().unwrap_or_default() * 3))
        }))
    }
}

fn triple_member() -> MemberName {
    MemberName::new("Math", "triple", MethodType::new(BasicType::Int, vec![BasicType::Int]))
}

#[test]
fn test_lazy_function_resolves_once() {
    let resolver = Arc::new(CountingResolver {
        resolved: AtomicUsize::new(0),
    });
    let triple = NamedFunction::lazy(triple_member(), resolver.clone());
    assert!(!triple.is_resolved());
    assert_eq!(triple.arity(), 1);

    let params = Name::arguments_for(&[BasicType::Ref, BasicType::Int]);
    let body = Name::new_application(triple.clone(), [Argument::from(&params[1])]);
    let form = LambdaForm::from_parts("triple", params, vec![body], FormResult::Last);
    assert_eq!(resolver.resolved.load(Ordering::SeqCst), 0, "building a form does not resolve");

    for i in 0..3 {
        assert_eq!(form.interpret(&[Value::null(), Value::Int(i)]).unwrap(), Value::Int(3 * i));
    }
    assert!(triple.is_resolved());
    assert_eq!(resolver.resolved.load(Ordering::SeqCst), 1);
}

#[test]
fn test_member_names_give_equality() {
    let resolver = Arc::new(CountingResolver {
        resolved: AtomicUsize::new(0),
    });
    let lazy = NamedFunction::lazy(triple_member(), resolver);
    let eager = NamedFunction::from_fn(triple_member(), |args: &[Value]| Ok(args[0].clone()));
    assert_eq!(lazy, eager);

    let anonymous = NamedFunction::new(Arc::new(FnCallable::new(
        "anon",
        triple_member().ty,
        |args: &[Value]| Ok(args[0].clone()),
    )));
    assert_ne!(anonymous, eager);
    assert_eq!(anonymous, anonymous.clone());
}

#[derive(Debug)]
struct Overflow;

impl fmt::Display for Overflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("counter overflowed")
    }
}

impl std::error::Error for Overflow {}

#[test]
fn test_foreign_error_propagates() {
    let ty = MethodType::new(BasicType::Int, vec![BasicType::Int]);
    let fails = NamedFunction::from_fn(MemberName::new("Counter", "bump", ty), |_: &[Value]| {
        Err(InvokeError::foreign(Overflow))
    });
    let params = Name::arguments_for(&[BasicType::Ref, BasicType::Int]);
    let body = Name::new_application(fails, [Argument::from(&params[1])]);
    let form = LambdaForm::from_parts("bump", params, vec![body], FormResult::Last);

    let err = form.invoke(&[Value::null(), Value::Int(1)]).unwrap_err();
    assert!(matches!(err, InvokeError::Foreign(_)), "got {:?}", err);
    assert_eq!(err.to_string(), "counter overflowed");
}

#[test]
fn test_umbrella_error_messages() {
    let invoke: Error = InvokeError::raised("boom").into();
    assert_eq!(invoke.to_string(), "[invocation error] boom");

    let lower: Error = LowerError::Backend {
        backend: "closure",
        detail: "out of slots".into(),
    }
    .into();
    assert_eq!(lower.to_string(), "[lowering error] backend 'closure' failed: out of slots");

    let nested: InvokeError = LowerError::Backend {
        backend: "closure",
        detail: "x".into(),
    }
    .into();
    assert!(matches!(nested, InvokeError::Lowering(_)));
}

#[test]
fn test_logging_init_is_idempotent() {
    logging::init_with_level(Some("lambda_form=trace"));
    logging::init_with_level(Some("lambda_form=loud"));
    logging::init();

    let params = Name::arguments_for(&[BasicType::Ref, BasicType::Int]);
    let form = LambdaForm::from_parts("id", params.clone(), vec![], FormResult::At(1));
    assert_eq!(form.interpret(&[Value::null(), Value::Int(4)]).unwrap(), Value::Int(4));
}

#[test]
fn test_log_directives_precedence() {
    let env = |var: &str| match var {
        "LAMBDA_FORM_LOG" => Some("lambda_form::cache=debug".to_owned()),
        "RUST_LOG" => Some("warn".to_owned()),
        _ => None,
    };
    assert_eq!(logging::directives(Some("lambda_form=trace"), env), "lambda_form=trace");
    assert_eq!(logging::directives(Some(""), env), "lambda_form::cache=debug");
    assert_eq!(logging::directives(None, |var| env(var).filter(|_| var == "RUST_LOG")), "warn");
    assert_eq!(logging::directives(None, |_| Some(String::new())), logging::DEFAULT_DIRECTIVES);
    assert_eq!(logging::directives(None, |_| None), "lambda_form=info");
}

#[test]
fn test_invalid_log_filter_falls_back() {
    assert_eq!(logging::env_filter("lambda_form=loud").to_string(), logging::DEFAULT_DIRECTIVES);
    assert_eq!(logging::env_filter("lambda_form=trace").to_string(), "lambda_form=trace");
}
