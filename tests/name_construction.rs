//! Names built directly through the public API.

use lambda_form::ir::function::MemberName;
use lambda_form::ir::name::{Argument, Name, INTERNED_ARGUMENT_LIMIT};
use lambda_form::{BasicType, MethodType, NamedFunction, Value};

fn int_binary(name: &str) -> NamedFunction {
    let ty = MethodType::new(BasicType::Int, vec![BasicType::Int, BasicType::Int]);
    NamedFunction::from_fn(MemberName::new("Math", name, ty), |args: &[Value]| {
        let a = args[0].as_int().unwrap_or_default();
        let b = args[1].as_int().unwrap_or_default();
        Ok(Value::Int(a.wrapping_add(b)))
    })
}

#[test]
fn test_application_takes_return_type() {
    let x = Name::new_parameter(BasicType::Int, None);
    let y = Name::new_parameter(BasicType::Int, None);
    let sum = Name::new_application(int_binary("add"), [Argument::from(&x), Argument::from(&y)]);

    assert!(!sum.is_param());
    assert_eq!(sum.ty(), BasicType::Int);
    assert_eq!(sum.arguments().len(), 2);
    assert_eq!(sum.index(), None, "fresh names have no position yet");
    assert_eq!(sum.use_count(&x), 1);
    assert!(sum.refers_to(&y));
}

#[test]
#[should_panic(expected = "expected 2 arguments, got 1")]
fn test_application_arity_mismatch_panics() {
    let x = Name::new_parameter(BasicType::Int, None);
    Name::new_application(int_binary("add"), [Argument::from(&x)]);
}

#[test]
#[should_panic(expected = "argument 1 is L but the parameter is I")]
fn test_application_argument_type_mismatch_panics() {
    let x = Name::new_parameter(BasicType::Int, None);
    let r = Name::new_parameter(BasicType::Ref, None);
    Name::new_application(int_binary("add"), [Argument::from(&x), Argument::from(&r)]);
}

#[test]
#[should_panic(expected = "parameters cannot be void")]
fn test_void_parameter_panics() {
    Name::new_parameter(BasicType::Void, None);
}

#[test]
fn test_parameters_compare_by_identity() {
    let a = Name::new_parameter(BasicType::Long, None);
    let b = Name::new_parameter(BasicType::Long, None);
    assert_ne!(a, b);
    assert_eq!(a, a.clone());
    assert!(Name::same(&a, &a.clone()));
}

#[test]
fn test_applications_compare_structurally() {
    let x = Name::new_parameter(BasicType::Int, None);
    let first = Name::new_application(int_binary("add"), [Argument::from(&x), Argument::from(7)]);
    let second = Name::new_application(int_binary("add"), [Argument::from(&x), Argument::from(7)]);
    let other = Name::new_application(int_binary("add"), [Argument::from(&x), Argument::from(8)]);

    assert!(!Name::same(&first, &second));
    assert_eq!(first, second, "same member, same arguments");
    assert_ne!(first, other);
}

#[test]
fn test_replace_argument_occurrences() {
    let x = Name::new_parameter(BasicType::Int, None);
    let y = Name::new_parameter(BasicType::Int, None);
    let z = Name::new_parameter(BasicType::Int, None);
    let twice = Name::new_application(int_binary("add"), [Argument::from(&x), Argument::from(&x)]);

    let untouched = twice.replace_argument_occurrences(&y, &z);
    assert!(Name::same(&untouched, &twice), "no occurrence, no copy");

    let replaced = twice.replace_argument_occurrences(&x, &z);
    assert!(!Name::same(&replaced, &twice));
    assert_eq!(replaced.use_count(&z), 2);
    assert_eq!(replaced.use_count(&x), 0);
    assert_eq!(twice.use_count(&x), 2, "the original is never modified");
}

#[test]
fn test_interned_arguments_are_shared() {
    for ty in BasicType::ARG_TYPES {
        let a = Name::argument(3, ty);
        let b = Name::argument(3, ty);
        assert!(Name::same(&a, &b));
        assert!(a.is_interned());
        assert_eq!(a.index(), Some(3));
        assert_eq!(a.ty(), ty);
    }

    let past = Name::argument(INTERNED_ARGUMENT_LIMIT, BasicType::Int);
    let again = Name::argument(INTERNED_ARGUMENT_LIMIT, BasicType::Int);
    assert!(!Name::same(&past, &again), "only the first slots are interned");
    assert!(!past.is_interned());
    assert_eq!(past.index(), Some(INTERNED_ARGUMENT_LIMIT));
}

#[test]
fn test_intern_indexed_parameter() {
    let p = Name::parameter_at(2, BasicType::Double);
    assert!(!p.is_interned());
    assert!(Name::same(&p.intern(), &Name::argument(2, BasicType::Double)));
}

#[test]
fn test_with_index() {
    let p = Name::parameter_at(4, BasicType::Int);
    assert!(Name::same(&p.with_index(4), &p));

    let moved = p.with_index(1);
    assert!(!Name::same(&moved, &p));
    assert_eq!(moved.index(), Some(1));
    assert_eq!(p.index(), Some(4));
}

#[test]
fn test_with_index_claims_unset_index() {
    let p = Name::new_parameter(BasicType::Int, None);
    assert_eq!(p.index(), None);

    let q = p.with_index(3);
    assert!(Name::same(&q, &p), "an unindexed name is placed in place");
    assert_eq!(p.index(), Some(3));

    let moved = p.with_index(5);
    assert!(!Name::same(&moved, &p));
    assert_eq!(moved.index(), Some(5));
}

#[test]
fn test_with_constraint_unchanged_returns_self() {
    let p = Name::new_parameter(BasicType::Ref, None);
    assert!(Name::same(&p.with_constraint(None), &p));
}

#[test]
fn test_display() {
    let p = Name::argument(1, BasicType::Int);
    assert_eq!(p.to_string(), "a1:I");
    assert_eq!(p.param_string(), "a1:I");

    let sum = Name::new_application(int_binary("add"), [Argument::from(&p), Argument::from(5)]);
    assert_eq!(sum.expr_string(), "Math.add(a1:I,5)");
}
