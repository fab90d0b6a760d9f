//! Bound handles: combinators end to end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lambda_form::{
    BasicType, BoundHandle, Callable, FnCallable, InvokeError, MethodType, RichType, Value,
};

fn int_fn(label: &str, arity: usize, body: fn(&[i32]) -> i32) -> Arc<dyn Callable> {
    let ty = MethodType::new(BasicType::Int, vec![BasicType::Int; arity]);
    Arc::new(FnCallable::new(label, ty, move |args: &[Value]| {
        let ints: Vec<i32> = args.iter().map(|v| v.as_int().unwrap_or_default()).collect();
        Ok(Value::Int(body(&ints)))
    }))
}

fn add() -> Arc<dyn Callable> {
    int_fn("add", 2, |a| a[0] + a[1])
}

fn sub() -> Arc<dyn Callable> {
    int_fn("sub", 2, |a| a[0] - a[1])
}

fn negate() -> Arc<dyn Callable> {
    int_fn("neg", 1, |a| -a[0])
}

fn ints(values: &[i32]) -> Vec<Value> {
    values.iter().map(|&v| Value::Int(v)).collect()
}

#[test]
fn test_direct_handle_calls_target() {
    let h = BoundHandle::new(add());
    assert_eq!(h.method_type().basic_type_signature(), "II_I");
    assert_eq!(h.form().basic_type_signature(), "LII_I");
    assert_eq!(h.invoke(&ints(&[3, 4])).unwrap(), Value::Int(7));
}

#[test]
fn test_invoke_checks_arity() {
    let h = BoundHandle::new(add());
    let err = h.invoke(&ints(&[3])).unwrap_err();
    assert!(
        matches!(err, InvokeError::ArityMismatch { expected: 2, found: 1 }),
        "got {:?}",
        err
    );
}

#[test]
fn test_same_type_shares_forms() {
    let a = BoundHandle::new(add());
    let s = BoundHandle::new(sub());
    assert!(Arc::ptr_eq(a.form(), s.form()));

    let a1 = a.bind_argument(1, 10).unwrap();
    let s1 = s.bind_argument(1, 10).unwrap();
    assert!(Arc::ptr_eq(a1.form(), s1.form()));
    assert_eq!(a1.invoke(&ints(&[5])).unwrap(), Value::Int(15));
    assert_eq!(s1.invoke(&ints(&[5])).unwrap(), Value::Int(-5));
}

#[test]
fn test_bind_each_position() {
    let s = BoundHandle::new(sub());
    let first = s.bind_argument(0, 100).unwrap();
    assert_eq!(first.method_type().basic_type_signature(), "I_I");
    assert_eq!(first.invoke(&ints(&[1])).unwrap(), Value::Int(99));

    let both = first.bind_argument(0, 30).unwrap();
    assert_eq!(both.method_type().parameter_count(), 0);
    assert_eq!(both.invoke(&[]).unwrap(), Value::Int(70));
    assert_eq!(both.carrier().fields().len(), 3, "target plus two bound values");
}

#[test]
fn test_bind_rejects_bad_input() {
    let s = BoundHandle::new(sub());
    let err = s.bind_argument(2, 1).unwrap_err();
    assert!(matches!(err, InvokeError::BadPosition { pos: 2, count: 2 }), "got {:?}", err);

    let err = s.bind_argument(0, 1_i64).unwrap_err();
    assert!(
        matches!(
            err,
            InvokeError::ArgumentType {
                index: 0,
                expected: BasicType::Int,
                found: BasicType::Long
            }
        ),
        "got {:?}",
        err
    );
}

#[test]
fn test_drop_argument() {
    let s = BoundHandle::new(sub());
    let wider = s.drop_argument(1, BasicType::Long).unwrap();
    assert_eq!(wider.method_type().basic_type_signature(), "IJI_I");

    let args = vec![Value::Int(9), Value::Long(1234), Value::Int(2)];
    assert_eq!(wider.invoke(&args).unwrap(), Value::Int(7));

    assert!(matches!(
        s.drop_argument(0, BasicType::Void),
        Err(InvokeError::IncompatibleType(_))
    ));
}

#[test]
fn test_permute_arguments() {
    let s = BoundHandle::new(sub());
    let swapped = s.permute_arguments(&[BasicType::Int, BasicType::Int], &[1, 0]).unwrap();
    assert_eq!(swapped.invoke(&ints(&[3, 10])).unwrap(), Value::Int(7));

    let same = s.permute_arguments(&[BasicType::Int, BasicType::Int], &[0, 1]).unwrap();
    assert!(Arc::ptr_eq(same.form(), s.form()));
}

#[test]
fn test_permute_ignores_unread_arguments() {
    let s = BoundHandle::new(sub());
    let picked = s
        .permute_arguments(&[BasicType::Int, BasicType::Int, BasicType::Int], &[2, 0])
        .unwrap();
    assert_eq!(picked.method_type().parameter_count(), 3);
    assert_eq!(picked.invoke(&ints(&[1, 99, 10])).unwrap(), Value::Int(9));
}

#[test]
fn test_permute_checks_types() {
    let s = BoundHandle::new(sub());
    let err = s
        .permute_arguments(&[BasicType::Long, BasicType::Int], &[0, 1])
        .unwrap_err();
    assert!(matches!(err, InvokeError::ArgumentType { index: 0, .. }), "got {:?}", err);

    let err = s.permute_arguments(&[BasicType::Int], &[0]).unwrap_err();
    assert!(matches!(err, InvokeError::ArityMismatch { expected: 2, found: 1 }), "got {:?}", err);
}

#[test]
fn test_filter_argument() {
    let s = BoundHandle::new(sub());
    let filtered = s.filter_argument(0, negate()).unwrap();
    assert_eq!(filtered.invoke(&ints(&[3, 4])).unwrap(), Value::Int(-7));

    let to_long: Arc<dyn Callable> = Arc::new(FnCallable::new(
        "widen",
        MethodType::new(BasicType::Long, vec![BasicType::Int]),
        |args: &[Value]| Ok(Value::Long(i64::from(args[0].as_int().unwrap_or_default()))),
    ));
    assert!(matches!(
        s.filter_argument(0, to_long),
        Err(InvokeError::IncompatibleType(_))
    ));
}

#[test]
fn test_filter_return() {
    let a = BoundHandle::new(add());
    let widen: Arc<dyn Callable> = Arc::new(FnCallable::new(
        "widen",
        MethodType::new(BasicType::Long, vec![BasicType::Int]),
        |args: &[Value]| Ok(Value::Long(i64::from(args[0].as_int().unwrap_or_default()) << 32)),
    ));
    let wide = a.filter_return(widen).unwrap();
    assert_eq!(wide.method_type().return_type(), BasicType::Long);
    assert_eq!(wide.invoke(&ints(&[1, 1])).unwrap(), Value::Long(2 << 32));

    let err = a.filter_return(add()).unwrap_err();
    assert!(matches!(err, InvokeError::IncompatibleType(_)), "got {:?}", err);
}

#[test]
fn test_return_zero() {
    let a = BoundHandle::new(add());
    let zero = a.return_zero(BasicType::Double);
    assert_eq!(zero.invoke(&ints(&[1, 2])).unwrap(), Value::Double(0.0));

    let void = a.return_zero(BasicType::Void);
    assert_eq!(void.method_type().return_type(), BasicType::Void);
    assert_eq!(void.invoke(&ints(&[1, 2])).unwrap(), Value::Void);
}

#[test]
fn test_collect_arguments() {
    let twice = BoundHandle::new(int_fn("twice", 1, |a| a[0] * 2));
    let collected = twice.collect_arguments(0, add()).unwrap();
    assert_eq!(collected.method_type().basic_type_signature(), "II_I");
    assert_eq!(collected.invoke(&ints(&[3, 4])).unwrap(), Value::Int(14));
}

#[test]
fn test_collect_one_argument_matches_filter() {
    let s = BoundHandle::new(sub());
    let collected = s.collect_arguments(1, negate()).unwrap();
    let filtered = s.filter_argument(1, negate()).unwrap();
    assert!(Arc::ptr_eq(collected.form(), filtered.form()));
    assert_eq!(collected.invoke(&ints(&[3, 4])).unwrap(), Value::Int(7));
}

#[test]
fn test_collect_void_runs_for_effect() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    let effect: Arc<dyn Callable> = Arc::new(FnCallable::new(
        "tick",
        MethodType::new(BasicType::Void, vec![]),
        |_: &[Value]| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Void)
        },
    ));
    let s = BoundHandle::new(sub());
    let ticking = s.collect_arguments(1, effect).unwrap();
    assert_eq!(ticking.method_type(), s.method_type());
    assert_eq!(ticking.invoke(&ints(&[5, 2])).unwrap(), Value::Int(3));
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);
}

#[test]
fn test_collect_into_array() {
    let length: Arc<dyn Callable> = Arc::new(FnCallable::new(
        "length",
        MethodType::new(BasicType::Int, vec![BasicType::Ref]),
        |args: &[Value]| Ok(Value::Int(args[0].as_array().map_or(-1, |a| a.len() as i32))),
    ));
    let h = BoundHandle::new(length);

    let ints_array = h.collect_into_array(0, &RichType::Int, 3).unwrap();
    assert_eq!(ints_array.method_type().basic_type_signature(), "III_I");
    assert_eq!(ints_array.invoke(&ints(&[7, 8, 9])).unwrap(), Value::Int(3));

    let strings = h.collect_into_array(0, &RichType::class("String"), 2).unwrap();
    assert_eq!(strings.method_type().basic_type_signature(), "LL_I");
    let args = vec![Value::string("a"), Value::string("b")];
    assert_eq!(strings.invoke(&args).unwrap(), Value::Int(2));
}

#[test]
fn test_fold_arguments() {
    let digits = BoundHandle::new(int_fn("digits", 3, |a| a[0] * 100 + a[1] * 10 + a[2]));
    let folded = digits.fold_arguments(0, add()).unwrap();
    assert_eq!(folded.method_type().basic_type_signature(), "II_I");
    assert_eq!(folded.invoke(&ints(&[1, 2])).unwrap(), Value::Int(312));

    let err = digits.fold_arguments(2, add()).unwrap_err();
    assert!(matches!(err, InvokeError::BadPosition { .. }), "got {:?}", err);
}

#[test]
fn test_fold_void_combiner() {
    static SEEN: AtomicUsize = AtomicUsize::new(0);
    let record: Arc<dyn Callable> = Arc::new(FnCallable::new(
        "record",
        MethodType::new(BasicType::Void, vec![BasicType::Int]),
        |args: &[Value]| {
            SEEN.store(args[0].as_int().unwrap_or_default() as usize, Ordering::SeqCst);
            Ok(Value::Void)
        },
    ));
    let s = BoundHandle::new(sub());
    let observed = s.fold_arguments(0, record).unwrap();
    assert_eq!(observed.method_type(), s.method_type());
    assert_eq!(observed.invoke(&ints(&[42, 2])).unwrap(), Value::Int(40));
    assert_eq!(SEEN.load(Ordering::SeqCst), 42);
}

#[test]
fn test_spread_arguments() {
    let a = BoundHandle::new(add());
    let spread = a.spread_arguments(0, &RichType::Int, 2).unwrap();
    assert_eq!(spread.method_type().basic_type_signature(), "L_I");

    let pair = Value::array(vec![Value::Int(3), Value::Int(4)]);
    assert_eq!(spread.invoke(&[pair]).unwrap(), Value::Int(7));

    let triple = Value::array(vec![Value::Int(3), Value::Int(4), Value::Int(5)]);
    assert!(matches!(spread.invoke(&[triple]), Err(InvokeError::Raised(_))));

    assert!(matches!(
        a.spread_arguments(1, &RichType::Int, 2),
        Err(InvokeError::BadPosition { .. })
    ));
}

#[test]
fn test_customize_keeps_behavior() {
    let s = BoundHandle::new(sub()).bind_argument(1, 1).unwrap();
    let custom = s.customize();
    assert!(custom.form().is_customized());
    assert!(Arc::ptr_eq(&custom.form().uncustomize(), s.form()));
    assert_eq!(custom.invoke(&ints(&[10])).unwrap(), Value::Int(9));

    let again = custom.bind_argument(0, 5).unwrap();
    assert_eq!(again.invoke(&[]).unwrap(), Value::Int(4));
    assert!(!again.form().is_customized(), "edits start from the shared form");
}

#[test]
fn test_handle_is_callable() {
    let inner = BoundHandle::new(negate());
    let outer = BoundHandle::new(sub())
        .filter_argument(1, Arc::new(inner))
        .unwrap();
    assert_eq!(outer.invoke(&ints(&[1, 2])).unwrap(), Value::Int(3));
}

#[test]
fn test_callee_error_reaches_caller() {
    let fails: Arc<dyn Callable> = Arc::new(FnCallable::new(
        "fails",
        MethodType::new(BasicType::Int, vec![BasicType::Int]),
        |_: &[Value]| Err(InvokeError::raised("boom")),
    ));
    let h = BoundHandle::new(fails).bind_argument(0, 1).unwrap();
    match h.invoke(&[]) {
        Err(InvokeError::Raised(msg)) => assert_eq!(msg, "boom"),
        other => panic!("expected the callee's error, got {:?}", other),
    }
}

#[test]
fn test_handle_of_named_function() {
    use lambda_form::ir::function::MemberName;
    use lambda_form::NamedFunction;

    let ty = MethodType::new(BasicType::Long, vec![BasicType::Long]);
    let square = NamedFunction::from_fn(MemberName::new("Math", "square", ty), |args: &[Value]| {
        let x = args[0].as_long().unwrap_or_default();
        Ok(Value::Long(x * x))
    });
    let h = BoundHandle::of_function(&square);
    assert_eq!(h.invoke(&[Value::Long(12)]).unwrap(), Value::Long(144));
    assert_eq!(h.bind_argument(0, 3_i64).unwrap().invoke(&[]).unwrap(), Value::Long(9));
}
