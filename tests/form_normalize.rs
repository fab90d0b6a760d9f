//! Form construction: normalization, verification and the structural
//! transforms that do not go through the editor.

use std::collections::HashSet;
use std::sync::Arc;

use lambda_form::ir::function::MemberName;
use lambda_form::ir::name::{Argument, Name};
use lambda_form::ir::{is_valid_signature, signature_type};
use lambda_form::{BasicType, FormResult, LambdaForm, MethodType, NamedFunction, Value};

fn int_binary(name: &str, op: fn(i32, i32) -> i32) -> NamedFunction {
    let ty = MethodType::new(BasicType::Int, vec![BasicType::Int, BasicType::Int]);
    NamedFunction::from_fn(MemberName::new("Math", name, ty), move |args: &[Value]| {
        let a = args[0].as_int().unwrap_or_default();
        let b = args[1].as_int().unwrap_or_default();
        Ok(Value::Int(op(a, b)))
    })
}

fn negate() -> NamedFunction {
    let ty = MethodType::new(BasicType::Int, vec![BasicType::Int]);
    NamedFunction::from_fn(MemberName::new("Math", "neg", ty), |args: &[Value]| {
        Ok(Value::Int(-args[0].as_int().unwrap_or_default()))
    })
}

/// `(a0:L, a1:I, a2:I) -> op(a1, a2)`
fn binary_form(label: &str, function: NamedFunction) -> Arc<LambdaForm> {
    let params = vec![
        Name::new_parameter(BasicType::Ref, None),
        Name::new_parameter(BasicType::Int, None),
        Name::new_parameter(BasicType::Int, None),
    ];
    let body = Name::new_application(function, [Argument::from(&params[1]), Argument::from(&params[2])]);
    LambdaForm::from_parts(label, params, vec![body], FormResult::Last)
}

fn ints(values: &[i32]) -> Vec<Value> {
    std::iter::once(Value::null())
        .chain(values.iter().map(|&v| Value::Int(v)))
        .collect()
}

#[test]
fn test_names_are_indexed_and_parameters_interned() {
    let form = binary_form("add", int_binary("add", i32::wrapping_add));

    assert_eq!(form.arity(), 3);
    assert_eq!(form.names().len(), 4);
    for (i, n) in form.names().iter().enumerate() {
        assert_eq!(n.index(), Some(i));
    }
    for i in 0..3 {
        assert!(form.parameter(i).is_interned(), "parameter {} not interned", i);
    }
    assert!(Name::same(form.parameter(1), &Name::argument(1, BasicType::Int)));
    assert_eq!(form.result_index(), Some(3));
    assert_eq!(form.basic_type_signature(), "LII_I");
    assert_eq!(form.return_type(), BasicType::Int);
    assert_eq!(form.expression_count(), 1);
    assert!(!form.is_empty_form());
}

#[test]
fn test_body_references_follow_interned_parameters() {
    let form = binary_form("sub", int_binary("sub", i32::wrapping_sub));
    let body = form.name(3);
    assert_eq!(body.use_count(form.parameter(1)), 1);
    assert_eq!(body.use_count(form.parameter(2)), 1);
    assert_eq!(form.use_count(form.parameter(1)), 1);
    assert_eq!(form.last_use_index(form.parameter(2)), Some(3));
    assert_eq!(form.last_use_index(form.name(3)), Some(4), "the result is used by the return");
    assert!(form.contains(form.name(3)));
    assert_eq!(form.interpret(&ints(&[10, 3])).unwrap(), Value::Int(7));
}

#[test]
fn test_printer_output() {
    let form = binary_form("add", int_binary("add", i32::wrapping_add));
    assert_eq!(
        form.to_string(),
        "add=Lambda(a0:L,a1:I,a2:I)=>{\n    t3:I=Math.add(a1:I,a2:I);\n    t3:I}"
    );
}

#[test]
fn test_name_owned_by_another_form_is_cloned() {
    let first = binary_form("add", int_binary("add", i32::wrapping_add));
    let shared = first.name(3).clone();

    // Reuse `shared` one slot later in a second form.
    let params = vec![
        Name::argument(0, BasicType::Ref),
        Name::argument(1, BasicType::Int),
        Name::argument(2, BasicType::Int),
        Name::argument(3, BasicType::Int),
    ];
    let total = Name::new_application(
        int_binary("add", i32::wrapping_add),
        [Argument::from(&shared), Argument::from(&params[3])],
    );
    let second = LambdaForm::from_parts("add3", params, vec![shared.clone(), total], FormResult::Last);

    assert_eq!(shared.index(), Some(3), "the first form keeps its name");
    assert!(!Name::same(second.name(4), &shared));
    assert_eq!(*second.name(4), shared, "the clone is structurally equal");
    assert_eq!(second.name(5).use_count(second.name(4)), 1);
    assert_eq!(second.interpret(&ints(&[1, 2, 3])).unwrap(), Value::Int(6));
}

#[test]
#[should_panic(expected = "malformed lambda form")]
fn test_interleaved_parameters_panic() {
    let a = Name::new_parameter(BasicType::Int, None);
    let b = Name::new_parameter(BasicType::Int, None);
    let neg = Name::new_application(negate(), [Argument::from(&a)]);
    LambdaForm::new("bad", 2, vec![a, neg, b], FormResult::Last);
}

#[test]
#[should_panic(expected = "malformed lambda form")]
fn test_forward_reference_panics() {
    let a = Name::new_parameter(BasicType::Int, None);
    let later = Name::new_application(negate(), [Argument::from(&a)]);
    let early = Name::new_application(negate(), [Argument::from(&later)]);
    LambdaForm::new("bad", 1, vec![a, early, later], FormResult::Last);
}

#[test]
#[should_panic(expected = "malformed lambda form")]
fn test_result_out_of_bounds_panics() {
    let a = Name::new_parameter(BasicType::Int, None);
    LambdaForm::new("bad", 1, vec![a], FormResult::At(4));
}

#[test]
fn test_void_result_is_dropped() {
    let ty = MethodType::new(BasicType::Void, vec![BasicType::Int]);
    let sink = NamedFunction::from_fn(MemberName::new("Io", "sink", ty), |_: &[Value]| Ok(Value::Void));
    let a = Name::new_parameter(BasicType::Int, None);
    let call = Name::new_application(sink, [Argument::from(&a)]);
    let form = LambdaForm::new("sink", 1, vec![a, call], FormResult::Last);

    assert_eq!(form.result_index(), None);
    assert_eq!(form.return_type(), BasicType::Void);
    assert_eq!(form.basic_type_signature(), "I_V");
    assert_eq!(form.interpret(&[Value::Int(1)]).unwrap(), Value::Void);
}

#[test]
fn test_add_arguments() {
    let form = binary_form("add", int_binary("add", i32::wrapping_add));
    let wider = form.add_arguments(1, &[BasicType::Long, BasicType::Ref]);

    assert_eq!(wider.basic_type_signature(), "LJLII_I");
    assert_eq!(wider.result_index(), Some(5));
    let args = vec![
        Value::null(),
        Value::Long(99),
        Value::string("ignored"),
        Value::Int(20),
        Value::Int(22),
    ];
    assert_eq!(wider.interpret(&args).unwrap(), Value::Int(42));
}

#[test]
fn test_permute_arguments_swaps() {
    let form = binary_form("sub", int_binary("sub", i32::wrapping_sub));
    let swapped = form.permute_arguments(1, &[1, 0], &[BasicType::Int, BasicType::Int]);

    assert!(!Arc::ptr_eq(&form, &swapped));
    assert_eq!(swapped.arity(), 3);
    assert_eq!(swapped.interpret(&ints(&[10, 3])).unwrap(), Value::Int(-7));
}

#[test]
fn test_permute_arguments_duplicates() {
    let form = binary_form("mul", int_binary("mul", i32::wrapping_mul));
    let square = form.permute_arguments(1, &[0, 0], &[BasicType::Int]);

    assert_eq!(square.basic_type_signature(), "LI_I");
    assert_eq!(square.interpret(&ints(&[9])).unwrap(), Value::Int(81));
}

#[test]
fn test_identity_permutation_returns_self() {
    let form = binary_form("add", int_binary("add", i32::wrapping_add));
    let same = form.permute_arguments(1, &[0, 1], &[BasicType::Int, BasicType::Int]);
    assert!(Arc::ptr_eq(&form, &same));
}

#[test]
fn test_customize_links_back() {
    let form = binary_form("add", int_binary("add", i32::wrapping_add));
    let custom = form.customize(Arc::new(17_i32));

    assert!(custom.is_customized());
    assert!(!form.is_customized());
    assert!(Arc::ptr_eq(&custom.uncustomize(), &form));
    assert!(Arc::ptr_eq(&form.uncustomize(), &form));
    assert!(custom.to_string().ends_with('&'));
    assert_eq!(custom.interpret(&ints(&[1, 2])).unwrap(), Value::Int(3));
}

#[test]
fn test_forms_compare_structurally() {
    let add = int_binary("add", i32::wrapping_add);
    let a = binary_form("add", add.clone());
    let b = binary_form("plus", add);
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(*a, *b, "labels do not take part in equality");

    let sub = binary_form("sub", int_binary("sub", i32::wrapping_sub));
    assert_ne!(*a, *sub);

    let set: HashSet<Arc<LambdaForm>> = [a.clone(), b, sub].into_iter().collect();
    assert_eq!(set.len(), 2);
    assert!(set.contains(&a));
}

#[test]
fn test_result_index_takes_part_in_equality() {
    let form = binary_form("add", int_binary("add", i32::wrapping_add));
    let first_param = LambdaForm::new("add", form.arity(), form.names().to_vec(), FormResult::At(1));
    assert_eq!(first_param.result_index(), Some(1));
    assert_ne!(*form, *first_param);

    let custom = form.customize(Arc::new(3_u8));
    assert_eq!(*custom, *form, "customization keeps the structure");
}

#[test]
fn test_signature_round_trips() {
    let forms = [
        binary_form("add", int_binary("add", i32::wrapping_add)),
        binary_form("add", int_binary("add", i32::wrapping_add)).add_arguments(1, &[BasicType::Long, BasicType::Ref]),
        {
            let ty = MethodType::new(BasicType::Void, vec![BasicType::Double]);
            let sink = NamedFunction::from_fn(MemberName::new("Io", "sink", ty), |_: &[Value]| Ok(Value::Void));
            let params = Name::arguments_for(&[BasicType::Ref, BasicType::Double]);
            let call = Name::new_application(sink, [Argument::from(&params[1])]);
            LambdaForm::from_parts("sink", params, vec![call], FormResult::Last)
        },
    ];
    for form in &forms {
        let sig = form.basic_type_signature();
        assert!(is_valid_signature(&sig), "{}", sig);
        assert_eq!(signature_type(&sig), form.method_type(), "{}", sig);
    }
}

#[test]
fn test_normalization_is_idempotent() {
    let form = binary_form("add", int_binary("add", i32::wrapping_add)).add_arguments(1, &[BasicType::Long]);
    let again = LambdaForm::new(
        form.label(),
        form.arity(),
        form.names().to_vec(),
        FormResult::from(form.result_index()),
    );

    assert_eq!(again.names().len(), form.names().len());
    for (i, (a, b)) in again.names().iter().zip(form.names()).enumerate() {
        assert!(Name::same(a, b), "name {} was rebuilt", i);
    }
    assert_eq!(*again, *form);
    assert_eq!(again.interpret(&[Value::null(), Value::Long(0), Value::Int(4), Value::Int(5)]).unwrap(), Value::Int(9));
}
