//! Basic types, erasure and signature strings.

use lambda_form::ir::types::{
    is_valid_signature, shorten_signature, signature_arity, signature_return, signature_type,
};
use lambda_form::{BasicType, MethodType, RichType};

#[test]
fn test_ordinals_and_chars() {
    let chars: String = BasicType::ALL.iter().map(|t| t.char()).collect();
    assert_eq!(chars, "LIJFDV");
    for (i, ty) in BasicType::ALL.iter().enumerate() {
        assert_eq!(ty.ordinal(), i);
        assert_eq!(BasicType::from_ordinal(i as u8), *ty);
        assert_eq!(BasicType::from_char(ty.char()), *ty);
    }
    assert_eq!(BasicType::TYPE_LIMIT, 6);
    assert_eq!(BasicType::ARG_TYPE_LIMIT, 5);
    assert!(!BasicType::ARG_TYPES.contains(&BasicType::Void));
}

#[test]
fn test_subword_chars_erase_to_int() {
    for c in ['Z', 'B', 'S', 'C'] {
        assert_eq!(BasicType::try_from_char(c), Some(BasicType::Int));
    }
    assert_eq!(BasicType::try_from_char('Q'), None);
    assert!(BasicType::is_basic_type_char('V'));
    assert!(!BasicType::is_arg_basic_type_char('V'));
}

#[test]
fn test_rich_type_erasure() {
    assert_eq!(RichType::Boolean.erase(), BasicType::Int);
    assert_eq!(RichType::Char.erase(), BasicType::Int);
    assert_eq!(RichType::Long.erase(), BasicType::Long);
    assert_eq!(RichType::class("String").erase(), BasicType::Ref);
    assert_eq!(RichType::array_of(RichType::Int).erase(), BasicType::Ref);
    assert_eq!(RichType::Void.erase(), BasicType::Void);

    assert_eq!(BasicType::Int.basic_class(), RichType::Int);
    assert_eq!(BasicType::Ref.basic_class(), RichType::Object);
    assert_ne!(BasicType::Int.basic_class(), RichType::Boolean);
}

#[test]
fn test_method_type_signature() {
    let mt = MethodType::new(BasicType::Long, vec![BasicType::Ref, BasicType::Int]);
    assert_eq!(mt.basic_type_signature(), "LI_J");
    assert_eq!(mt.to_string(), "LI_J");
    assert_eq!(mt.with_receiver().basic_type_signature(), "LLI_J");
    assert_eq!(mt.drop_parameter(0).basic_type_signature(), "I_J");
    assert_eq!(mt.change_return(BasicType::Void).basic_type_signature(), "LI_V");
    assert_eq!(
        mt.parameter_slot_count(),
        2,
        "references and ints take one slot each"
    );

    let erased = MethodType::erased(&RichType::Short, &[RichType::Boolean, RichType::Double]);
    assert_eq!(erased.basic_type_signature(), "ID_I");
}

#[test]
#[should_panic(expected = "void is not a legal parameter type")]
fn test_void_parameter_panics() {
    MethodType::new(BasicType::Int, vec![BasicType::Void]);
}

#[test]
fn test_signature_validation() {
    assert!(is_valid_signature("LI_J"));
    assert!(is_valid_signature("_V"));
    assert!(!is_valid_signature("LV_I"), "void parameter");
    assert!(!is_valid_signature("LI"), "no return");
    assert!(!is_valid_signature("LI_JJ"), "two returns");

    assert_eq!(signature_arity("LLI_V"), 3);
    assert_eq!(signature_return("LLI_V"), BasicType::Void);
    assert_eq!(
        signature_type("LD_F"),
        MethodType::new(BasicType::Float, vec![BasicType::Ref, BasicType::Double])
    );
}

#[test]
fn test_shorten_signature() {
    assert_eq!(shorten_signature("LLLLI_L"), "L4I_L");
    assert_eq!(shorten_signature("LLI_L"), "LLI_L");
    assert_eq!(shorten_signature("IIIJJJ_V"), "I3J3_V");
    assert_eq!(shorten_signature("L_"), "L_");
}
