//! Erased IR types.
//!
//! Every value that flows through a lambda form is classified by one of six
//! [`BasicType`]s. Richer source-level types ([`RichType`]) erase to a basic
//! type; the erasure is total and never implicit at the IR level: a conversion
//! that changes the erased type needs its own IR node.

use std::fmt;
use std::sync::Arc;

/// The six erased IR types, ordered by declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum BasicType {
    /// All reference-like values.
    Ref = 0,
    /// 32-bit integers, and every narrower integer or boolean.
    Int = 1,
    Long = 2,
    Float = 3,
    Double = 4,
    /// Not a value type; only legal as a return type.
    Void = 5,
}

impl BasicType {
    pub const ALL: [BasicType; 6] = [
        BasicType::Ref,
        BasicType::Int,
        BasicType::Long,
        BasicType::Float,
        BasicType::Double,
        BasicType::Void,
    ];

    /// Every type that may appear as a parameter (all but `Void`).
    pub const ARG_TYPES: [BasicType; 5] = [
        BasicType::Ref,
        BasicType::Int,
        BasicType::Long,
        BasicType::Float,
        BasicType::Double,
    ];

    pub const TYPE_LIMIT: usize = 6;
    pub const ARG_TYPE_LIMIT: usize = 5;

    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Panics on an ordinal outside `0..TYPE_LIMIT`.
    pub fn from_ordinal(ord: u8) -> BasicType {
        match Self::ALL.get(ord as usize) {
            Some(bt) => *bt,
            None => panic!("no basic type with ordinal {}", ord),
        }
    }

    /// The one-character tag used in signatures.
    pub fn char(self) -> char {
        match self {
            BasicType::Ref => 'L',
            BasicType::Int => 'I',
            BasicType::Long => 'J',
            BasicType::Float => 'F',
            BasicType::Double => 'D',
            BasicType::Void => 'V',
        }
    }

    /// Maps a type tag to its basic type. Subword tags (`Z`, `B`, `S`, `C`)
    /// erase to `Int`.
    pub fn try_from_char(c: char) -> Option<BasicType> {
        match c {
            'L' => Some(BasicType::Ref),
            'I' | 'Z' | 'B' | 'S' | 'C' => Some(BasicType::Int),
            'J' => Some(BasicType::Long),
            'F' => Some(BasicType::Float),
            'D' => Some(BasicType::Double),
            'V' => Some(BasicType::Void),
            _ => None,
        }
    }

    /// Like [`BasicType::try_from_char`], but an unknown tag is a programming
    /// error.
    pub fn from_char(c: char) -> BasicType {
        match Self::try_from_char(c) {
            Some(bt) => bt,
            None => panic!("unknown type char: '{}'", c),
        }
    }

    pub fn is_basic_type_char(c: char) -> bool {
        "LIJFDV".contains(c)
    }

    pub fn is_arg_basic_type_char(c: char) -> bool {
        "LIJFD".contains(c)
    }

    /// Erases a richer type to its basic type.
    pub fn erase(ty: &RichType) -> BasicType {
        match ty {
            RichType::Boolean | RichType::Byte | RichType::Short | RichType::Char | RichType::Int => {
                BasicType::Int
            }
            RichType::Long => BasicType::Long,
            RichType::Float => BasicType::Float,
            RichType::Double => BasicType::Double,
            RichType::Void => BasicType::Void,
            RichType::Object | RichType::Class(_) | RichType::Array(_) => BasicType::Ref,
        }
    }

    /// The canonical rich type this basic type stands for.
    pub fn basic_class(self) -> RichType {
        match self {
            BasicType::Ref => RichType::Object,
            BasicType::Int => RichType::Int,
            BasicType::Long => RichType::Long,
            BasicType::Float => RichType::Float,
            BasicType::Double => RichType::Double,
            BasicType::Void => RichType::Void,
        }
    }

    /// Number of calling-convention slots a value of this type occupies.
    pub fn stack_slots(self) -> usize {
        match self {
            BasicType::Long | BasicType::Double => 2,
            BasicType::Void => 0,
            _ => 1,
        }
    }

    /// Parses every character of `tags` with [`BasicType::from_char`].
    pub fn types_of(tags: &str) -> Vec<BasicType> {
        tags.chars().map(BasicType::from_char).collect()
    }

    pub fn ordinals(types: &[BasicType]) -> Vec<u8> {
        types.iter().map(|t| *t as u8).collect()
    }
}

impl fmt::Display for BasicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.char())
    }
}

/// A source-level type before erasure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RichType {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    Void,
    /// The root reference type.
    Object,
    /// A named reference type.
    Class(Arc<str>),
    Array(Box<RichType>),
}

impl RichType {
    pub fn class(name: impl Into<Arc<str>>) -> RichType {
        RichType::Class(name.into())
    }

    pub fn array_of(component: RichType) -> RichType {
        RichType::Array(Box::new(component))
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, RichType::Object | RichType::Class(_) | RichType::Array(_))
    }

    pub fn component_type(&self) -> Option<&RichType> {
        match self {
            RichType::Array(c) => Some(c),
            _ => None,
        }
    }

    pub fn erase(&self) -> BasicType {
        BasicType::erase(self)
    }

    /// Position of this primitive in the wrapper ordering
    /// (boolean, byte, short, char, int, long, float, double, object, void).
    pub fn wrapper_ordinal(&self) -> Option<usize> {
        let ord = match self {
            RichType::Boolean => 0,
            RichType::Byte => 1,
            RichType::Short => 2,
            RichType::Char => 3,
            RichType::Int => 4,
            RichType::Long => 5,
            RichType::Float => 6,
            RichType::Double => 7,
            RichType::Object => 8,
            RichType::Void => 9,
            RichType::Class(_) | RichType::Array(_) => return None,
        };
        Some(ord)
    }
}

impl fmt::Display for RichType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RichType::Boolean => f.write_str("boolean"),
            RichType::Byte => f.write_str("byte"),
            RichType::Short => f.write_str("short"),
            RichType::Char => f.write_str("char"),
            RichType::Int => f.write_str("int"),
            RichType::Long => f.write_str("long"),
            RichType::Float => f.write_str("float"),
            RichType::Double => f.write_str("double"),
            RichType::Void => f.write_str("void"),
            RichType::Object => f.write_str("Object"),
            RichType::Class(name) => f.write_str(name),
            RichType::Array(c) => write!(f, "{}[]", c),
        }
    }
}

/// An erased method type: parameter basic types and a return basic type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodType {
    params: Vec<BasicType>,
    ret: BasicType,
}

impl MethodType {
    /// Panics if any parameter is `Void`.
    pub fn new(ret: BasicType, params: impl Into<Vec<BasicType>>) -> Self {
        let params = params.into();
        assert!(
            !params.contains(&BasicType::Void),
            "void is not a legal parameter type: {:?}",
            params
        );
        Self { params, ret }
    }

    /// Erases a rich method type.
    pub fn erased(ret: &RichType, params: &[RichType]) -> Self {
        Self::new(ret.erase(), params.iter().map(RichType::erase).collect::<Vec<_>>())
    }

    pub fn params(&self) -> &[BasicType] {
        &self.params
    }

    pub fn return_type(&self) -> BasicType {
        self.ret
    }

    pub fn parameter_count(&self) -> usize {
        self.params.len()
    }

    pub fn parameter_type(&self, n: usize) -> BasicType {
        self.params[n]
    }

    pub fn parameter_slot_count(&self) -> usize {
        self.params.iter().map(|t| t.stack_slots()).sum()
    }

    pub fn drop_parameter(&self, pos: usize) -> Self {
        let mut params = self.params.clone();
        params.remove(pos);
        Self { params, ret: self.ret }
    }

    pub fn insert_parameters(&self, pos: usize, types: &[BasicType]) -> Self {
        let mut params = self.params.clone();
        params.splice(pos..pos, types.iter().copied());
        Self::new(self.ret, params)
    }

    pub fn change_parameter(&self, pos: usize, ty: BasicType) -> Self {
        let mut params = self.params.clone();
        params[pos] = ty;
        Self::new(self.ret, params)
    }

    pub fn change_return(&self, ret: BasicType) -> Self {
        Self { params: self.params.clone(), ret }
    }

    /// The same type with a leading reference parameter, as seen by an
    /// invoker that receives the callee first.
    pub fn with_receiver(&self) -> Self {
        self.insert_parameters(0, &[BasicType::Ref])
    }

    /// `ABC_R`: parameter tags, an underscore, the return tag.
    pub fn basic_type_signature(&self) -> String {
        let mut sig = String::with_capacity(self.params.len() + 2);
        sig.extend(self.params.iter().map(|t| t.char()));
        sig.push('_');
        sig.push(self.ret.char());
        sig
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.basic_type_signature())
    }
}

// ---------------------------------------------------------------------------
// Signature strings
// ---------------------------------------------------------------------------

/// True for strings of the form `[LIJFD]*_[LIJFDV]`.
pub fn is_valid_signature(sig: &str) -> bool {
    let Some(arity) = sig.find('_') else {
        return false;
    };
    let bytes = sig.as_bytes();
    if bytes.len() != arity + 2 {
        return false;
    }
    for (i, &b) in bytes.iter().enumerate() {
        if i == arity {
            continue;
        }
        let c = b as char;
        if c == 'V' {
            return i == bytes.len() - 1;
        }
        if !BasicType::is_arg_basic_type_char(c) {
            return false;
        }
    }
    true
}

/// Number of parameters described by `sig`. Panics on a malformed signature.
pub fn signature_arity(sig: &str) -> usize {
    assert!(is_valid_signature(sig), "malformed signature: {}", sig);
    sig.find('_').unwrap_or_default()
}

pub fn signature_return(sig: &str) -> BasicType {
    let arity = signature_arity(sig);
    BasicType::from_char(sig.as_bytes()[arity + 1] as char)
}

/// Decodes a signature string back into a method type.
pub fn signature_type(sig: &str) -> MethodType {
    let arity = signature_arity(sig);
    let params = BasicType::types_of(&sig[..arity]);
    MethodType::new(signature_return(sig), params)
}

/// Compresses runs of three or more identical characters, e.g.
/// `LLLLI_L` becomes `L4I_L`.
pub fn shorten_signature(signature: &str) -> String {
    const MIN_RUN: usize = 3;
    let chars: Vec<char> = signature.chars().collect();
    if chars.len() < MIN_RUN {
        return signature.to_owned();
    }
    let mut out = String::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }
        if run >= MIN_RUN {
            out.push(c);
            out.push_str(&run.to_string());
        } else {
            out.extend(std::iter::repeat(c).take(run));
        }
        i += run;
    }
    out
}
