use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::carrier::Carrier;
use crate::ir::function::Callable;
use crate::ir::types::BasicType;

/// A runtime value, tagged by its basic type.
///
/// Floating-point values compare and hash by bit pattern, so `NaN` equals
/// itself and `0.0` differs from `-0.0`.
#[derive(Clone)]
pub enum Value {
    Ref(Ref),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// The absence of a value, produced by void forms.
    Void,
}

/// The reference-typed values the engine knows how to carry.
#[derive(Clone)]
pub enum Ref {
    Null,
    Str(Arc<str>),
    /// An immutable array; elements keep their own basic type.
    Array(Arc<[Value]>),
    /// Bound data of a handle.
    Carrier(Arc<Carrier>),
    /// A callable, used as the target of an invoker.
    Function(Arc<dyn Callable>),
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Value {
    pub fn null() -> Value {
        Value::Ref(Ref::Null)
    }

    pub fn string(s: impl Into<Arc<str>>) -> Value {
        Value::Ref(Ref::Str(s.into()))
    }

    pub fn array(elements: impl Into<Arc<[Value]>>) -> Value {
        Value::Ref(Ref::Array(elements.into()))
    }

    pub fn function(callable: Arc<dyn Callable>) -> Value {
        Value::Ref(Ref::Function(callable))
    }

    pub fn opaque(obj: Arc<dyn Any + Send + Sync>) -> Value {
        Value::Ref(Ref::Opaque(obj))
    }

    /// The zero value of `ty`: null for references, nothing for void.
    pub fn zero(ty: BasicType) -> Value {
        match ty {
            BasicType::Ref => Value::null(),
            BasicType::Int => Value::Int(0),
            BasicType::Long => Value::Long(0),
            BasicType::Float => Value::Float(0.0),
            BasicType::Double => Value::Double(0.0),
            BasicType::Void => Value::Void,
        }
    }

    pub fn basic_type(&self) -> BasicType {
        match self {
            Value::Ref(_) => BasicType::Ref,
            Value::Int(_) => BasicType::Int,
            Value::Long(_) => BasicType::Long,
            Value::Float(_) => BasicType::Float,
            Value::Double(_) => BasicType::Double,
            Value::Void => BasicType::Void,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Ref> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Ref(Ref::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Arc<[Value]>> {
        match self {
            Value::Ref(Ref::Array(a)) => Some(a),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Arc<dyn Callable>> {
        match self {
            Value::Ref(Ref::Function(f)) => Some(f),
            _ => None,
        }
    }

    pub fn as_carrier(&self) -> Option<&Arc<Carrier>> {
        match self {
            Value::Ref(Ref::Carrier(c)) => Some(c),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Ref(Ref::Null))
    }

    /// True when this is the zero value of its own type.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Ref(r) => matches!(r, Ref::Null),
            Value::Int(v) => *v == 0,
            Value::Long(v) => *v == 0,
            Value::Float(v) => v.to_bits() == 0,
            Value::Double(v) => v.to_bits() == 0,
            Value::Void => true,
        }
    }
}

fn thin_ptr<T: ?Sized>(arc: &Arc<T>) -> *const () {
    Arc::as_ptr(arc) as *const ()
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Ref::Null, Ref::Null) => true,
            (Ref::Str(a), Ref::Str(b)) => a == b,
            (Ref::Array(a), Ref::Array(b)) => a == b,
            (Ref::Carrier(a), Ref::Carrier(b)) => Arc::ptr_eq(a, b),
            (Ref::Function(a), Ref::Function(b)) => thin_ptr(a) == thin_ptr(b),
            (Ref::Opaque(a), Ref::Opaque(b)) => thin_ptr(a) == thin_ptr(b),
            _ => false,
        }
    }
}

impl Eq for Ref {}

impl Hash for Ref {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Ref::Null => {}
            Ref::Str(s) => s.hash(state),
            Ref::Array(a) => a.hash(state),
            Ref::Carrier(c) => thin_ptr(c).hash(state),
            Ref::Function(f) => thin_ptr(f).hash(state),
            Ref::Opaque(o) => thin_ptr(o).hash(state),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Ref(a), Value::Ref(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Void, Value::Void) => true,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Ref(r) => r.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Long(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Double(v) => v.to_bits().hash(state),
            Value::Void => {}
        }
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ref::Null => f.write_str("null"),
            Ref::Str(s) => write!(f, "{:?}", s),
            Ref::Array(a) => f.debug_list().entries(a.iter()).finish(),
            Ref::Carrier(c) => write!(f, "{:?}", c),
            Ref::Function(c) => write!(f, "<fn {:?}>", c),
            Ref::Opaque(o) => write!(f, "<opaque@{:p}>", thin_ptr(o)),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Ref(r) => write!(f, "{:?}", r),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}L", v),
            Value::Float(v) => write!(f, "{}f", v),
            Value::Double(v) => write!(f, "{}d", v),
            Value::Void => f.write_str("void"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Int(v as i32)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::string(v)
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        Value::Ref(r)
    }
}
