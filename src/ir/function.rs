//! Callables and the named functions that IR applications reference.
//!
//! A [`NamedFunction`] is either an already-resolved callable or a symbolic
//! [`MemberName`] that is resolved on first use. Two named functions are equal
//! when they are the same object or refer to the same member.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use crate::error::InvokeError;
use crate::ir::types::{BasicType, MethodType};
use crate::ir::value::Value;

/// Anything the engine can call with a slice of argument values.
pub trait Callable: Send + Sync + fmt::Debug {
    fn method_type(&self) -> &MethodType;

    fn invoke(&self, args: &[Value]) -> Result<Value, InvokeError>;

    /// Well-known behaviour the interpreter and editor may rely on.
    fn intrinsic(&self) -> Intrinsic {
        Intrinsic::None
    }
}

/// Behaviour tags for built-in callables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    None,
    /// Returns its single argument unchanged (or nothing, for void).
    Identity,
    /// Takes no arguments and returns the zero of its return type.
    ZeroConstant,
    /// Collects its arguments into a fresh array.
    NewArray,
    /// `(array, index)` to element.
    ArrayLoad,
    /// `(array, length)`; fails unless the array has exactly that length.
    SpreadCheck,
    /// Reads one bound field out of a carrier.
    FieldGetter,
    /// Calls the callable passed as its first argument with the rest.
    InvokeBasic,
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intrinsic::None => "none",
            Intrinsic::Identity => "identity",
            Intrinsic::ZeroConstant => "zero",
            Intrinsic::NewArray => "new_array",
            Intrinsic::ArrayLoad => "array_load",
            Intrinsic::SpreadCheck => "spread_check",
            Intrinsic::FieldGetter => "field_getter",
            Intrinsic::InvokeBasic => "invoke_basic",
        };
        f.write_str(s)
    }
}

/// A symbolic reference to a callable member: owner, name and erased type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberName {
    pub owner: Arc<str>,
    pub name: Arc<str>,
    pub ty: MethodType,
}

impl MemberName {
    pub fn new(owner: impl Into<Arc<str>>, name: impl Into<Arc<str>>, ty: MethodType) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            ty,
        }
    }
}

impl fmt::Display for MemberName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}

/// Turns a member name into something callable.
pub trait MemberResolver: Send + Sync {
    fn resolve(&self, member: &MemberName) -> Arc<dyn Callable>;
}

type NativeFn = dyn Fn(&[Value]) -> Result<Value, InvokeError> + Send + Sync;

/// A callable backed by a Rust closure.
#[derive(Clone)]
pub struct FnCallable {
    label: Arc<str>,
    ty: MethodType,
    intrinsic: Intrinsic,
    body: Arc<NativeFn>,
}

impl FnCallable {
    pub fn new<F>(label: impl Into<Arc<str>>, ty: MethodType, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            ty,
            intrinsic: Intrinsic::None,
            body: Arc::new(body),
        }
    }

    pub fn with_intrinsic(mut self, intrinsic: Intrinsic) -> Self {
        self.intrinsic = intrinsic;
        self
    }
}

impl fmt::Debug for FnCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.label, self.ty)
    }
}

impl Callable for FnCallable {
    fn method_type(&self) -> &MethodType {
        &self.ty
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, InvokeError> {
        (self.body)(args)
    }

    fn intrinsic(&self) -> Intrinsic {
        self.intrinsic
    }
}

// ---------------------------------------------------------------------------
// NamedFunction
// ---------------------------------------------------------------------------

/// A function reference held by an application name.
///
/// Cloning is cheap and preserves identity.
#[derive(Clone)]
pub struct NamedFunction(Arc<FunctionInner>);

struct FunctionInner {
    member: Option<MemberName>,
    ty: MethodType,
    resolved: OnceLock<Arc<dyn Callable>>,
    resolver: Option<Arc<dyn MemberResolver>>,
}

impl NamedFunction {
    /// Wraps an already-resolved callable. Equality is by identity.
    pub fn new(callable: Arc<dyn Callable>) -> Self {
        Self::resolved(None, callable)
    }

    /// A resolved callable that also answers to `member` for equality.
    pub fn with_member(member: MemberName, callable: Arc<dyn Callable>) -> Self {
        assert_eq!(
            member.ty,
            *callable.method_type(),
            "member {} does not match its target's type",
            member
        );
        Self::resolved(Some(member), callable)
    }

    /// A member that `resolver` turns into a callable on first use.
    pub fn lazy(member: MemberName, resolver: Arc<dyn MemberResolver>) -> Self {
        let ty = member.ty.clone();
        NamedFunction(Arc::new(FunctionInner {
            member: Some(member),
            ty,
            resolved: OnceLock::new(),
            resolver: Some(resolver),
        }))
    }

    /// Shorthand for a member backed by a closure.
    pub fn from_fn<F>(member: MemberName, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        let callable = FnCallable::new(member.to_string(), member.ty.clone(), body);
        Self::with_member(member, Arc::new(callable))
    }

    pub(crate) fn intrinsic_fn<F>(member: MemberName, intrinsic: Intrinsic, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        let callable =
            FnCallable::new(member.to_string(), member.ty.clone(), body).with_intrinsic(intrinsic);
        Self::with_member(member, Arc::new(callable))
    }

    fn resolved(member: Option<MemberName>, callable: Arc<dyn Callable>) -> Self {
        let ty = callable.method_type().clone();
        let resolved = OnceLock::new();
        let _ = resolved.set(callable);
        NamedFunction(Arc::new(FunctionInner {
            member,
            ty,
            resolved,
            resolver: None,
        }))
    }

    pub fn member(&self) -> Option<&MemberName> {
        self.0.member.as_ref()
    }

    pub fn method_type(&self) -> &MethodType {
        &self.0.ty
    }

    pub fn arity(&self) -> usize {
        self.0.ty.parameter_count()
    }

    pub fn return_type(&self) -> BasicType {
        self.0.ty.return_type()
    }

    pub fn parameter_type(&self, n: usize) -> BasicType {
        self.0.ty.parameter_type(n)
    }

    pub fn is_resolved(&self) -> bool {
        self.0.resolved.get().is_some()
    }

    /// Resolves the target on first call; later calls return the same one.
    pub fn resolve(&self) -> &Arc<dyn Callable> {
        self.0.resolved.get_or_init(|| {
            let (Some(member), Some(resolver)) = (&self.0.member, &self.0.resolver) else {
                unreachable!("unresolved named function without a resolver");
            };
            let target = resolver.resolve(member);
            assert_eq!(
                *target.method_type(),
                member.ty,
                "resolver returned a callable of the wrong type for {}",
                member
            );
            tracing::trace!(member = %member, "resolved named function");
            target
        })
    }

    pub fn invoke_with_arguments(&self, args: &[Value]) -> Result<Value, InvokeError> {
        self.resolve().invoke(args)
    }

    /// The target's intrinsic tag. Unresolved functions report `None`
    /// rather than forcing resolution.
    pub fn intrinsic(&self) -> Intrinsic {
        match self.0.resolved.get() {
            Some(target) => target.intrinsic(),
            None => Intrinsic::None,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.intrinsic() == Intrinsic::Identity
    }

    pub fn is_constant_zero(&self) -> bool {
        self.intrinsic() == Intrinsic::ZeroConstant && self.arity() == 0
    }

    pub fn ptr_eq(&self, other: &NamedFunction) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for NamedFunction {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (&self.0.member, &other.0.member) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for NamedFunction {}

impl Hash for NamedFunction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0.member {
            Some(member) => member.hash(state),
            None => (Arc::as_ptr(&self.0) as *const ()).hash(state),
        }
    }
}

impl fmt::Debug for NamedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamedFunction({})", self)
    }
}

impl fmt::Display for NamedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.0.member, self.0.resolved.get()) {
            (Some(member), _) => write!(f, "{}", member),
            (None, Some(target)) => write!(f, "{:?}", target),
            (None, None) => f.write_str("<unresolved>"),
        }
    }
}
