//! IR names: parameters and applications.
//!
//! A [`Name`] is one slot of a lambda form. Parameters are distinguished by
//! object identity; applications compare structurally by function and
//! arguments. Names are immutable apart from their position index, which may
//! be set exactly once while the owning form is being normalized.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, LazyLock};

use smallvec::SmallVec;

use crate::carrier::CarrierLayout;
use crate::ir::function::NamedFunction;
use crate::ir::types::BasicType;
use crate::ir::value::Value;

/// Index of a name that does not yet belong to a form.
pub const UNRESOLVED_INDEX: i32 = -1;

/// Parameters `0..INTERNED_ARGUMENT_LIMIT` of each argument type are shared.
pub const INTERNED_ARGUMENT_LIMIT: usize = 10;

static INTERNED_ARGUMENTS: LazyLock<Vec<Vec<Name>>> = LazyLock::new(|| {
    BasicType::ARG_TYPES
        .iter()
        .map(|&ty| {
            (0..INTERNED_ARGUMENT_LIMIT)
                .map(|i| Name::parameter_at(i, ty))
                .collect()
        })
        .collect()
});

/// An argument of an application: another name or a constant.
#[derive(Clone)]
pub enum Argument {
    Name(Name),
    Const(Value),
}

impl Argument {
    pub fn basic_type(&self) -> BasicType {
        match self {
            Argument::Name(n) => n.ty(),
            Argument::Const(v) => v.basic_type(),
        }
    }

    pub fn as_name(&self) -> Option<&Name> {
        match self {
            Argument::Name(n) => Some(n),
            Argument::Const(_) => None,
        }
    }

    pub fn as_const(&self) -> Option<&Value> {
        match self {
            Argument::Const(v) => Some(v),
            Argument::Name(_) => None,
        }
    }

    fn is_same_name(&self, name: &Name) -> bool {
        matches!(self, Argument::Name(n) if Name::same(n, name))
    }
}

impl PartialEq for Argument {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Argument::Name(a), Argument::Name(b)) => a == b,
            (Argument::Const(a), Argument::Const(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Argument {}

impl Hash for Argument {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Argument::Name(n) => n.hash(state),
            Argument::Const(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Name(n) => write!(f, "{}", n),
            Argument::Const(v) => write!(f, "{}", v),
        }
    }
}

impl From<Name> for Argument {
    fn from(n: Name) -> Self {
        Argument::Name(n)
    }
}

impl From<&Name> for Argument {
    fn from(n: &Name) -> Self {
        Argument::Name(n.clone())
    }
}

impl From<Value> for Argument {
    fn from(v: Value) -> Self {
        Argument::Const(v)
    }
}

impl From<i32> for Argument {
    fn from(v: i32) -> Self {
        Argument::Const(Value::Int(v))
    }
}

/// Extra type information attached to a parameter.
#[derive(Clone)]
pub enum Constraint {
    /// The parameter holds a carrier with this layout.
    Carrier(Arc<dyn CarrierLayout>),
    /// The parameter is known to be an instance of this named type.
    Class(Arc<str>),
}

impl Constraint {
    pub fn carrier_layout(&self) -> Option<&Arc<dyn CarrierLayout>> {
        match self {
            Constraint::Carrier(layout) => Some(layout),
            Constraint::Class(_) => None,
        }
    }

    fn same_as(&self, other: &Constraint) -> bool {
        match (self, other) {
            (Constraint::Carrier(a), Constraint::Carrier(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            (Constraint::Class(a), Constraint::Class(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Carrier(layout) => write!(f, "{:?}", layout),
            Constraint::Class(name) => f.write_str(name),
        }
    }
}

// ---------------------------------------------------------------------------
// Name
// ---------------------------------------------------------------------------

/// A parameter or an application of a function to arguments.
///
/// Cloning a `Name` shares the underlying object; use [`Name::same`] for
/// identity and `==` for structural equality.
#[derive(Clone)]
pub struct Name(Arc<NameInner>);

struct NameInner {
    ty: BasicType,
    index: AtomicI32,
    function: Option<NamedFunction>,
    arguments: SmallVec<[Argument; 4]>,
    constraint: Option<Constraint>,
}

impl Name {
    fn build(
        index: i32,
        ty: BasicType,
        function: Option<NamedFunction>,
        arguments: SmallVec<[Argument; 4]>,
        constraint: Option<Constraint>,
    ) -> Name {
        Name(Arc::new(NameInner {
            ty,
            index: AtomicI32::new(index),
            function,
            arguments,
            constraint,
        }))
    }

    /// A fresh parameter with no index yet. Panics on `Void`.
    pub fn new_parameter(ty: BasicType, constraint: Option<Constraint>) -> Name {
        assert!(ty != BasicType::Void, "parameters cannot be void");
        Self::build(UNRESOLVED_INDEX, ty, None, SmallVec::new(), constraint)
    }

    /// A fresh parameter that already claims position `index`.
    pub fn parameter_at(index: usize, ty: BasicType) -> Name {
        assert!(ty != BasicType::Void, "parameters cannot be void");
        Self::build(index as i32, ty, None, SmallVec::new(), None)
    }

    /// An application of `function`. Its type is the function's return type.
    ///
    /// Panics if the argument count or any argument's basic type does not
    /// match the function's parameters.
    pub fn new_application(
        function: NamedFunction,
        arguments: impl IntoIterator<Item = Argument>,
    ) -> Name {
        let arguments: SmallVec<[Argument; 4]> = arguments.into_iter().collect();
        assert_eq!(
            arguments.len(),
            function.arity(),
            "{}: expected {} arguments, got {}",
            function,
            function.arity(),
            arguments.len()
        );
        for (i, arg) in arguments.iter().enumerate() {
            let expected = function.parameter_type(i);
            assert!(
                arg.basic_type() == expected,
                "{}: argument {} is {} but the parameter is {}",
                function,
                i,
                arg.basic_type(),
                expected
            );
        }
        let ty = function.return_type();
        Self::build(UNRESOLVED_INDEX, ty, Some(function), arguments, None)
    }

    /// The shared parameter `which` of type `ty`, or a fresh one past the
    /// interned range.
    pub fn argument(which: usize, ty: BasicType) -> Name {
        if which < INTERNED_ARGUMENT_LIMIT && ty != BasicType::Void {
            INTERNED_ARGUMENTS[ty.ordinal()][which].clone()
        } else {
            Self::parameter_at(which, ty)
        }
    }

    /// Parameters `0..types.len()` with the given types.
    pub fn arguments_for(types: &[BasicType]) -> Vec<Name> {
        types
            .iter()
            .enumerate()
            .map(|(i, &ty)| Self::argument(i, ty))
            .collect()
    }

    /// The shared equivalent of this indexed, unconstrained parameter.
    pub fn intern(&self) -> Name {
        assert!(self.is_param(), "only parameters can be interned: {}", self);
        match self.index() {
            Some(i) if i < INTERNED_ARGUMENT_LIMIT && self.0.constraint.is_none() => {
                INTERNED_ARGUMENTS[self.0.ty.ordinal()][i].clone()
            }
            _ => self.clone(),
        }
    }

    pub fn is_interned(&self) -> bool {
        match self.index() {
            Some(i) if i < INTERNED_ARGUMENT_LIMIT && self.is_param() => {
                Name::same(self, &INTERNED_ARGUMENTS[self.0.ty.ordinal()][i])
            }
            _ => false,
        }
    }

    /// A copy with a different constraint. Returns `self` if unchanged.
    pub fn with_constraint(&self, constraint: Option<Constraint>) -> Name {
        let unchanged = match (&self.0.constraint, &constraint) {
            (None, None) => true,
            (Some(a), Some(b)) => a.same_as(b),
            _ => false,
        };
        if unchanged {
            return self.clone();
        }
        Self::build(
            self.raw_index(),
            self.0.ty,
            self.0.function.clone(),
            self.0.arguments.clone(),
            constraint,
        )
    }

    // -- accessors ---------------------------------------------------------

    pub fn ty(&self) -> BasicType {
        self.0.ty
    }

    pub fn raw_index(&self) -> i32 {
        self.0.index.load(Ordering::Acquire)
    }

    pub fn index(&self) -> Option<usize> {
        usize::try_from(self.raw_index()).ok()
    }

    pub fn function(&self) -> Option<&NamedFunction> {
        self.0.function.as_ref()
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.0.arguments
    }

    pub fn constraint(&self) -> Option<&Constraint> {
        self.0.constraint.as_ref()
    }

    pub fn is_param(&self) -> bool {
        self.0.function.is_none()
    }

    /// True for a zero-argument call of a zero-constant function.
    pub fn is_constant_zero(&self) -> bool {
        match &self.0.function {
            Some(f) => self.0.arguments.is_empty() && f.is_constant_zero(),
            None => false,
        }
    }

    /// Identity comparison.
    pub fn same(a: &Name, b: &Name) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    // -- indexing ----------------------------------------------------------

    /// Claims position `i` if no index is set yet. Returns whether the name
    /// now sits at `i`.
    pub(crate) fn init_index(&self, i: usize) -> bool {
        let i = i as i32;
        match self
            .0
            .index
            .compare_exchange(UNRESOLVED_INDEX, i, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(current) => current == i,
        }
    }

    /// This name if it sits at `i` or has no index yet, in which case it
    /// claims `i`. Otherwise a copy at `i`.
    pub fn with_index(&self, i: usize) -> Name {
        if self.init_index(i) {
            return self.clone();
        }
        self.clone_with_index(i)
    }

    pub(crate) fn clone_with_index(&self, i: usize) -> Name {
        Self::build(
            i as i32,
            self.0.ty,
            self.0.function.clone(),
            self.0.arguments.clone(),
            self.0.constraint.clone(),
        )
    }

    // -- rewriting ---------------------------------------------------------

    /// A copy with every argument identical to `old` replaced by `new`.
    /// Returns `self` when nothing matches.
    pub fn replace_argument_occurrences(&self, old: &Name, new: &Name) -> Name {
        if Name::same(old, new) || self.is_param() {
            return self.clone();
        }
        if !self.0.arguments.iter().any(|a| a.is_same_name(old)) {
            return self.clone();
        }
        let arguments = self
            .0
            .arguments
            .iter()
            .map(|a| {
                if a.is_same_name(old) {
                    Argument::Name(new.clone())
                } else {
                    a.clone()
                }
            })
            .collect();
        Self::build(
            UNRESOLVED_INDEX,
            self.0.ty,
            self.0.function.clone(),
            arguments,
            self.0.constraint.clone(),
        )
    }

    /// Rewrites arguments that are `old[i]` for some `i` in `start..end` to
    /// `new[i]`. Returns `self` when nothing changes.
    pub(crate) fn replace_names(&self, old: &[Name], new: &[Name], start: usize, end: usize) -> Name {
        if start >= end || self.is_param() {
            return self.clone();
        }
        let mut replaced: Option<SmallVec<[Argument; 4]>> = None;
        'each_arg: for (j, arg) in self.0.arguments.iter().enumerate() {
            let Argument::Name(n) = arg else {
                continue;
            };
            if let Some(check) = n.index() {
                if check < new.len() && Name::same(n, &new[check]) {
                    continue;
                }
            }
            for i in start..end {
                if Name::same(n, &old[i]) {
                    if Name::same(n, &new[i]) {
                        continue 'each_arg;
                    }
                    let args = replaced.get_or_insert_with(|| self.0.arguments.clone());
                    args[j] = Argument::Name(new[i].clone());
                    continue 'each_arg;
                }
            }
        }
        match replaced {
            Some(arguments) => Self::build(
                UNRESOLVED_INDEX,
                self.0.ty,
                self.0.function.clone(),
                arguments,
                self.0.constraint.clone(),
            ),
            None => self.clone(),
        }
    }

    // -- queries -----------------------------------------------------------

    /// How many arguments are identical to `n`.
    pub fn use_count(&self, n: &Name) -> usize {
        self.0.arguments.iter().filter(|a| a.is_same_name(n)).count()
    }

    /// Position of the last argument identical to `n`.
    pub fn last_use_index(&self, n: &Name) -> Option<usize> {
        self.0.arguments.iter().rposition(|a| a.is_same_name(n))
    }

    pub fn refers_to(&self, n: &Name) -> bool {
        self.last_use_index(n).is_some()
    }

    /// `a3:L` for parameters, `t5:I` for applications.
    pub fn param_string(&self) -> String {
        self.to_string()
    }

    /// `Owner.fn(a0:L,7)` for applications, the short form for parameters.
    pub fn expr_string(&self) -> String {
        let Some(function) = &self.0.function else {
            return self.to_string();
        };
        let args: Vec<String> = self.0.arguments.iter().map(|a| a.to_string()).collect();
        format!("{}({})", function, args.join(","))
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        if Name::same(self, other) {
            return true;
        }
        if self.is_param() || other.is_param() {
            return false;
        }
        self.0.ty == other.0.ty
            && self.0.function == other.0.function
            && self.0.arguments == other.0.arguments
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if self.is_param() {
            (self.raw_index() | ((self.0.ty as i32) << 8)).hash(state);
        } else {
            self.0.function.hash(state);
            self.0.arguments.as_slice().hash(state);
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.is_param() { 'a' } else { 't' };
        match self.index() {
            Some(i) => write!(f, "{}{}:{}", prefix, i, self.0.ty),
            None => write!(f, "{}@{:p}:{}", prefix, Arc::as_ptr(&self.0), self.0.ty),
        }
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_param() {
            match &self.0.constraint {
                Some(c) => write!(f, "{}/{:?}", self, c),
                None => write!(f, "{}", self),
            }
        } else {
            write!(f, "{}={}", self, self.expr_string())
        }
    }
}
