pub mod builtins;
pub mod form;
pub mod function;
pub mod name;
pub mod types;
pub mod value;
pub mod verify;

pub use form::{CustomizationTarget, FormResult, LambdaForm};
pub use function::{Callable, FnCallable, Intrinsic, MemberName, MemberResolver, NamedFunction};
pub use name::{Argument, Constraint, Name, INTERNED_ARGUMENT_LIMIT};
pub use types::{
    is_valid_signature, shorten_signature, signature_arity, signature_return, signature_type,
    BasicType, MethodType, RichType,
};
pub use value::{Ref, Value};
