//! Lambda forms: a small IR for method-handle style combinators.
//!
//! Pipeline:
//!
//! ```text
//! base form → LambdaFormEditor → [TransformCache] → derived form
//!   → interpreter → (threshold reached) → LoweringBackend → EntryPoint
//! ```
//!
//! A form is a numbered sequence of parameters followed by applications of
//! named functions. Derived forms are built by buffer surgery on a copy of
//! the base form and memoized on the base form, keyed by the edit that
//! produced them, so equal edits on one base always return the same form.
//!
//! Forms run under the reference interpreter until their invocation count
//! reaches the configured threshold, then through the entry point the
//! installed backend produced. [`handle::BoundHandle`] ties the pieces
//! together: a carrier of bound values plus the form that reads them.

pub mod cache;
pub mod carrier;
pub mod codegen;
pub mod config;
pub mod edit;
pub mod error;
pub mod handle;
pub mod interp;
pub mod ir;
pub mod logging;

pub use cache::{CacheTier, TransformCache, TransformKey, TransformKind};
pub use carrier::{Carrier, CarrierLayout, Species};
pub use codegen::{EntryPoint, LoweringBackend};
pub use config::Config;
pub use edit::LambdaFormEditor;
pub use error::{ConfigError, Error, InvokeError, LowerError};
pub use handle::BoundHandle;
pub use ir::{
    Argument, BasicType, Callable, FnCallable, FormResult, LambdaForm, MethodType, Name,
    NamedFunction, RichType, Value,
};
