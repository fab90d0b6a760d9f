//! Lowering of lambda forms to directly callable entry points.
//!
//! The engine never generates code itself. It hands a form to the installed
//! [`LoweringBackend`] and caches the [`EntryPoint`] it gets back on the form.
//! The default backend is [`jit::ClosureBackend`].

pub mod invokers;
pub mod jit;
pub mod printer;

use std::fmt;
use std::sync::{Arc, LazyLock, RwLock};

use crate::error::{InvokeError, LowerError};
use crate::ir::form::LambdaForm;
use crate::ir::types::MethodType;
use crate::ir::value::Value;

pub use jit::ClosureBackend;
pub use printer::emit_form_text;

/// Produces an entry point for a fully resolved form.
///
/// Implementations must be safe to call concurrently for different forms.
/// The engine calls `lower` at most once per form.
pub trait LoweringBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn lower(&self, form: &LambdaForm, signature: &MethodType) -> Result<EntryPoint, LowerError>;
}

type EntryFn = dyn Fn(&[Value]) -> Result<Value, InvokeError> + Send + Sync;

/// A compiled form, callable with the form's calling convention.
#[derive(Clone)]
pub struct EntryPoint {
    signature: MethodType,
    backend: &'static str,
    code: Arc<EntryFn>,
}

impl EntryPoint {
    pub fn new<F>(signature: MethodType, backend: &'static str, code: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        Self {
            signature,
            backend,
            code: Arc::new(code),
        }
    }

    pub fn signature(&self) -> &MethodType {
        &self.signature
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, InvokeError> {
        (self.code)(args)
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryPoint({}, {})", self.backend, self.signature)
    }
}

static BACKEND: LazyLock<RwLock<Arc<dyn LoweringBackend>>> =
    LazyLock::new(|| RwLock::new(Arc::new(ClosureBackend)));

/// Replaces the process-wide backend. Forms already compiled keep their
/// entry points.
pub fn install_backend(backend: Arc<dyn LoweringBackend>) {
    tracing::debug!(backend = backend.name(), "installing lowering backend");
    *BACKEND.write().unwrap_or_else(|e| e.into_inner()) = backend;
}

pub fn backend() -> Arc<dyn LoweringBackend> {
    BACKEND.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Lowers `form` with the current backend.
pub fn lower(form: &LambdaForm, signature: &MethodType) -> Result<EntryPoint, LowerError> {
    backend().lower(form, signature)
}
