use thiserror::Error;

use crate::ir::types::BasicType;

/// Top-level error type for the lambda-form engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{}", format_error_pretty("invocation error", &format!("{}", _0)))]
    Invoke(#[from] InvokeError),

    #[error("{}", format_error_pretty("lowering error", &format!("{}", _0)))]
    Lower(#[from] LowerError),

    #[error("{}", format_error_pretty("configuration error", &format!("{}", _0)))]
    Config(#[from] ConfigError),
}

fn format_error_pretty(category: &str, msg: &str) -> String {
    format!("[{}] {}", category, msg)
}

// ---------------------------------------------------------------------------
// Invocation errors
// ---------------------------------------------------------------------------

/// Failures surfaced while running a form, either interpreted or compiled.
///
/// Errors raised by a called function travel through unchanged; the engine
/// never wraps or swallows them.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// A called function signalled failure with a message.
    #[error("{0}")]
    Raised(String),

    /// A called function signalled failure with its own error value.
    #[error(transparent)]
    Foreign(Box<dyn std::error::Error + Send + Sync>),

    #[error("wrong number of arguments: expected {expected}, got {found}")]
    ArityMismatch { expected: usize, found: usize },

    #[error("argument {index} has basic type {found}, expected {expected}")]
    ArgumentType {
        index: usize,
        expected: BasicType,
        found: BasicType,
    },

    #[error("expected a callable reference but found {found}")]
    NotCallable { found: String },

    #[error("cannot read field {index} from {found}")]
    BadCarrier { index: usize, found: String },

    #[error("position {pos} is out of range for {count} parameters")]
    BadPosition { pos: usize, count: usize },

    #[error("incompatible types: {0}")]
    IncompatibleType(String),

    #[error(transparent)]
    Lowering(#[from] LowerError),
}

impl InvokeError {
    pub fn raised(msg: impl Into<String>) -> Self {
        InvokeError::Raised(msg.into())
    }

    pub fn foreign(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        InvokeError::Foreign(Box::new(err))
    }
}

// ---------------------------------------------------------------------------
// Lowering errors
// ---------------------------------------------------------------------------

/// A backend could not produce an entry point for a form.
#[derive(Debug, Error)]
pub enum LowerError {
    #[error("backend '{backend}' cannot lower {form}: {detail}")]
    Unsupported {
        backend: &'static str,
        form: String,
        detail: String,
    },

    #[error("backend '{backend}' failed: {detail}")]
    Backend {
        backend: &'static str,
        detail: String,
    },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("configuration was already initialised")]
    AlreadyInitialized,
}
