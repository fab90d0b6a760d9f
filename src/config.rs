//! Process-wide engine tunables.
//!
//! Read once, from the environment unless [`init`] installed a value first,
//! and fixed for the life of the process.

use std::sync::OnceLock;

use crate::error::ConfigError;

pub const COMPILE_THRESHOLD_VAR: &str = "LAMBDA_FORM_COMPILE_THRESHOLD";
pub const ARITY_LIMIT_VAR: &str = "LAMBDA_FORM_INTERPRETER_ARITY_LIMIT";
pub const DEBUG_LABELS_VAR: &str = "LAMBDA_FORM_DEBUG_LABELS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Interpreted calls before a form is lowered. `None` never lowers on
    /// call count; `Some(0)` lowers on the first call.
    pub compile_threshold: Option<u32>,
    /// Largest function arity the interpreter accepts. Forms that apply a
    /// wider function are lowered as soon as they are built.
    pub interpreter_arity_limit: usize,
    /// Number form labels per stem.
    pub debug_labels: bool,
}

impl Default for Config {
    fn default() -> Self {
        DEFAULT
    }
}

pub const DEFAULT: Config = Config {
    compile_threshold: Some(30),
    interpreter_arity_limit: 253,
    debug_labels: false,
};

impl Config {
    /// Defaults overridden by any `LAMBDA_FORM_*` variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`Config::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        if let Some(raw) = lookup(COMPILE_THRESHOLD_VAR) {
            let value: i64 = parse_var(COMPILE_THRESHOLD_VAR, &raw)?;
            config.compile_threshold = match value {
                -1 => None,
                v => Some(u32::try_from(v).map_err(|_| ConfigError::InvalidValue {
                    var: COMPILE_THRESHOLD_VAR,
                    value: raw.clone(),
                    reason: "expected -1 or a non-negative count".into(),
                })?),
            };
        }
        if let Some(raw) = lookup(ARITY_LIMIT_VAR) {
            config.interpreter_arity_limit = parse_var(ARITY_LIMIT_VAR, &raw)?;
        }
        if let Some(raw) = lookup(DEBUG_LABELS_VAR) {
            config.debug_labels = match raw.trim() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: DEBUG_LABELS_VAR,
                        value: raw,
                        reason: "expected a boolean".into(),
                    })
                }
            };
        }
        Ok(config)
    }
}

fn parse_var<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var,
        value: raw.to_owned(),
        reason: e.to_string(),
    })
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Installs `config` for the process. Fails if a configuration is already
/// in effect, including one read lazily by [`get`].
pub fn init(config: Config) -> Result<(), ConfigError> {
    CONFIG.set(config).map_err(|_| ConfigError::AlreadyInitialized)
}

/// The configuration in effect, reading the environment on first use. An
/// unparsable override is reported and the defaults are used instead.
pub fn get() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::from_env().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring invalid lambda-form configuration");
            Config::default()
        })
    })
}
