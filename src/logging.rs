//! Subscriber setup for the crate's `tracing` events.
//!
//! Cache growth, lowering and promotion report at `debug`; cache hits and
//! interpreter steps at `trace`. Nothing is installed unless the embedder
//! asks, and an embedder's own subscriber always wins.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Filter directives read before `RUST_LOG`.
pub const LOG_ENV: &str = "LAMBDA_FORM_LOG";

/// Used when no directives are given or the given ones do not parse.
pub const DEFAULT_DIRECTIVES: &str = "lambda_form=info";

static INIT: Once = Once::new();

/// Picks the filter directives: an explicit non-empty `level`, then
/// `LAMBDA_FORM_LOG`, then `RUST_LOG`, then [`DEFAULT_DIRECTIVES`].
pub fn directives(level: Option<&str>, env: impl Fn(&str) -> Option<String>) -> String {
    if let Some(l) = level.filter(|l| !l.is_empty()) {
        return l.to_owned();
    }
    [LOG_ENV, "RUST_LOG"]
        .into_iter()
        .filter_map(|var| env(var).filter(|v| !v.is_empty()))
        .next()
        .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_owned())
}

/// Parses `directives`, falling back to [`DEFAULT_DIRECTIVES`].
pub fn env_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Installs a compact `fmt` subscriber once per process. Does nothing if a
/// global subscriber is already set.
pub fn init_with_level(level: Option<&str>) {
    INIT.call_once(|| {
        if tracing::dispatcher::has_been_set() {
            return;
        }
        let directives = directives(level, |var| std::env::var(var).ok());
        let parsed = EnvFilter::try_new(&directives);
        let rejected = parsed.is_err();

        let installed = tracing_subscriber::fmt()
            .with_env_filter(parsed.unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES)))
            .with_target(true)
            .with_thread_names(true)
            .compact()
            .try_init()
            .is_ok();
        if installed && rejected {
            tracing::warn!(%directives, fallback = DEFAULT_DIRECTIVES, "invalid log filter");
        }
    });
}

/// [`init_with_level`] driven by the environment alone.
pub fn init() {
    init_with_level(None);
}
