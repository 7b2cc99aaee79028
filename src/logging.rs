//! Tracing subscriber setup for the binary.
//!
//! Filter precedence: `MERTUNE_LOG`, then `RUST_LOG`, then `info` (`debug`
//! with `--verbose`). Events go to stderr so stdout stays free for output.

use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "MERTUNE_LOG";

static INITIALISED: OnceLock<()> = OnceLock::new();

/// Errors emitted when configuring the tracing subscriber.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("tracing has already been initialised")]
    AlreadyInitialised,
    #[error("invalid log filter '{directive}': {source}")]
    Filter {
        directive: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
}

/// Directive used when neither environment variable is set.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

/// Pick the filter directive from the environment, falling back to the default.
pub fn resolve_directive(mertune_log: Option<&str>, rust_log: Option<&str>, verbose: bool) -> String {
    [mertune_log, rust_log]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| default_directive(verbose))
        .to_string()
}

/// Build an `EnvFilter` from a directive string.
pub fn build_filter(directive: &str) -> Result<EnvFilter, InitError> {
    EnvFilter::try_new(directive).map_err(|source| InitError::Filter {
        directive: directive.to_string(),
        source,
    })
}

/// Configures the global tracing subscriber.
pub fn init_tracing(verbose: bool) -> Result<(), InitError> {
    INITIALISED
        .set(())
        .map_err(|_| InitError::AlreadyInitialised)?;

    let mertune_log = std::env::var(LOG_ENV).ok();
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = resolve_directive(mertune_log.as_deref(), rust_log.as_deref(), verbose);
    let filter = build_filter(&directive)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_ansi(std::io::stderr().is_terminal());

    Registry::default().with(filter).with(fmt_layer).init();
    Ok(())
}
