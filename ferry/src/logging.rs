//! Diagnostic tracing for ferry.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. Stdout is reserved
//! for command output (text or JSON), so nothing here may write to it.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn`, or `ferry=debug` when `verbose` is set.
///
/// # Example
/// ```bash
/// RUST_LOG=ferry=trace ferry apply run_123
/// ```
pub fn init(verbose: bool) {
    let fallback = if verbose { "ferry=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
