//! Tracing subscriber setup for the server binary.

use tracing_subscriber::EnvFilter;

/// Install the process-wide `tracing` subscriber.
///
/// Logs go to stderr in compact single-line form. `RUST_LOG` takes
/// precedence over `fallback` when set, so operators can raise verbosity
/// per module without a flag. Calling this twice is harmless; the second
/// install attempt is ignored.
pub fn init_subscriber(fallback: &str) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::new(fallback),
    };

    let _ = tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
    tracing::debug!(fallback, "tracing subscriber installed");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
