//! Diagnostic logging to stderr. User-facing output stays on stdout.

use tracing_subscriber::{fmt, EnvFilter};

/// Default level when `RUST_LOG` is unset.
pub fn default_level(verbose: bool, debug: bool) -> &'static str {
    if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    }
}

pub fn init(verbose: bool, debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("donorlink={}", default_level(verbose, debug))));

    // a second init (tests) is not an error worth reporting
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
