//! Shared utilities for the rdrive sync tools.
//!
//! Home of the change interpreter ([`apply`]) that both the server and the
//! client use to replay replicated commands against a local folder, plus the
//! tracing setup shared by the binaries and the test fixtures.

pub mod apply;
pub mod rm;
pub mod testutils;

/// Initialises the global tracing subscriber from the shared verbosity
/// flags: -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR). An explicit
/// `RUST_LOG` takes precedence.
pub fn init_tracing(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "error",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
