//! Tracing initialization for the CLI.
//!
//! Diagnostics go through `tracing` on stderr; stdout is reserved for
//! the measurement reports. `RUST_LOG` always wins when set:
//! - `RUST_LOG=rustykal=debug` - all debug output
//! - `RUST_LOG=rustykal::fcch=trace` - per-candidate detector output

use tracing_subscriber::{fmt, EnvFilter};

/// Install the subscriber. Without `RUST_LOG`, `verbosity` picks the
/// default level: 0 warn, 1 info, 2 debug, 3+ trace.
pub fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "rustykal=warn",
        1 => "rustykal=info",
        2 => "rustykal=debug",
        _ => "rustykal=trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
