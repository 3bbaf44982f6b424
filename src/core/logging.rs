//! Logging setup
//!
//! `RUST_LOG` wins when set; otherwise the level comes from the number of
//! `-v` flags on the command line.

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,chess_sync={level},shared={level}")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
