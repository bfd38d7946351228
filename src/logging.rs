//! Logger setup for binaries. Library code only uses the `log` macros.

use env_logger::{Builder, Env};

/// Initialises `env_logger` with `default_filter` unless `RUST_LOG` overrides it.
///
/// Returns false when a logger was already installed.
pub fn init_logging(default_filter: &str) -> bool {
    Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}
