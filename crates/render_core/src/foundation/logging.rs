//! Logging utilities
//!
//! The renderer logs through the `log` facade; applications pick the backend.
//! These helpers install `env_logger`, honouring `RUST_LOG` when it is set.

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system with the `RUST_LOG` filter (defaults to `info`)
pub fn init() {
    init_with_level("info");
}

/// Initialize logging with a default filter used when `RUST_LOG` is not set
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_with_level(default_filter: &str) {
    let env = env_logger::Env::default().default_filter_or(default_filter);
    if env_logger::Builder::from_env(env).try_init().is_err() {
        log::trace!("Logger already initialized");
    }
}
