//! Logging setup.

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level constants (same numbers as Python's logging module)
pub const DEBUG: i32 = 10;
pub const INFO: i32 = 20;
pub const WARNING: i32 = 30;
pub const ERROR: i32 = 40;

pub fn level_from_int(level: i32) -> Level {
    match level {
        i32::MIN..=DEBUG => Level::DEBUG,
        11..=INFO => Level::INFO,
        21..=WARNING => Level::WARN,
        _ => Level::ERROR,
    }
}

/// Install a global fmt subscriber. `RUST_LOG` takes precedence over `level`.
///
/// Returns false when a subscriber was already installed.
pub fn init_logger(level: i32) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level_from_int(level).into()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .try_init()
        .is_ok()
}
