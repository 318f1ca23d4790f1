//! Logging bootstrap.
//!
//! The engine only emits `tracing` events. Hosts that want them on stderr
//! call [`init`] once at startup:
//!
//! ```no_run
//! let settings = facet::config::Settings::load().unwrap_or_default();
//! facet::logging::init(&settings.logging);
//! tracing::info!("validator ready");
//! ```

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Filter from `RUST_LOG`, else the configured directive, else `info`.
fn env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a fmt subscriber.
///
/// Returns `false` when a global subscriber was already installed, which
/// leaves the existing one in place.
pub fn init(settings: &LoggingSettings) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(settings))
        .with_ansi(settings.ansi)
        .with_target(true)
        .try_init()
        .is_ok()
}
