// crates/extension_host/src/logging.rs
use tracing_subscriber::EnvFilter;

/// Installs the host's stderr subscriber. `RUST_LOG` takes precedence over
/// `default_filter`. Calling it twice is harmless.
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_err()
    {
        tracing::debug!("global subscriber already set");
    }
}
