use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "WARMPATH_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Installs the global `tracing` subscriber.
///
/// Safe to call from every invocation entry point; only the first call
/// installs anything. A subscriber installed by the host beforehand is left
/// in place.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::init_logging;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging();
        init_logging();
        tracing_subscriber::fmt::try_init().unwrap_err();
    }
}
