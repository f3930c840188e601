//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Install the global subscriber, writing compact lines to stderr.
///
/// `RUST_LOG` wins over `level` when set. Only the first call takes effect.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}
