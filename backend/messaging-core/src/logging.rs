use tracing_subscriber::{fmt, EnvFilter};

/// Install the fmt subscriber; later calls are ignored so tests and embedding
/// services can both call it.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,messaging_core=debug"));

    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}
