use tracing_subscriber::EnvFilter;

/// Initialize the `tracing` subscriber. `--log-level`/`--verbose` take
/// priority over `BASTION_AGENT_LOG_LEVEL`, which takes priority over
/// `RUST_LOG`; with none set, falls back to `info`.
pub fn setup_logging(log_level: Option<&str>, verbose: bool) {
    let directive = if let Some(level) = log_level {
        level.to_string()
    } else if verbose {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("BASTION_AGENT_LOG_LEVEL") {
        level
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
    };

    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
