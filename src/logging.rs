use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize the structured logging system.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("meshvault=debug,libp2p=info")
        } else {
            EnvFilter::new("meshvault=info,libp2p=warn")
        }
    });

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)?;

    info!("logging initialized");
    Ok(())
}

/// Initialize logging, falling back to stderr if tracing setup fails.
pub fn init_logging_safe() {
    if let Err(e) = init_logging() {
        eprintln!("warning: failed to set up structured logging: {}", e);
    }
}

/// Log a per-shard state transition.
pub fn log_shard_transition(task_id: &str, segment_index: u32, status: &str) {
    info!(target: "meshvault::upload", "task {} shard {} -> {}", task_id, segment_index, status);
}

/// Log an error with additional context.
pub fn log_error_with_context(context: &str, error: &dyn std::error::Error) {
    error!(target: "meshvault::error", "{}: {}", context, error);
}
