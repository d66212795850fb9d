use std::fs::File;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber.
///
/// The `RUST_LOG` environment variable overrides `log_level` when set.
/// With a log file configured, records are rendered as JSON; otherwise
/// human-readable text goes to stdout.
pub fn setup_logging(log_level: &str, log_file: Option<PathBuf>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let timer = fmt::time::ChronoLocal::rfc_3339();

    if let Some(path) = log_file {
        let file = File::create(path).expect("Failed to create log file");

        let layer = fmt::layer().with_timer(timer).json().with_writer(file);

        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .init();
    } else {
        let layer = fmt::layer().with_timer(timer).with_writer(std::io::stdout);

        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .init();
    }
}
