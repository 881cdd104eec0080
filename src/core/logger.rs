// Structured Logging for the VWAP Laboratory
// tracing + tracing-subscriber, installed once per process

use tracing::Level;
use tracing_subscriber::EnvFilter;
use std::sync::Once;

use crate::core::config::LoggingConfig;

static INIT: Once = Once::new();

fn parse_level(log_level: &str) -> Level {
    match log_level.to_uppercase().as_str() {
        "TRACE" => Level::TRACE,
        "DEBUG" => Level::DEBUG,
        "INFO" => Level::INFO,
        "WARN" | "WARNING" => Level::WARN,
        "ERROR" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Setup structured logging for the whole process.
/// Later calls are no-ops; the first configuration wins.
pub fn setup_logging(
    log_level: Option<&str>,
    json_format: Option<bool>,
    console_output: Option<bool>,
) {
    let log_level_str = log_level.unwrap_or("INFO");
    let json_format = json_format.unwrap_or(false);
    let console_output = console_output.unwrap_or(true);
    let level = parse_level(log_level_str);

    INIT.call_once(|| {
        let filter = EnvFilter::from_default_env().add_directive(level.into());

        // try_init: a host application may already own the global subscriber
        let installed = if !console_output {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::sink)
                .try_init()
        } else if json_format {
            tracing_subscriber::fmt()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_env_filter(filter)
                .try_init()
        } else {
            tracing_subscriber::fmt()
                .with_target(true)
                .with_env_filter(filter)
                .try_init()
        };

        if installed.is_ok() {
            tracing::info!(
                log_level = %log_level_str,
                json = json_format,
                "Logging initialized"
            );
        }
    });
}

/// Setup logging from the `logging` config section
pub fn setup_logging_from(config: &LoggingConfig) {
    setup_logging(
        Some(&config.log_level),
        Some(config.json_format),
        Some(config.console_output),
    );
}
