//! Tracing initialization for the binary

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directory for daily-rotated log files; file logging is off when unset
pub const ENV_LOG_DIR: &str = "UPMUX_LOG_DIR";
const LOG_PREFIX: &str = "upmux";

/// Default filter when RUST_LOG is not set
fn default_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("warn,upmux={level},upmux_core={level},upmux_gateway={level},upmux_cli={level}")
}

/// Install console (stderr) and optional file layers.
///
/// The returned guard flushes the file writer and must be kept alive for the
/// duration of the program.
pub fn init_tracing(verbose: bool) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    // Console layer: compact, on stderr so stdout stays a clean report
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .compact()
        .with_line_number(false)
        .with_file(false)
        .with_target(verbose);

    let (file_layer, guard) = match std::env::var_os(ENV_LOG_DIR) {
        Some(dir) => {
            if let Err(e) = std::fs::create_dir_all(&dir) {
                eprintln!("Warning: Failed to create logs directory: {}", e);
            }

            // Creates files like: upmux.2026-01-22.log
            match RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_PREFIX)
                .filename_suffix("log")
                .build(&dir)
            {
                Ok(appender) => {
                    let (writer, guard) = tracing_appender::non_blocking(appender);
                    let layer = fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_thread_ids(true)
                        .with_line_number(true)
                        .with_file(true)
                        .with_target(true);
                    (Some(layer), Some(guard))
                }
                Err(e) => {
                    eprintln!("Warning: Failed to create log file appender: {}", e);
                    (None, None)
                }
            }
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}
