use std::{env, path::Path};

use tracing::{Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, fmt, fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::config::{ConfigPaths, LogFormat, LoggingSettings};

/// Initialize tracing for the application
///
/// Uses RUST_LOG if set, otherwise the configured level. Logs go to stderr
/// so command output on stdout stays machine-readable. HLP_LOG_FORMAT
/// (`pretty` or `json`) overrides the configured format.
///
/// # Errors
/// Returns error if tracing subscriber initialization fails
pub fn init(settings: &LoggingSettings) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = env_filter(settings);
    let registry = tracing_subscriber::registry().with(env_filter);

    match format(settings) {
        LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true)
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
        LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_level(true)
                        .with_thread_ids(true)
                        .with_thread_names(true)
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
    }

    Ok(())
}

/// Subscriber for the window before settings are loaded
///
/// Settings decide the real subscriber, so warnings raised while loading
/// them go through this one instead. Install it with
/// `tracing::subscriber::with_default` around the load.
pub fn startup_subscriber<W>(writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt()
        .with_writer(writer)
        .with_max_level(Level::WARN)
        .with_target(false)
        .finish()
}

/// Initialize tracing with file output
///
/// Like [`init`] but also writes logs to a daily-rotated file in the `logs`
/// directory under `data_dir`. The returned guard flushes the file writer
/// when dropped, so keep it alive for the life of the process.
///
/// # Errors
/// Returns error if file creation or tracing subscriber initialization fails
pub fn init_with_file(
    settings: &LoggingSettings,
    data_dir: &Path,
) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    const DAYS_TO_KEEP: usize = 7;

    let log_dir = ConfigPaths::log_dir(data_dir)?;

    let file_appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .max_log_files(DAYS_TO_KEEP)
        .filename_prefix("hlp-config")
        .filename_suffix("log")
        .build(&log_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let registry = tracing_subscriber::registry().with(env_filter(settings));

    match format(settings) {
        LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true)
                        .with_writer(std::io::stderr),
                )
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true)
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .try_init()?;
        }
        LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_level(true)
                        .with_writer(std::io::stderr),
                )
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(true)
                        .with_level(true)
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .try_init()?;
        }
    }

    Ok(guard)
}

fn env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(settings.level.to_string()))
}

fn format(settings: &LoggingSettings) -> LogFormat {
    match env::var("HLP_LOG_FORMAT").as_deref() {
        Ok("json") => LogFormat::Json,
        Ok("pretty") => LogFormat::Pretty,
        _ => settings.format,
    }
}
