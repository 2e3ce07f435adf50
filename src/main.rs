//! hlp-config - read, write and watch the shared config record from a shell
//!
//! Each invocation is one context: `save` and `clear` signal every other
//! context sharing the data directory, and `watch` prints what they write.

use std::{error::Error, process};

use clap::Parser;
use hlp_config::{
    cli::{Cli, CliService, formatting::format_error},
    config::Settings,
    config_store::ConfigStore,
    tracing_config,
};
use tracing::{Level, debug, span};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let startup = tracing_config::startup_subscriber(std::io::stderr);
    let settings = match tracing::subscriber::with_default(startup, || load_settings(&cli)) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", format_error(&e.to_string()));
            process::exit(1);
        }
    };

    let _guard = if settings.logging.file {
        Some(tracing_config::init_with_file(
            &settings.logging,
            &settings.data_dir()?,
        )?)
    } else {
        tracing_config::init(&settings.logging)?;
        None
    };
    let _span = span!(Level::DEBUG, "hlp_config_main").entered();

    run_cli_command(&cli, &settings).await
}

/// Loads settings from `--config` or the default location, then applies
/// `--data-dir`, which wins over both the file and the environment.
///
/// # Errors
/// Returns error if the settings file cannot be read, parsed or validated.
fn load_settings(cli: &Cli) -> hlp_config::Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    if let Some(dir) = &cli.data_dir {
        settings.database.data_dir = Some(dir.clone());
    }

    Ok(settings)
}

/// Executes the parsed command through the CliService.
///
/// # Errors
/// Never returns an error for a failed command; those are printed and the
/// process exits with status 1.
async fn run_cli_command(cli: &Cli, settings: &Settings) -> Result<(), Box<dyn Error>> {
    let result = match ConfigStore::from_settings(settings) {
        Ok(store) => {
            debug!(
                database = %store.database().path().display(),
                channel = %store.notifier().channel(),
                "Config store ready"
            );
            CliService::new(store)
                .execute(&cli.command)
                .await
                .map_err(|e| e.to_string())
        }
        Err(e) => Err(e.to_string()),
    };

    match result {
        Ok(output) => {
            if !output.trim().is_empty() {
                println!("{output}");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", format_error(&e));
            process::exit(1);
        }
    }
}
