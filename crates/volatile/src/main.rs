//! volatile
//!
//! Volume control applet core. Keeps a 0-100 level in step with the system
//! mixer and follows the sound server's default output.
//!
//! Startup sequence:
//! 1. Parse arguments and read the configuration file
//! 2. Pick a backend and open the primary mixer control
//! 3. Start the device watcher when a sound server is available
//! 4. Run the event loop until quit or a termination signal
//! 5. Shut the runtime down, then stop the device watcher

mod app;
mod cli;
mod config;
mod terminal;

use anyhow::{Context, Result};
use clap::Parser;
use clap::error::ErrorKind;
use cli::Args;
use config::Settings;
use std::process::ExitCode;
use volatile_mixer::{MixerError, SyncError};

/// Malformed arguments or configuration
const EXIT_USAGE: u8 = 1;

/// The primary mixer control could not be opened
const EXIT_MIXER_UNAVAILABLE: u8 = 2;

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(EXIT_USAGE);
        }
    };

    cli::init_logging(&args);

    let settings = match Settings::load(&args) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("volatile: {}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    tracing::info!("volatile {} starting", env!("CARGO_PKG_VERSION"));

    match run(settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("volatile: {:#}", e);
            if mixer_unavailable(&e) {
                ExitCode::from(EXIT_MIXER_UNAVAILABLE)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(settings: Settings) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start event loop")?;

    let watcher = runtime.block_on(app::start(settings))?;
    drop(runtime);

    if let Some(watcher) = watcher {
        watcher.stop();
    }
    Ok(())
}

fn mixer_unavailable(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<SyncError>(),
        Some(SyncError::Mixer(MixerError::DeviceUnavailable { .. }))
    )
}
