//! Command-line interface for volatile
//!
//! Handles argument parsing and logging configuration.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

/// Which mixer to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Sound server when one answers, hardware card otherwise
    #[default]
    Auto,
    /// Hardware card selected with --card
    Alsa,
    /// The sound server's ALSA plugin device
    Pulse,
}

/// volatile - volume control applet
#[derive(Parser, Debug)]
#[command(name = "volatile")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Invert the scroll direction
    #[arg(short, long)]
    pub reverse_scroll: bool,

    /// Hardware card index (ignored when using the sound server)
    #[arg(short, long, value_name = "N")]
    pub card: Option<u32>,

    /// Raw volume treated as 100%, clamped to 0-100
    #[arg(short, long, value_name = "N", allow_negative_numbers = true)]
    pub max_volume: Option<i64>,

    /// Use volatile- prefixed icon names
    #[arg(short, long)]
    pub volatile_icons: bool,

    /// Mixer backend
    #[arg(short, long, value_enum)]
    pub backend: Option<Backend>,

    /// Mixer control to drive
    #[arg(long, value_name = "NAME")]
    pub control: Option<String>,

    /// Configuration file (default: $XDG_CONFIG_HOME/volatile/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Increase logging verbosity (--verbose = debug, twice = trace)
    #[arg(long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Default filter directive when RUST_LOG is not set
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "warn"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}

/// Initialize logging to stderr based on CLI arguments
pub fn init_logging(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level()));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("volatile").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]).unwrap();
        assert!(!args.reverse_scroll);
        assert!(!args.volatile_icons);
        assert_eq!(args.card, None);
        assert_eq!(args.max_volume, None);
        assert_eq!(args.backend, None);
        assert_eq!(args.log_level(), "info");
    }

    #[test]
    fn test_short_flags() {
        let args = parse(&["-r", "-c", "1", "-m", "90", "-v", "-b", "alsa"]).unwrap();
        assert!(args.reverse_scroll);
        assert_eq!(args.card, Some(1));
        assert_eq!(args.max_volume, Some(90));
        assert!(args.volatile_icons);
        assert_eq!(args.backend, Some(Backend::Alsa));
    }

    #[test]
    fn test_long_flags() {
        let args = parse(&[
            "--reverse-scroll",
            "--card=2",
            "--max-volume=150",
            "--volatile-icons",
            "--control=PCM",
            "--config=/tmp/volatile.toml",
        ])
        .unwrap();
        assert_eq!(args.card, Some(2));
        assert_eq!(args.max_volume, Some(150));
        assert_eq!(args.control.as_deref(), Some("PCM"));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/volatile.toml")));
    }

    #[test]
    fn test_negative_max_volume_parses() {
        let args = parse(&["-m", "-10"]).unwrap();
        assert_eq!(args.max_volume, Some(-10));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(parse(&["--card=abc"]).is_err());
        assert!(parse(&["--max-volume"]).is_err());
        assert!(parse(&["--backend=jack"]).is_err());
        assert_eq!(
            parse(&["--bogus"]).unwrap_err().kind(),
            ErrorKind::UnknownArgument
        );
    }

    #[test]
    fn test_log_level() {
        assert_eq!(parse(&["-q"]).unwrap().log_level(), "warn");
        assert_eq!(parse(&["--verbose"]).unwrap().log_level(), "debug");
        assert_eq!(
            parse(&["--verbose", "--verbose"]).unwrap().log_level(),
            "trace"
        );
    }
}
