//! Configuration file and the settings the applet runs with
//!
//! The file is optional and read once at startup. Command-line flags win over
//! file values.

use crate::cli::{Args, Backend};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use volatile_mixer::level::DEFAULT_MAX_VOLUME;
use volatile_mixer::presentation::{DEFAULT_OSD_TIMEOUT, DEFAULT_SCROLL_STEP};
use volatile_mixer::sync::DEFAULT_POLL_INTERVAL;
use volatile_mixer::{DEFAULT_CONTROL, MAX_LEVEL};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Directory under the user's config dir
pub const CONFIG_DIR_NAME: &str = "volatile";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Contents of `config.toml`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub reverse_scroll: bool,
    pub card: u32,
    pub max_volume: i64,
    pub volatile_icons: bool,
    pub backend: Backend,
    pub control: String,
    pub scroll_step: u32,
    pub osd_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reverse_scroll: false,
            card: 0,
            max_volume: DEFAULT_MAX_VOLUME as i64,
            volatile_icons: false,
            backend: Backend::Auto,
            control: DEFAULT_CONTROL.to_string(),
            scroll_step: DEFAULT_SCROLL_STEP,
            osd_timeout_ms: DEFAULT_OSD_TIMEOUT.as_millis() as u64,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from the user config directory, or defaults if there is no file
    pub fn load_default() -> Result<Self, ConfigError> {
        match default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                tracing::debug!("No configuration file, using defaults");
                Ok(Self::default())
            }
        }
    }
}

/// `$XDG_CONFIG_HOME/volatile/config.toml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Clamp a requested maximum volume to `[0, 100]`
pub fn clamp_max_volume(value: i64) -> u32 {
    value.clamp(0, MAX_LEVEL as i64) as u32
}

/// Effective settings after merging file and command line
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub reverse_scroll: bool,
    pub card: u32,
    pub max_volume: u32,
    pub volatile_icons: bool,
    pub backend: Backend,
    pub control: String,
    pub scroll_step: u32,
    pub osd_timeout: Duration,
    pub poll_interval: Duration,
}

impl Settings {
    /// Command-line values override the file
    pub fn merge(config: Config, args: &Args) -> Result<Self, ConfigError> {
        if config.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        if config.scroll_step == 0 || config.scroll_step > MAX_LEVEL {
            return Err(ConfigError::Invalid(format!(
                "scroll_step must be between 1 and {}",
                MAX_LEVEL
            )));
        }

        let control = args.control.clone().unwrap_or(config.control);
        if control.trim().is_empty() {
            return Err(ConfigError::Invalid("control name is empty".into()));
        }

        Ok(Self {
            reverse_scroll: args.reverse_scroll || config.reverse_scroll,
            card: args.card.unwrap_or(config.card),
            max_volume: clamp_max_volume(args.max_volume.unwrap_or(config.max_volume)),
            volatile_icons: args.volatile_icons || config.volatile_icons,
            backend: args.backend.unwrap_or(config.backend),
            control,
            scroll_step: config.scroll_step,
            osd_timeout: Duration::from_millis(config.osd_timeout_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    /// Read the file named on the command line (or the default one) and merge
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let config = match &args.config {
            Some(path) => Config::load(path)?,
            None => Config::load_default()?,
        };
        Self::merge(config, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    fn args(extra: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("volatile").chain(extra.iter().copied())).unwrap()
    }

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::merge(Config::default(), &args(&[])).unwrap();
        assert_eq!(settings.max_volume, 100);
        assert_eq!(settings.card, 0);
        assert_eq!(settings.control, "Master");
        assert_eq!(settings.backend, Backend::Auto);
        assert_eq!(settings.scroll_step, 2);
        assert_eq!(settings.osd_timeout, Duration::from_secs(2));
        assert_eq!(settings.poll_interval, Duration::from_secs(1));
        assert!(!settings.reverse_scroll);
    }

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
reverse_scroll = true
card = 1
max_volume = 80
backend = "alsa"
scroll_step = 5
"#,
        );

        let config = Config::load(&path).unwrap();
        assert!(config.reverse_scroll);
        assert_eq!(config.card, 1);
        assert_eq!(config.backend, Backend::Alsa);
        // unspecified keys keep their defaults
        assert_eq!(config.control, "Master");
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "card = 1\nmax_volume = 80\ncontrol = \"PCM\"\n");
        let path_arg = format!("--config={}", path.display());

        let settings =
            Settings::load(&args(&[path_arg.as_str(), "--card=3", "--max-volume=60"])).unwrap();
        assert_eq!(settings.card, 3);
        assert_eq!(settings.max_volume, 60);
        assert_eq!(settings.control, "PCM");
    }

    #[test]
    fn test_max_volume_is_clamped() {
        let settings = Settings::merge(Config::default(), &args(&["-m", "150"])).unwrap();
        assert_eq!(settings.max_volume, 100);

        let settings = Settings::merge(Config::default(), &args(&["-m", "-3"])).unwrap();
        assert_eq!(settings.max_volume, 0);

        let config = Config {
            max_volume: 400,
            ..Default::default()
        };
        assert_eq!(Settings::merge(config, &args(&[])).unwrap().max_volume, 100);
    }

    #[test]
    fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "card = \"first\"\n");
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::TomlParse(_))
        ));

        let path = write_config(&dir, "colour = \"blue\"\n");
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::load(&missing),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_invalid_values() {
        let config = Config {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            Settings::merge(config, &args(&[])),
            Err(ConfigError::Invalid(_))
        ));

        let config = Config {
            scroll_step: 0,
            ..Default::default()
        };
        assert!(Settings::merge(config, &args(&[])).is_err());

        assert!(Settings::merge(Config::default(), &args(&["--control= "])).is_err());
    }
}
