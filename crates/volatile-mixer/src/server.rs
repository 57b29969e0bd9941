//! Sound server queries
//!
//! The sound server decides which output device is the default. The
//! controller only compares identities to detect a switch; names and
//! descriptions are never interpreted.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Sound server connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Sound server operation failed: {0}")]
    OperationFailed(String),

    #[error("Sound server did not answer in time")]
    Timeout,

    #[error("No default output device")]
    NoDefaultSink,

    #[error("Unknown output device: {0}")]
    UnknownSink(String),
}

/// Identity of the current default output device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub name: String,
    pub description: String,
}

impl DeviceIdentity {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description, self.name)
    }
}

/// An output device as listed in the sink menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkInfo {
    pub name: String,
    pub description: String,
    pub is_default: bool,
}

/// Synchronous access to the sound server
pub trait SoundServer {
    /// Query the current default sink (never cached)
    fn default_sink(&mut self) -> Result<DeviceIdentity, ServerError>;

    /// All sinks, with the default one flagged
    fn sinks(&mut self) -> Result<Vec<SinkInfo>, ServerError>;

    fn set_default_sink(&mut self, name: &str) -> Result<(), ServerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_equality_uses_both_fields() {
        let a = DeviceIdentity::new("alsa_output.usb", "USB Headset");
        let b = DeviceIdentity::new("alsa_output.usb", "USB Headset");
        let c = DeviceIdentity::new("alsa_output.usb", "Renamed");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::UnknownSink("bogus".into());
        assert!(err.to_string().contains("bogus"));
        assert!(ServerError::Timeout.to_string().contains("time"));
    }
}
