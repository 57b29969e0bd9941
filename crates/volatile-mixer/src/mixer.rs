//! Mixer controls and the handle that owns them
//!
//! A [`MixerHandle`] wraps one primary control plus the optional
//! "Headphone" and "Speaker" sub-controls found on the same device. Mute
//! changes on the primary are mirrored to every sub-control that is present.

use std::fmt;
use std::os::fd::RawFd;
use thiserror::Error;

/// Name of the headphone sub-control
pub const HEADPHONE_CONTROL: &str = "Headphone";

/// Name of the speaker sub-control
pub const SPEAKER_CONTROL: &str = "Speaker";

/// Default primary control
pub const DEFAULT_CONTROL: &str = "Master";

#[derive(Debug, Error)]
pub enum MixerError {
    #[error("Mixer control `{control}` unavailable on {device}: {reason}")]
    DeviceUnavailable {
        control: String,
        device: MixerDevice,
        reason: String,
    },

    #[error("Mixer control `{0}` is no longer valid")]
    HandleInvalid(String),

    #[error("Mixer driver error: {0}")]
    Driver(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Device a mixer control lives on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MixerDevice {
    /// Hardware card by index (`hw:N`)
    Card(u32),
    /// Named ALSA device such as `pulse` or `default`
    Named(String),
}

impl MixerDevice {
    /// Device string understood by ALSA
    pub fn alsa_name(&self) -> String {
        match self {
            MixerDevice::Card(index) => format!("hw:{}", index),
            MixerDevice::Named(name) => name.clone(),
        }
    }
}

impl fmt::Display for MixerDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.alsa_name())
    }
}

/// A named control on a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixerRef {
    pub control: String,
    pub device: MixerDevice,
}

impl MixerRef {
    pub fn new(control: impl Into<String>, device: MixerDevice) -> Self {
        Self {
            control: control.into(),
            device,
        }
    }
}

impl fmt::Display for MixerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.control, self.device)
    }
}

/// One open mixer control
///
/// Volumes are in the driver's 0-100 unit; callers clamp through the
/// level mapper before writing.
pub trait MixerControl {
    fn volume(&self) -> Result<u32, MixerError>;

    fn set_volume(&mut self, volume: u32) -> Result<(), MixerError>;

    fn is_muted(&self) -> Result<bool, MixerError>;

    fn set_muted(&mut self, muted: bool) -> Result<(), MixerError>;

    /// File descriptors that become readable when the driver changes state.
    /// Empty when the control cannot signal changes.
    fn poll_fds(&self) -> Result<Vec<RawFd>, MixerError>;

    /// Consume queued driver events, returning how many were handled
    fn drain_events(&mut self) -> Result<u32, MixerError>;
}

/// Opens controls on a sound device
pub trait MixerBackend {
    type Control: MixerControl;

    fn open(&mut self, control: &str, device: &MixerDevice) -> Result<Self::Control, MixerError>;
}

/// Exclusive owner of a primary control and its optional sub-controls
pub struct MixerHandle<C: MixerControl> {
    mixer_ref: MixerRef,
    primary: C,
    headphone: Option<C>,
    speaker: Option<C>,
}

impl<C: MixerControl> MixerHandle<C> {
    /// Open the primary control and resolve the sub-controls.
    ///
    /// Only the primary is required; missing sub-controls are left absent.
    pub fn open<B>(backend: &mut B, mixer_ref: MixerRef) -> Result<Self, MixerError>
    where
        B: MixerBackend<Control = C>,
    {
        let primary = backend
            .open(&mixer_ref.control, &mixer_ref.device)
            .map_err(|e| match e {
                MixerError::DeviceUnavailable { .. } => e,
                other => MixerError::DeviceUnavailable {
                    control: mixer_ref.control.clone(),
                    device: mixer_ref.device.clone(),
                    reason: other.to_string(),
                },
            })?;

        let headphone = Self::open_secondary(backend, HEADPHONE_CONTROL, &mixer_ref.device);
        let speaker = Self::open_secondary(backend, SPEAKER_CONTROL, &mixer_ref.device);

        tracing::info!(
            "Opened mixer {} (headphone: {}, speaker: {})",
            mixer_ref,
            headphone.is_some(),
            speaker.is_some()
        );

        Ok(Self {
            mixer_ref,
            primary,
            headphone,
            speaker,
        })
    }

    /// Open an optional sub-control, treating any failure as absence
    pub fn open_secondary<B>(backend: &mut B, name: &str, device: &MixerDevice) -> Option<C>
    where
        B: MixerBackend<Control = C>,
    {
        match backend.open(name, device) {
            Ok(control) => Some(control),
            Err(e) => {
                tracing::debug!("No {} control on {}: {}", name, device, e);
                None
            }
        }
    }

    pub fn mixer_ref(&self) -> &MixerRef {
        &self.mixer_ref
    }

    pub fn has_headphone(&self) -> bool {
        self.headphone.is_some()
    }

    pub fn has_speaker(&self) -> bool {
        self.speaker.is_some()
    }

    pub fn volume(&self) -> Result<u32, MixerError> {
        self.primary.volume()
    }

    pub fn set_volume(&mut self, volume: u32) -> Result<(), MixerError> {
        self.primary.set_volume(volume)
    }

    pub fn is_muted(&self) -> Result<bool, MixerError> {
        self.primary.is_muted()
    }

    /// Set mute on the primary, then mirror it onto every present sub-control.
    ///
    /// A sub-control that rejects the change is dropped and stays absent
    /// until the handle is reopened. Only a primary failure is an error.
    pub fn set_muted(&mut self, muted: bool) -> Result<(), MixerError> {
        self.primary.set_muted(muted)?;

        Self::mirror_mute(&mut self.headphone, HEADPHONE_CONTROL, muted);
        Self::mirror_mute(&mut self.speaker, SPEAKER_CONTROL, muted);

        Ok(())
    }

    fn mirror_mute(slot: &mut Option<C>, name: &str, muted: bool) {
        if let Some(control) = slot.as_mut() {
            if let Err(e) = control.set_muted(muted) {
                tracing::debug!("Dropping {} control after failed mute: {}", name, e);
                *slot = None;
            }
        }
    }

    /// Descriptors to wait on for driver-side changes
    pub fn pending_events(&self) -> Result<Vec<RawFd>, MixerError> {
        self.primary.poll_fds()
    }

    pub fn drain_events(&mut self) -> Result<u32, MixerError> {
        self.primary.drain_events()
    }
}

impl<C: MixerControl> fmt::Debug for MixerHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MixerHandle")
            .field("mixer_ref", &self.mixer_ref)
            .field("headphone", &self.headphone.is_some())
            .field("speaker", &self.speaker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSoundSystem;

    fn pulse_ref() -> MixerRef {
        MixerRef::new(DEFAULT_CONTROL, MixerDevice::Named("pulse".into()))
    }

    #[test]
    fn test_device_names() {
        assert_eq!(MixerDevice::Card(1).alsa_name(), "hw:1");
        assert_eq!(MixerDevice::Named("pulse".into()).alsa_name(), "pulse");
        assert_eq!(pulse_ref().to_string(), "Master on pulse");
    }

    #[test]
    fn test_open_missing_primary_is_unavailable() {
        let system = MockSoundSystem::new();
        let mut backend = system.backend();
        let result = MixerHandle::open(
            &mut backend,
            MixerRef::new("Nonexistent", MixerDevice::Card(0)),
        );
        assert!(matches!(
            result,
            Err(MixerError::DeviceUnavailable { .. })
        ));
    }

    #[test]
    fn test_secondaries_are_optional() {
        let system = MockSoundSystem::new();
        let mut backend = system.backend();
        let handle = MixerHandle::open(&mut backend, pulse_ref()).unwrap();
        assert!(!handle.has_headphone());
        assert!(!handle.has_speaker());
    }

    #[test]
    fn test_mute_mirrors_onto_secondaries() {
        let system = MockSoundSystem::new();
        system.add_control(HEADPHONE_CONTROL);
        system.add_control(SPEAKER_CONTROL);

        let mut backend = system.backend();
        let mut handle = MixerHandle::open(&mut backend, pulse_ref()).unwrap();
        assert!(handle.has_headphone());
        assert!(handle.has_speaker());

        handle.set_muted(true).unwrap();
        assert!(system.is_muted(DEFAULT_CONTROL));
        assert!(system.is_muted(HEADPHONE_CONTROL));
        assert!(system.is_muted(SPEAKER_CONTROL));

        handle.set_muted(false).unwrap();
        assert!(!system.is_muted(HEADPHONE_CONTROL));
        assert!(!system.is_muted(SPEAKER_CONTROL));
    }

    #[test]
    fn test_failed_secondary_becomes_absent() {
        let system = MockSoundSystem::new();
        system.add_control(HEADPHONE_CONTROL);
        system.add_control(SPEAKER_CONTROL);

        let mut backend = system.backend();
        let mut handle = MixerHandle::open(&mut backend, pulse_ref()).unwrap();
        system.remove_control(HEADPHONE_CONTROL);

        handle.set_muted(true).unwrap();
        assert!(system.is_muted(DEFAULT_CONTROL));
        assert!(system.is_muted(SPEAKER_CONTROL));
        assert!(!handle.has_headphone());
        assert!(handle.has_speaker());

        handle.set_muted(false).unwrap();
        assert!(!system.is_muted(DEFAULT_CONTROL));
        assert!(!system.is_muted(SPEAKER_CONTROL));
    }

    #[test]
    fn test_volume_passthrough() {
        let system = MockSoundSystem::new();
        let mut backend = system.backend();
        let mut handle = MixerHandle::open(&mut backend, pulse_ref()).unwrap();
        handle.set_volume(33).unwrap();
        assert_eq!(handle.volume().unwrap(), 33);
        assert_eq!(system.volume(DEFAULT_CONTROL), 33);
    }
}
