//! ALSA simple-mixer backend
//!
//! Volumes are reported the way `alsamixer`'s percentage view does: the
//! element's raw playback range scaled to 0-100.

use crate::mixer::{MixerBackend, MixerControl, MixerDevice, MixerError};
use alsa::mixer::{Mixer, Selem, SelemChannelId, SelemId};
use alsa::poll::Descriptors;
use std::os::fd::RawFd;

/// Channels tried, in order, when reading a single value
const READ_CHANNELS: [SelemChannelId; 3] = [
    SelemChannelId::FrontLeft,
    SelemChannelId::FrontRight,
    SelemChannelId::FrontCenter,
];

/// Opens simple-mixer elements through alsa-lib
#[derive(Debug, Default)]
pub struct AlsaBackend;

impl AlsaBackend {
    pub fn new() -> Self {
        Self
    }
}

impl MixerBackend for AlsaBackend {
    type Control = AlsaControl;

    fn open(&mut self, control: &str, device: &MixerDevice) -> Result<AlsaControl, MixerError> {
        let unavailable = |reason: String| MixerError::DeviceUnavailable {
            control: control.to_string(),
            device: device.clone(),
            reason,
        };

        let mixer = Mixer::new(&device.alsa_name(), false).map_err(|e| unavailable(e.to_string()))?;
        let selem_id = SelemId::new(control, 0);

        {
            let selem = mixer
                .find_selem(&selem_id)
                .ok_or_else(|| unavailable("no such simple element".into()))?;
            if !selem.has_playback_volume() && !selem.has_playback_switch() {
                return Err(unavailable("element has no playback controls".into()));
            }
        }

        tracing::debug!("Opened ALSA element {} on {}", control, device);

        Ok(AlsaControl {
            mixer,
            selem_id,
            name: control.to_string(),
        })
    }
}

/// One simple-mixer element with its own mixer connection
pub struct AlsaControl {
    mixer: Mixer,
    selem_id: SelemId,
    name: String,
}

impl AlsaControl {
    fn selem(&self) -> Result<Selem<'_>, MixerError> {
        self.mixer
            .find_selem(&self.selem_id)
            .ok_or_else(|| MixerError::HandleInvalid(self.name.clone()))
    }
}

fn driver(e: alsa::Error) -> MixerError {
    MixerError::Driver(e.to_string())
}

/// Raw element value to percent of its range
pub(crate) fn raw_to_percent(raw: i64, min: i64, max: i64) -> u32 {
    if max <= min {
        return 0;
    }
    let percent = (raw - min) as f64 * 100.0 / (max - min) as f64;
    percent.round().clamp(0.0, 100.0) as u32
}

/// Percent of range back to a raw element value
pub(crate) fn percent_to_raw(percent: u32, min: i64, max: i64) -> i64 {
    if max <= min {
        return min;
    }
    let percent = percent.min(100) as f64;
    min + ((max - min) as f64 * percent / 100.0).round() as i64
}

impl MixerControl for AlsaControl {
    fn volume(&self) -> Result<u32, MixerError> {
        let selem = self.selem()?;
        if !selem.has_playback_volume() {
            return Ok(0);
        }

        let (min, max) = selem.get_playback_volume_range();
        let channel = READ_CHANNELS
            .into_iter()
            .find(|&ch| selem.has_playback_channel(ch))
            .ok_or_else(|| MixerError::Driver(format!("{} has no playback channel", self.name)))?;

        let raw = selem.get_playback_volume(channel).map_err(driver)?;
        Ok(raw_to_percent(raw, min, max))
    }

    fn set_volume(&mut self, volume: u32) -> Result<(), MixerError> {
        let selem = self.selem()?;
        if !selem.has_playback_volume() {
            return Ok(());
        }

        let (min, max) = selem.get_playback_volume_range();
        selem
            .set_playback_volume_all(percent_to_raw(volume, min, max))
            .map_err(driver)
    }

    fn is_muted(&self) -> Result<bool, MixerError> {
        let selem = self.selem()?;
        if !selem.has_playback_switch() {
            return Ok(false);
        }

        let channel = READ_CHANNELS
            .into_iter()
            .find(|&ch| selem.has_playback_channel(ch))
            .unwrap_or(SelemChannelId::FrontLeft);
        let switch = selem.get_playback_switch(channel).map_err(driver)?;
        Ok(switch == 0)
    }

    fn set_muted(&mut self, muted: bool) -> Result<(), MixerError> {
        let selem = self.selem()?;
        if !selem.has_playback_switch() {
            tracing::debug!("{} has no playback switch", self.name);
            return Ok(());
        }

        selem
            .set_playback_switch_all(if muted { 0 } else { 1 })
            .map_err(driver)
    }

    fn poll_fds(&self) -> Result<Vec<RawFd>, MixerError> {
        let fds = Descriptors::get(&self.mixer).map_err(driver)?;
        Ok(fds.into_iter().map(|p| p.fd).collect())
    }

    fn drain_events(&mut self) -> Result<u32, MixerError> {
        self.mixer.handle_events().map_err(driver)
    }
}

/// Human readable name of a sound card, if it exists
pub fn card_name(index: u32) -> Option<String> {
    let card = alsa::card::Card::new(index as i32);
    card.get_name().ok()
}
