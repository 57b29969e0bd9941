//! Synchronization between the mixer and whatever presents it
//!
//! [`SyncController`] is the only owner of the [`MixerHandle`]. Every read
//! goes to the driver; nothing is cached between calls. Reattachment after a
//! default-sink switch takes `&mut self`, so no caller can observe the handle
//! mid-swap.

use crate::level::{LevelMapper, MAX_LEVEL};
use crate::mixer::{MixerBackend, MixerError, MixerHandle, MixerRef};
use crate::notifier::ChangeNotifier;
use crate::server::{DeviceIdentity, ServerError, SinkInfo, SoundServer};
use std::time::Duration;
use thiserror::Error;

/// Interval used when the mixer offers no descriptors to wait on
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Mixer handle is no longer valid: {0}")]
    HandleInvalid(String),

    #[error(transparent)]
    Mixer(MixerError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("No sound server available")]
    NoSoundServer,

    #[error("Change notifier failed: {0}")]
    Notifier(#[from] std::io::Error),
}

impl From<MixerError> for SyncError {
    fn from(e: MixerError) -> Self {
        match e {
            MixerError::HandleInvalid(control) => SyncError::HandleInvalid(control),
            other => SyncError::Mixer(other),
        }
    }
}

/// Snapshot handed to the renderer; fetched fresh every time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixerState {
    pub level: u32,
    pub muted: bool,
    pub device: Option<DeviceIdentity>,
}

/// Presentation side of the applet
pub trait Renderer {
    fn render(&mut self, state: &MixerState);
}

/// Owns the mixer handle and serializes every access to it
pub struct SyncController<B: MixerBackend, S: SoundServer> {
    backend: B,
    server: Option<S>,
    mapper: LevelMapper,
    handle: MixerHandle<B::Control>,
    identity: Option<DeviceIdentity>,
    subscription: Option<ChangeNotifier>,
    poll_interval: Duration,
    reattachments: u64,
}

impl<B: MixerBackend, S: SoundServer> SyncController<B, S> {
    /// Open the primary mixer.
    ///
    /// Fails with [`MixerError::DeviceUnavailable`] (wrapped) when the
    /// primary control is missing. A sound server that cannot be queried is
    /// tolerated; the device identity is simply unknown.
    pub fn open(
        mut backend: B,
        mut server: Option<S>,
        mixer_ref: MixerRef,
        mapper: LevelMapper,
    ) -> Result<Self, SyncError> {
        let identity = match server.as_mut() {
            Some(server) => match server.default_sink() {
                Ok(identity) => Some(identity),
                Err(e) => {
                    tracing::warn!("Could not query default sink: {}", e);
                    None
                }
            },
            None => None,
        };

        let handle = MixerHandle::open(&mut backend, mixer_ref)?;

        if let Some(identity) = &identity {
            tracing::info!("Attached to {}", identity);
        }

        Ok(Self {
            backend,
            server,
            mapper,
            handle,
            identity,
            subscription: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reattachments: 0,
        })
    }

    /// Interval for the timer fallback when the mixer has no descriptors
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn mapper(&self) -> LevelMapper {
        self.mapper
    }

    pub fn handle(&self) -> &MixerHandle<B::Control> {
        &self.handle
    }

    /// Number of completed reattachments
    pub fn reattachments(&self) -> u64 {
        self.reattachments
    }

    pub fn has_sound_server(&self) -> bool {
        self.server.is_some()
    }

    /// Current default output device, straight from the sound server
    pub fn current_default_device_identity(
        &mut self,
    ) -> Result<Option<DeviceIdentity>, SyncError> {
        match self.server.as_mut() {
            Some(server) => Ok(Some(server.default_sink()?)),
            None => Ok(None),
        }
    }

    /// Reopen the mixer if the default output device changed.
    ///
    /// Returns whether a reattachment happened. The new handle is opened
    /// before the old one is released; if opening fails the old handle stays
    /// in place and the identity is left untouched so the next notification
    /// retries.
    pub fn reinit_if_device_changed(&mut self) -> Result<bool, SyncError> {
        let Some(current) = self.current_default_device_identity()? else {
            return Ok(false);
        };

        if self.identity.as_ref() == Some(&current) {
            tracing::debug!("Default sink unchanged ({})", current.name);
            return Ok(false);
        }

        tracing::info!("Default sink changed to {}, reattaching", current);

        // release the readiness registration before its descriptors go away
        self.subscription = None;

        let mixer_ref = self.handle.mixer_ref().clone();
        let handle = MixerHandle::open(&mut self.backend, mixer_ref)?;
        let old = std::mem::replace(&mut self.handle, handle);
        drop(old);

        self.identity = Some(current);
        self.reattachments += 1;
        Ok(true)
    }

    pub fn get_level(&self) -> Result<u32, SyncError> {
        let volume = self.handle.volume()?;
        Ok(self.mapper.volume_to_level(volume as i64))
    }

    /// Clamp `level` to `[0, 100]` and write it through the mapper
    pub fn set_level(&mut self, level: i64) -> Result<(), SyncError> {
        let level = level.clamp(0, MAX_LEVEL as i64);
        let volume = self.mapper.level_to_volume(level);
        tracing::debug!("Setting level {} (volume {})", level, volume);
        self.handle.set_volume(volume)?;
        Ok(())
    }

    /// Move the level by `delta`, e.g. one scroll step
    pub fn step_level(&mut self, delta: i64) -> Result<u32, SyncError> {
        let level = self.get_level()? as i64;
        self.set_level(level.saturating_add(delta))?;
        self.get_level()
    }

    pub fn is_muted(&self) -> Result<bool, SyncError> {
        Ok(self.handle.is_muted()?)
    }

    /// Flip mute on the primary and every present sub-control
    pub fn toggle_mute(&mut self) -> Result<bool, SyncError> {
        let muted = !self.handle.is_muted()?;
        self.handle.set_muted(muted)?;
        tracing::info!("Output {}", if muted { "muted" } else { "unmuted" });
        Ok(muted)
    }

    /// Snapshot of level and mute, labelled with the device the handle is
    /// attached to
    pub fn state(&self) -> Result<MixerState, SyncError> {
        Ok(MixerState {
            level: self.get_level()?,
            muted: self.is_muted()?,
            device: self.identity.clone(),
        })
    }

    /// Render the current state without touching the event queue
    pub fn refresh<R: Renderer + ?Sized>(&mut self, renderer: &mut R) -> Result<(), SyncError> {
        let state = self.state()?;
        renderer.render(&state);
        Ok(())
    }

    /// Handle a readiness wake: drain the driver queue, then re-render
    pub fn on_external_event<R: Renderer + ?Sized>(
        &mut self,
        renderer: &mut R,
    ) -> Result<(), SyncError> {
        let drained = self.handle.drain_events()?;
        tracing::trace!("Drained {} mixer events", drained);
        self.refresh(renderer)
    }

    /// Wait until the mixer reports an external change.
    ///
    /// The handle's descriptors are registered with the running event loop
    /// on first use and again after every reattachment. Without descriptors
    /// the wait falls back to the poll interval.
    pub async fn external_change(&mut self) -> Result<(), SyncError> {
        if self.subscription.is_none() {
            let fds = self.handle.pending_events()?;
            self.subscription = Some(ChangeNotifier::watch(&fds, self.poll_interval));
        }

        match self.subscription.as_mut() {
            Some(notifier) => Ok(notifier.changed().await?),
            None => Ok(()),
        }
    }

    pub fn sinks(&mut self) -> Result<Vec<SinkInfo>, SyncError> {
        let server = self.server.as_mut().ok_or(SyncError::NoSoundServer)?;
        Ok(server.sinks()?)
    }

    /// Ask the sound server to switch outputs; reattachment follows from
    /// the resulting notification
    pub fn set_default_sink(&mut self, name: &str) -> Result<(), SyncError> {
        let server = self.server.as_mut().ok_or(SyncError::NoSoundServer)?;
        server.set_default_sink(name)?;
        tracing::info!("Requested default sink {}", name);
        Ok(())
    }
}
