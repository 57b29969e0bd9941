//! Mixer synchronization core
//!
//! This crate keeps a volume applet in step with the system mixer: it maps raw
//! driver volume onto a 0-100 level, waits for external changes on the
//! mixer's own descriptors, and reattaches when the sound server switches its
//! default output.
//!
//! # Backends
//!
//! - ALSA simple-mixer elements, either on a hardware card or on the `pulse`
//!   plugin device
//! - PulseAudio for default-sink identity and switch notifications
//! - An in-process mock for tests
//!
//! # Example
//!
//! ```no_run
//! use volatile_mixer::{
//!     AlsaBackend, LevelMapper, MixerDevice, MixerRef, PulseServer, SyncController, SyncError,
//! };
//!
//! fn main() -> Result<(), SyncError> {
//!     let server = PulseServer::connect(None).ok();
//!     let mut controller = SyncController::open(
//!         AlsaBackend::new(),
//!         server,
//!         MixerRef::new("Master", MixerDevice::Named("pulse".into())),
//!         LevelMapper::new(90),
//!     )?;
//!
//!     controller.set_level(40)?;
//!     println!("Level: {}", controller.get_level()?);
//!     Ok(())
//! }
//! ```

pub mod alsa_backend;
pub mod level;
pub mod mixer;
pub mod mock;
pub mod notifier;
pub mod presentation;
pub mod pulse;
pub mod server;
pub mod sync;
pub mod watcher;

pub use alsa_backend::{AlsaBackend, AlsaControl};
pub use level::{LevelMapper, MAX_LEVEL};
pub use mixer::{
    DEFAULT_CONTROL, HEADPHONE_CONTROL, MixerBackend, MixerControl, MixerDevice, MixerError,
    MixerHandle, MixerRef, SPEAKER_CONTROL,
};
pub use notifier::ChangeNotifier;
pub use presentation::{IconState, Osd, Popup, ScrollDirection, ScrollStep, tooltip};
pub use pulse::{PulseNotifications, PulseServer, PulseSubscription};
pub use server::{DeviceIdentity, ServerError, SinkInfo, SoundServer};
pub use sync::{MixerState, Renderer, SyncController, SyncError};
pub use watcher::{DeviceWatcher, NotificationSource, SourceEvent};

/// Device name of the ALSA plugin that routes to the sound server
pub const PULSE_DEVICE: &str = "pulse";
