//! Mock implementations for testing without a sound card or sound server
//!
//! [`MockSoundSystem`] models a sound server with several sinks, each
//! exposing a set of mixer controls. Controls bind to the sink that is the
//! default when they are opened, the way the ALSA `pulse` device does, so a
//! default-sink switch is only observed after reopening. Every sink owns a
//! non-blocking pipe that becomes readable on external changes, giving the
//! readiness path real file descriptors to wait on.
//!
//! # Usage
//!
//! ```
//! use volatile_mixer::mock::MockSoundSystem;
//! use volatile_mixer::{LevelMapper, MixerDevice, MixerRef, SyncController};
//!
//! let system = MockSoundSystem::new();
//! let controller = SyncController::open(
//!     system.backend(),
//!     Some(system.server()),
//!     MixerRef::new("Master", MixerDevice::Named("pulse".into())),
//!     LevelMapper::default(),
//! )?;
//! assert_eq!(controller.get_level()?, 50);
//! # Ok::<(), volatile_mixer::SyncError>(())
//! ```

use crate::mixer::{DEFAULT_CONTROL, MixerBackend, MixerControl, MixerDevice, MixerError};
use crate::server::{DeviceIdentity, ServerError, SinkInfo, SoundServer};
use crate::sync::{MixerState, Renderer};
use crate::watcher::{NotificationSource, SourceEvent};
use nix::fcntl::OFlag;
use std::collections::HashMap;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};

/// Name of the sink every mock system starts with
pub const MOCK_SINK: &str = "alsa_output.mock.analog-stereo";

/// Starting volume of the primary control
pub const MOCK_INITIAL_VOLUME: u32 = 50;

#[derive(Debug, Clone, Copy)]
struct ControlValues {
    volume: u32,
    muted: bool,
}

struct MockSink {
    description: String,
    controls: HashMap<String, ControlValues>,
    events_rx: File,
    events_tx: File,
}

impl MockSink {
    fn new(description: &str, controls: HashMap<String, ControlValues>) -> Self {
        let (rx, tx) = nix::unistd::pipe2(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC)
            .expect("[MOCK] pipe creation failed");
        Self {
            description: description.to_string(),
            controls,
            events_rx: File::from(rx),
            events_tx: File::from(tx),
        }
    }

    fn signal(&mut self) {
        let _ = self.events_tx.write(&[1]);
    }
}

#[derive(Default)]
struct MockState {
    sinks: HashMap<String, MockSink>,
    order: Vec<String>,
    default_sink: String,
    opens: HashMap<String, u32>,
    closes: HashMap<String, u32>,
    unreachable: bool,
}

impl MockState {
    fn default_sink_mut(&mut self) -> &mut MockSink {
        let name = self.default_sink.clone();
        self.sinks
            .get_mut(&name)
            .expect("[MOCK] default sink always exists")
    }
}

/// Shared in-memory sound system
#[derive(Clone)]
pub struct MockSoundSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockSoundSystem {
    /// One sink with a single `Master` control at 50%, unmuted
    pub fn new() -> Self {
        let mut controls = HashMap::new();
        controls.insert(
            DEFAULT_CONTROL.to_string(),
            ControlValues {
                volume: MOCK_INITIAL_VOLUME,
                muted: false,
            },
        );

        let mut state = MockState {
            default_sink: MOCK_SINK.to_string(),
            ..Default::default()
        };
        state
            .sinks
            .insert(MOCK_SINK.to_string(), MockSink::new("Mock Analog Stereo", controls));
        state.order.push(MOCK_SINK.to_string());

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn backend(&self) -> MockBackend {
        MockBackend {
            state: Arc::clone(&self.state),
        }
    }

    pub fn server(&self) -> MockServer {
        MockServer {
            state: Arc::clone(&self.state),
        }
    }

    /// Add a control (e.g. "Headphone") to every sink
    pub fn add_control(&self, name: &str) {
        let mut state = self.lock();
        for sink in state.sinks.values_mut() {
            sink.controls.insert(
                name.to_string(),
                ControlValues {
                    volume: MOCK_INITIAL_VOLUME,
                    muted: false,
                },
            );
        }
    }

    /// Remove a control from every sink; open handles become invalid
    pub fn remove_control(&self, name: &str) {
        let mut state = self.lock();
        for sink in state.sinks.values_mut() {
            sink.controls.remove(name);
        }
    }

    /// Add a sink with the same controls as the current default one
    pub fn add_sink(&self, name: &str, description: &str, volume: u32) {
        let mut state = self.lock();
        let mut controls = state.default_sink_mut().controls.clone();
        for values in controls.values_mut() {
            values.volume = volume;
            values.muted = false;
        }
        state
            .sinks
            .insert(name.to_string(), MockSink::new(description, controls));
        state.order.push(name.to_string());
    }

    /// Switch the default sink behind the applet's back
    pub fn switch_default_sink(&self, name: &str) {
        let mut state = self.lock();
        if state.sinks.contains_key(name) {
            state.default_sink = name.to_string();
        }
    }

    /// Make every sound server query fail
    pub fn set_server_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Change the primary volume on the default sink as another program would
    pub fn external_set_volume(&self, volume: u32) {
        let mut state = self.lock();
        let sink = state.default_sink_mut();
        if let Some(values) = sink.controls.get_mut(DEFAULT_CONTROL) {
            values.volume = volume;
        }
        sink.signal();
    }

    pub fn external_set_muted(&self, muted: bool) {
        let mut state = self.lock();
        let sink = state.default_sink_mut();
        if let Some(values) = sink.controls.get_mut(DEFAULT_CONTROL) {
            values.muted = muted;
        }
        sink.signal();
    }

    /// Volume of a control on the default sink (0 if absent)
    pub fn volume(&self, control: &str) -> u32 {
        let mut state = self.lock();
        state
            .default_sink_mut()
            .controls
            .get(control)
            .map(|v| v.volume)
            .unwrap_or(0)
    }

    pub fn is_muted(&self, control: &str) -> bool {
        let mut state = self.lock();
        state
            .default_sink_mut()
            .controls
            .get(control)
            .is_some_and(|v| v.muted)
    }

    /// How often a control name has been opened successfully
    pub fn open_count(&self, control: &str) -> u32 {
        self.lock().opens.get(control).copied().unwrap_or(0)
    }

    /// How often an opened control has been closed
    pub fn close_count(&self, control: &str) -> u32 {
        self.lock().closes.get(control).copied().unwrap_or(0)
    }
}

impl Default for MockSoundSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Opens mock controls bound to the current default sink
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MixerBackend for MockBackend {
    type Control = MockControl;

    fn open(&mut self, control: &str, device: &MixerDevice) -> Result<MockControl, MixerError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let sink = state.default_sink.clone();

        let exists = state
            .sinks
            .get(&sink)
            .is_some_and(|s| s.controls.contains_key(control));
        if !exists {
            return Err(MixerError::DeviceUnavailable {
                control: control.to_string(),
                device: device.clone(),
                reason: "no such mock control".into(),
            });
        }

        *state.opens.entry(control.to_string()).or_default() += 1;
        tracing::debug!("[MOCK] Opened {} on {}", control, sink);

        Ok(MockControl {
            state: Arc::clone(&self.state),
            sink,
            name: control.to_string(),
        })
    }
}

/// A control bound to one mock sink
pub struct MockControl {
    state: Arc<Mutex<MockState>>,
    sink: String,
    name: String,
}

impl MockControl {
    fn with_values<T>(
        &self,
        f: impl FnOnce(&mut ControlValues) -> T,
    ) -> Result<T, MixerError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .sinks
            .get_mut(&self.sink)
            .and_then(|sink| sink.controls.get_mut(&self.name))
            .map(f)
            .ok_or_else(|| MixerError::HandleInvalid(self.name.clone()))
    }
}

impl MixerControl for MockControl {
    fn volume(&self) -> Result<u32, MixerError> {
        self.with_values(|v| v.volume)
    }

    fn set_volume(&mut self, volume: u32) -> Result<(), MixerError> {
        self.with_values(|v| v.volume = volume)
    }

    fn is_muted(&self) -> Result<bool, MixerError> {
        self.with_values(|v| v.muted)
    }

    fn set_muted(&mut self, muted: bool) -> Result<(), MixerError> {
        tracing::debug!("[MOCK] {} muted: {}", self.name, muted);
        self.with_values(|v| v.muted = muted)
    }

    fn poll_fds(&self) -> Result<Vec<RawFd>, MixerError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .sinks
            .get(&self.sink)
            .map(|sink| vec![sink.events_rx.as_raw_fd()])
            .ok_or_else(|| MixerError::HandleInvalid(self.name.clone()))
    }

    fn drain_events(&mut self) -> Result<u32, MixerError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let sink = state
            .sinks
            .get_mut(&self.sink)
            .ok_or_else(|| MixerError::HandleInvalid(self.name.clone()))?;

        let mut drained = 0;
        let mut buf = [0u8; 64];
        loop {
            match sink.events_rx.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => drained += n as u32,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(drained)
    }
}

impl Drop for MockControl {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state.closes.entry(self.name.clone()).or_default() += 1;
    }
}

/// Sound server view of the mock system
pub struct MockServer {
    state: Arc<Mutex<MockState>>,
}

impl MockServer {
    fn lock(&self) -> Result<MutexGuard<'_, MockState>, ServerError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.unreachable {
            return Err(ServerError::ConnectionFailed("[MOCK] unreachable".into()));
        }
        Ok(state)
    }
}

impl SoundServer for MockServer {
    fn default_sink(&mut self) -> Result<DeviceIdentity, ServerError> {
        let state = self.lock()?;
        let sink = state
            .sinks
            .get(&state.default_sink)
            .ok_or(ServerError::NoDefaultSink)?;
        Ok(DeviceIdentity::new(&state.default_sink, &sink.description))
    }

    fn sinks(&mut self) -> Result<Vec<SinkInfo>, ServerError> {
        let state = self.lock()?;
        Ok(state
            .order
            .iter()
            .filter_map(|name| {
                state.sinks.get(name).map(|sink| SinkInfo {
                    name: name.clone(),
                    description: sink.description.clone(),
                    is_default: *name == state.default_sink,
                })
            })
            .collect())
    }

    fn set_default_sink(&mut self, name: &str) -> Result<(), ServerError> {
        let mut state = self.lock()?;
        if !state.sinks.contains_key(name) {
            return Err(ServerError::UnknownSink(name.to_string()));
        }
        state.default_sink = name.to_string();
        Ok(())
    }
}

#[derive(Default)]
struct ManualSlot {
    events: Option<Sender<SourceEvent>>,
    pending: Vec<SourceEvent>,
}

/// Notification source driven by hand from tests
pub struct ManualSource {
    slot: Arc<Mutex<ManualSlot>>,
    fail: bool,
}

/// Fires notifications into a [`ManualSource`]
#[derive(Clone)]
pub struct ManualTrigger {
    slot: Arc<Mutex<ManualSlot>>,
}

impl ManualSource {
    pub fn new() -> (Self, ManualTrigger) {
        let slot = Arc::new(Mutex::new(ManualSlot::default()));
        (
            Self {
                slot: Arc::clone(&slot),
                fail: false,
            },
            ManualTrigger { slot },
        )
    }

    /// A source whose subscription always fails
    pub fn failing() -> (Self, ManualTrigger) {
        let (mut source, trigger) = Self::new();
        source.fail = true;
        (source, trigger)
    }
}

impl NotificationSource for ManualSource {
    type Subscription = ();

    fn subscribe(&mut self, events: Sender<SourceEvent>) -> Result<(), ServerError> {
        if self.fail {
            return Err(ServerError::ConnectionFailed("[MOCK] refused".into()));
        }

        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        for event in slot.pending.drain(..) {
            let _ = events.send(event);
        }
        slot.events = Some(events);
        Ok(())
    }
}

impl ManualTrigger {
    fn fire(&self, event: SourceEvent) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        match &slot.events {
            Some(events) => {
                let _ = events.send(event);
            }
            None => slot.pending.push(event),
        }
    }

    pub fn notify(&self) {
        self.fire(SourceEvent::Changed);
    }

    pub fn disconnect(&self, reason: &str) {
        self.fire(SourceEvent::Lost(reason.to_string()));
    }
}

/// Renderer that records every state it is asked to show
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub rendered: Vec<MixerState>,
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, state: &MixerState) {
        self.rendered.push(state.clone());
    }
}
