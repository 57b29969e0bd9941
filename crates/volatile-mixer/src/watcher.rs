//! Default output device watcher
//!
//! Runs on a dedicated thread with its own sound-server connection and
//! invokes a callback for every sink notification. The watcher does not
//! compare identities; callbacks must tolerate repeats.

use crate::server::ServerError;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long `stop` waits for the thread before detaching it
const JOIN_GRACE: Duration = Duration::from_millis(500);

/// Messages delivered to the watcher thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// A sink or the default sink changed
    Changed,
    /// The connection to the sound server was lost
    Lost(String),
    /// Shutdown was requested
    Stop,
}

/// Something that can push sink notifications onto a channel
pub trait NotificationSource: Send + 'static {
    /// Kept alive for as long as the watcher listens; dropping it tears the
    /// subscription down.
    type Subscription;

    /// Connect and arrange for notifications to arrive on `events`
    fn subscribe(&mut self, events: Sender<SourceEvent>) -> Result<Self::Subscription, ServerError>;
}

/// Handle to a running watcher thread
pub struct DeviceWatcher {
    events: Sender<SourceEvent>,
    thread: Option<JoinHandle<()>>,
}

impl DeviceWatcher {
    /// Spawn the watcher thread.
    ///
    /// `on_device_changed` runs on the watcher thread; it should only hand
    /// the notification off to the owning event loop.
    pub fn start<S, F>(mut source: S, mut on_device_changed: F) -> Result<Self, ServerError>
    where
        S: NotificationSource,
        F: FnMut() + Send + 'static,
    {
        let (tx, rx) = channel();
        let source_tx = tx.clone();

        let thread = thread::Builder::new()
            .name("volatile-watcher".into())
            .spawn(move || {
                let subscription = match source.subscribe(source_tx) {
                    Ok(subscription) => subscription,
                    Err(e) => {
                        tracing::warn!("Device watcher could not subscribe: {}", e);
                        return;
                    }
                };

                tracing::info!("Device watcher started");
                listen(&rx, &mut on_device_changed);
                drop(subscription);
                tracing::info!("Device watcher stopped");
            })
            .map_err(|e| ServerError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            events: tx,
            thread: Some(thread),
        })
    }

    /// Whether the listen loop is still running
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Ask the listen loop to return. Never fails.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.events.send(SourceEvent::Stop).is_err() {
            tracing::debug!("Device watcher already gone");
        }

        let Some(thread) = self.thread.take() else {
            return;
        };

        let deadline = Instant::now() + JOIN_GRACE;
        while !thread.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        if thread.is_finished() {
            if thread.join().is_err() {
                tracing::warn!("Device watcher thread panicked");
            }
        } else {
            tracing::warn!("Device watcher did not stop in time, detaching");
        }
    }
}

impl Drop for DeviceWatcher {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}

fn listen(events: &Receiver<SourceEvent>, on_device_changed: &mut dyn FnMut()) {
    while let Ok(event) = events.recv() {
        match event {
            SourceEvent::Changed => on_device_changed(),
            SourceEvent::Lost(reason) => {
                tracing::warn!(
                    "Lost sound server connection ({}), device tracking disabled",
                    reason
                );
                return;
            }
            SourceEvent::Stop => return,
        }
    }
}
