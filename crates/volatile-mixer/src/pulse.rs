//! PulseAudio sound server access
//!
//! [`PulseServer`] answers synchronous queries on the caller's thread with a
//! standard (non-threaded) mainloop. [`PulseNotifications`] opens a second,
//! independent connection on a threaded mainloop for the device watcher.

use crate::server::{DeviceIdentity, ServerError, SinkInfo, SoundServer};
use crate::watcher::{NotificationSource, SourceEvent};
use libpulse_binding as pulse;
use pulse::callbacks::ListResult;
use pulse::context::subscribe::{Facility, InterestMaskSet};
use pulse::context::{Context, FlagSet as ContextFlagSet, State as ContextState};
use pulse::mainloop::standard::{IterateResult, Mainloop as StandardMainloop};
use pulse::mainloop::threaded::Mainloop as ThreadedMainloop;
use pulse::operation::{Operation, State as OperationState};
use pulse::proplist::Proplist;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};

const APPLICATION_NAME: &str = "volatile";

/// Upper bound for connecting and for any single operation
const SERVER_TIMEOUT: Duration = Duration::from_secs(5);

fn proplist(name: &str) -> Result<Proplist, ServerError> {
    let mut proplist = Proplist::new()
        .ok_or_else(|| ServerError::ConnectionFailed("proplist allocation failed".into()))?;
    proplist
        .set_str(pulse::proplist::properties::APPLICATION_NAME, name)
        .map_err(|_| ServerError::ConnectionFailed("invalid application name".into()))?;
    Ok(proplist)
}

/// Blocking sound server client for the applet's own thread
pub struct PulseServer {
    context: Context,
    mainloop: StandardMainloop,
}

impl PulseServer {
    /// Connect to the default server (or `server` when given)
    pub fn connect(server: Option<&str>) -> Result<Self, ServerError> {
        let mainloop = StandardMainloop::new()
            .ok_or_else(|| ServerError::ConnectionFailed("mainloop creation failed".into()))?;
        let proplist = proplist(APPLICATION_NAME)?;
        let mut context = Context::new_with_proplist(&mainloop, APPLICATION_NAME, &proplist)
            .ok_or_else(|| ServerError::ConnectionFailed("context creation failed".into()))?;

        context
            .connect(server, ContextFlagSet::NOAUTOSPAWN, None)
            .map_err(|e| ServerError::ConnectionFailed(ToString::to_string(&e)))?;

        let mut client = Self { mainloop, context };
        client.wait_until_ready()?;
        tracing::debug!("Connected to sound server");
        Ok(client)
    }

    fn iterate(&mut self) -> Result<(), ServerError> {
        match self.mainloop.iterate(true) {
            IterateResult::Success(_) => Ok(()),
            IterateResult::Quit(_) => Err(ServerError::ConnectionFailed("mainloop quit".into())),
            IterateResult::Err(e) => Err(ServerError::ConnectionFailed(ToString::to_string(&e))),
        }
    }

    fn wait_until_ready(&mut self) -> Result<(), ServerError> {
        let deadline = Instant::now() + SERVER_TIMEOUT;
        loop {
            self.iterate()?;
            match self.context.get_state() {
                ContextState::Ready => return Ok(()),
                ContextState::Failed | ContextState::Terminated => {
                    return Err(ServerError::ConnectionFailed(
                        "context connection failed".into(),
                    ));
                }
                _ if Instant::now() > deadline => return Err(ServerError::Timeout),
                _ => {}
            }
        }
    }

    fn wait_for<C: ?Sized>(&mut self, op: &Operation<C>) -> Result<(), ServerError> {
        let deadline = Instant::now() + SERVER_TIMEOUT;
        loop {
            match op.get_state() {
                OperationState::Done => return Ok(()),
                OperationState::Cancelled => {
                    return Err(ServerError::OperationFailed("operation cancelled".into()));
                }
                OperationState::Running if Instant::now() > deadline => {
                    return Err(ServerError::Timeout);
                }
                OperationState::Running => self.iterate()?,
            }
        }
    }

    fn default_sink_name(&mut self) -> Result<String, ServerError> {
        let result: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&result);

        let op = self.context.introspect().get_server_info(move |info| {
            *slot.borrow_mut() = info.default_sink_name.as_ref().map(|n| n.to_string());
        });
        self.wait_for(&op)?;

        result.take().ok_or(ServerError::NoDefaultSink)
    }

    fn list_sinks(&mut self) -> Result<Vec<(String, String)>, ServerError> {
        let result: Rc<RefCell<Vec<(String, String)>>> = Rc::new(RefCell::new(Vec::new()));
        let slot = Rc::clone(&result);

        let op = self.context.introspect().get_sink_info_list(move |item| {
            if let ListResult::Item(info) = item {
                let name = info.name.as_ref().map(|n| n.to_string()).unwrap_or_default();
                let description = info
                    .description
                    .as_ref()
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| name.clone());
                slot.borrow_mut().push((name, description));
            }
        });
        self.wait_for(&op)?;

        Ok(result.take())
    }
}

impl SoundServer for PulseServer {
    fn default_sink(&mut self) -> Result<DeviceIdentity, ServerError> {
        let name = self.default_sink_name()?;

        let description: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&description);
        let op = self
            .context
            .introspect()
            .get_sink_info_by_name(&name, move |item| {
                if let ListResult::Item(info) = item {
                    *slot.borrow_mut() = info.description.as_ref().map(|d| d.to_string());
                }
            });
        self.wait_for(&op)?;

        let description = description.take().unwrap_or_else(|| name.clone());
        Ok(DeviceIdentity::new(name, description))
    }

    fn sinks(&mut self) -> Result<Vec<SinkInfo>, ServerError> {
        let default = self.default_sink_name().ok();
        Ok(self
            .list_sinks()?
            .into_iter()
            .map(|(name, description)| SinkInfo {
                is_default: default.as_deref() == Some(name.as_str()),
                name,
                description,
            })
            .collect())
    }

    fn set_default_sink(&mut self, name: &str) -> Result<(), ServerError> {
        let success = Rc::new(RefCell::new(false));
        let slot = Rc::clone(&success);

        let op = self.context.set_default_sink(name, move |ok| {
            *slot.borrow_mut() = ok;
        });
        self.wait_for(&op)?;

        if success.take() {
            Ok(())
        } else {
            Err(ServerError::UnknownSink(name.to_string()))
        }
    }
}

impl Drop for PulseServer {
    fn drop(&mut self) {
        self.context.disconnect();
    }
}

/// Sink notifications from a dedicated sound server connection
#[derive(Debug, Clone, Default)]
pub struct PulseNotifications {
    server: Option<String>,
}

impl PulseNotifications {
    pub fn new(server: Option<String>) -> Self {
        Self { server }
    }
}

/// Live subscription; dropping it disconnects and stops the mainloop
pub struct PulseSubscription {
    context: Context,
    mainloop: ThreadedMainloop,
}

impl NotificationSource for PulseNotifications {
    type Subscription = PulseSubscription;

    fn subscribe(&mut self, events: Sender<SourceEvent>) -> Result<PulseSubscription, ServerError> {
        let mut mainloop = ThreadedMainloop::new()
            .ok_or_else(|| ServerError::ConnectionFailed("mainloop creation failed".into()))?;
        let proplist = proplist("volatile-watcher")?;
        let mut context = Context::new_with_proplist(&mainloop, "volatile-watcher", &proplist)
            .ok_or_else(|| ServerError::ConnectionFailed("context creation failed".into()))?;

        context
            .connect(self.server.as_deref(), ContextFlagSet::NOAUTOSPAWN, None)
            .map_err(|e| ServerError::ConnectionFailed(ToString::to_string(&e)))?;
        mainloop
            .start()
            .map_err(|e| ServerError::ConnectionFailed(ToString::to_string(&e)))?;

        let mut subscription = PulseSubscription { context, mainloop };
        subscription.wait_until_ready()?;

        let PulseSubscription { context, mainloop } = &mut subscription;
        mainloop.lock();

        let changed = events.clone();
        context.set_subscribe_callback(Some(Box::new(move |facility, _operation, _index| {
            if matches!(facility, Some(Facility::Sink) | Some(Facility::Server)) {
                let _ = changed.send(SourceEvent::Changed);
            }
        })));

        // past Ready the only transitions are failure or termination
        context.set_state_callback(Some(Box::new(move || {
            let _ = events.send(SourceEvent::Lost("connection state changed".into()));
        })));

        context.subscribe(InterestMaskSet::SINK | InterestMaskSet::SERVER, |success| {
            if !success {
                tracing::warn!("Sink event subscription was rejected");
            }
        });

        mainloop.unlock();
        Ok(subscription)
    }
}

impl PulseSubscription {
    fn wait_until_ready(&mut self) -> Result<(), ServerError> {
        let deadline = Instant::now() + SERVER_TIMEOUT;
        loop {
            self.mainloop.lock();
            let state = self.context.get_state();
            self.mainloop.unlock();

            match state {
                ContextState::Ready => return Ok(()),
                ContextState::Failed | ContextState::Terminated => {
                    return Err(ServerError::ConnectionFailed(
                        "context connection failed".into(),
                    ));
                }
                _ if Instant::now() > deadline => return Err(ServerError::Timeout),
                _ => thread::sleep(Duration::from_millis(10)),
            }
        }
    }
}

impl Drop for PulseSubscription {
    fn drop(&mut self) {
        self.mainloop.lock();
        self.context.set_state_callback(None);
        self.context.set_subscribe_callback(None);
        self.context.disconnect();
        self.mainloop.unlock();
        self.mainloop.stop();
    }
}
