//! Applet event loop
//!
//! One task on a current-thread runtime owns the controller and waits on mixer
//! changes, device-watcher messages, terminal commands, the OSD deadline and
//! the shutdown signal.

use crate::cli::Backend;
use crate::config::Settings;
use crate::terminal::{Command, HELP, TerminalRenderer};
use anyhow::{Context, Result};
use std::future::Future;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};
use volatile_mixer::alsa_backend::card_name;
use volatile_mixer::{
    AlsaBackend, DeviceWatcher, LevelMapper, MixerBackend, MixerDevice, MixerRef,
    NotificationSource, Osd, PULSE_DEVICE, Popup, PulseNotifications, PulseServer,
    ScrollDirection, ScrollStep, SoundServer, SyncController, SyncError,
};

/// Whether the loop keeps going after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App<B: MixerBackend, S: SoundServer, W: Write> {
    controller: SyncController<B, S>,
    renderer: TerminalRenderer<W>,
    scroll: ScrollStep,
    popup: Popup,
    osd: Osd,
}

impl<B: MixerBackend, S: SoundServer, W: Write> App<B, S, W> {
    pub fn new(
        controller: SyncController<B, S>,
        renderer: TerminalRenderer<W>,
        settings: &Settings,
    ) -> Self {
        Self {
            controller,
            renderer,
            scroll: ScrollStep::new(settings.scroll_step, settings.reverse_scroll),
            popup: Popup::default(),
            osd: Osd::new(settings.osd_timeout),
        }
    }

    fn render(&mut self) {
        if let Err(e) = self.controller.refresh(&mut self.renderer) {
            self.report(e);
        }
    }

    fn report(&mut self, e: SyncError) {
        warn!("{}", e);
        self.renderer.line(&format!("error: {}", e));
    }

    fn show_osd(&mut self) {
        if !self.osd.is_visible() {
            self.renderer.line("osd: visible");
        }
        self.osd.show(Instant::now());
    }

    fn scroll(&mut self, direction: ScrollDirection) {
        match self.controller.step_level(self.scroll.delta(direction)) {
            Ok(level) => {
                debug!("Scrolled to {}", level);
                self.show_osd();
                self.render();
            }
            Err(e) => self.report(e),
        }
    }

    pub fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Up => self.scroll(ScrollDirection::Up),
            Command::Down => self.scroll(ScrollDirection::Down),
            Command::Set(level) => match self.controller.set_level(level) {
                Ok(()) => {
                    self.show_osd();
                    self.render();
                }
                Err(e) => self.report(e),
            },
            Command::Mute => match self.controller.toggle_mute() {
                Ok(_) => {
                    self.show_osd();
                    self.render();
                }
                Err(e) => self.report(e),
            },
            Command::Popup => {
                let popup = self.popup.toggle();
                self.renderer.line(if popup.is_visible() {
                    "popup: visible"
                } else {
                    "popup: hidden"
                });
            }
            Command::Dismiss => {
                if self.popup.is_visible() {
                    self.popup.focus_lost();
                    self.renderer.line("popup: hidden");
                }
            }
            Command::Sinks => match self.controller.sinks() {
                Ok(sinks) => self.renderer.sinks(&sinks),
                Err(e) => self.report(e),
            },
            Command::Default(name) => match self.controller.set_default_sink(&name) {
                // the watcher will report the switch as well; reattaching twice is a no-op
                Ok(()) => self.on_device_changed(),
                Err(e) => self.report(e),
            },
            Command::Show => {
                self.renderer.invalidate();
                self.render();
            }
            Command::Help => self.renderer.line(HELP),
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    pub fn on_device_changed(&mut self) {
        match self.controller.reinit_if_device_changed() {
            Ok(true) => self.render(),
            Ok(false) => {}
            Err(e) => self.report(e),
        }
    }

    pub fn on_mixer_event(&mut self) {
        match self.controller.on_external_event(&mut self.renderer) {
            Ok(()) => self.show_osd(),
            Err(e) => self.report(e),
        }
    }

    pub fn on_osd_deadline(&mut self) {
        if self.osd.expire(Instant::now()) {
            self.renderer.line("osd: hidden");
        }
    }

    /// Run until `quit`, or until `shutdown` resolves
    pub async fn run<I, F>(mut self, input: I, mut device_rx: UnboundedReceiver<()>, shutdown: F)
    where
        I: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        let mut lines = input.lines();
        let mut input_open = true;
        let mut watching = true;
        tokio::pin!(shutdown);

        self.render();

        loop {
            let osd_deadline = self.osd.deadline();

            tokio::select! {
                result = self.controller.external_change() => match result {
                    Ok(()) => self.on_mixer_event(),
                    Err(e) => self.report(e),
                },
                message = device_rx.recv(), if watching => match message {
                    Some(()) => self.on_device_changed(),
                    None => {
                        debug!("Device watcher channel closed");
                        watching = false;
                    }
                },
                line = lines.next_line(), if input_open => match line {
                    Ok(Some(line)) => match Command::parse(&line) {
                        Some(Ok(command)) => {
                            if self.handle_command(command) == Flow::Quit {
                                info!("Quit requested");
                                break;
                            }
                        }
                        Some(Err(e)) => self.renderer.line(&format!("error: {}", e)),
                        None => {}
                    },
                    Ok(None) => {
                        debug!("Command input closed");
                        input_open = false;
                    }
                    Err(e) => {
                        warn!("Reading commands failed: {}", e);
                        input_open = false;
                    }
                },
                _ = sleep_until(osd_deadline.unwrap_or_else(Instant::now)), if osd_deadline.is_some() => {
                    self.on_osd_deadline();
                }
                _ = &mut shutdown => {
                    info!("Shutting down");
                    break;
                }
            }
        }
    }
}

fn hardware_card(card: u32) -> MixerDevice {
    match card_name(card) {
        Some(name) => info!("Using card {}: {}", card, name),
        None => debug!("Card {} has no readable name", card),
    }
    MixerDevice::Card(card)
}

/// Resolve the sound server connection and the mixer device to open
fn select_backend(settings: &Settings) -> (Option<PulseServer>, MixerDevice) {
    let pulse_device = || MixerDevice::Named(PULSE_DEVICE.to_string());

    match settings.backend {
        Backend::Alsa => (None, hardware_card(settings.card)),
        Backend::Pulse => {
            if settings.card != 0 {
                debug!("Card {} ignored with the sound server backend", settings.card);
            }
            match PulseServer::connect(None) {
                Ok(server) => (Some(server), pulse_device()),
                Err(e) => {
                    warn!("Sound server unavailable ({}), device tracking disabled", e);
                    (None, pulse_device())
                }
            }
        }
        Backend::Auto => match PulseServer::connect(None) {
            Ok(server) => (Some(server), pulse_device()),
            Err(e) => {
                info!("No sound server ({}), falling back to the hardware card", e);
                (None, hardware_card(settings.card))
            }
        },
    }
}

async fn shutdown_signal() {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = terminate => {}
        _ = interrupt => {}
    }
}

/// Start the device watcher on `source`.
///
/// Without a source the channel is closed right away and the loop stops
/// listening on it.
pub fn watch_devices<N: NotificationSource>(
    source: Option<N>,
) -> (Option<DeviceWatcher>, UnboundedReceiver<()>) {
    let (device_tx, device_rx) = mpsc::unbounded_channel();
    let Some(source) = source else {
        return (None, device_rx);
    };

    let notify = move || {
        let _ = device_tx.send(());
    };
    match DeviceWatcher::start(source, notify) {
        Ok(watcher) => (Some(watcher), device_rx),
        Err(e) => {
            warn!("Device watcher failed to start: {}", e);
            (None, device_rx)
        }
    }
}

/// Open the mixer, start device tracking and run the loop on stdin/stdout.
///
/// Returns the device watcher still running. Stopping it blocks, so the
/// caller does that once the runtime has finished.
pub async fn start(settings: Settings) -> Result<Option<DeviceWatcher>> {
    let (server, device) = select_backend(&settings);
    let mixer_ref = MixerRef::new(settings.control.clone(), device);
    info!("Using {} (max volume {})", mixer_ref, settings.max_volume);

    let controller = SyncController::open(
        AlsaBackend::new(),
        server,
        mixer_ref,
        LevelMapper::new(settings.max_volume),
    )
    .context("Cannot open primary mixer")?
    .with_poll_interval(settings.poll_interval);

    let source = controller
        .has_sound_server()
        .then(PulseNotifications::default);
    let (watcher, device_rx) = watch_devices(source);

    let renderer = TerminalRenderer::new(std::io::stdout(), settings.volatile_icons);
    let app = App::new(controller, renderer, &settings);
    app.run(BufReader::new(tokio::io::stdin()), device_rx, shutdown_signal())
        .await;

    Ok(watcher)
}
