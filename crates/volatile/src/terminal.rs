//! Terminal stand-in for the tray icon
//!
//! State is printed as one line per change: icon name, a tab, the tooltip.
//! Commands are read one per line.

use std::io::Write;
use thiserror::Error;
use volatile_mixer::{IconState, MixerState, Renderer, SinkInfo, tooltip};

/// A line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Scroll one notch up
    Up,
    /// Scroll one notch down
    Down,
    Set(i64),
    Mute,
    /// Click on the tray icon
    Popup,
    /// The popup lost focus
    Dismiss,
    Sinks,
    Default(String),
    Show,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CommandError(String);

pub const HELP: &str = "commands: up, down, set <0-100>, mute, popup, dismiss, sinks, \
                        default <sink>, show, help, quit";

impl Command {
    /// Parse one input line; blank lines yield `None`
    pub fn parse(line: &str) -> Option<Result<Command, CommandError>> {
        let mut words = line.split_whitespace();
        let verb = words.next()?;
        let arg = words.next();

        let command = match (verb, arg) {
            ("up" | "+", None) => Ok(Command::Up),
            ("down" | "-", None) => Ok(Command::Down),
            ("set", Some(value)) => value
                .parse::<i64>()
                .map(Command::Set)
                .map_err(|_| CommandError(format!("not a level: {}", value))),
            ("set", None) => Err(CommandError("set needs a level".into())),
            ("mute" | "m", None) => Ok(Command::Mute),
            ("popup" | "click", None) => Ok(Command::Popup),
            ("dismiss", None) => Ok(Command::Dismiss),
            ("sinks", None) => Ok(Command::Sinks),
            ("default", Some(name)) => Ok(Command::Default(name.to_string())),
            ("default", None) => Err(CommandError("default needs a sink name".into())),
            ("show", None) => Ok(Command::Show),
            ("help" | "?", None) => Ok(Command::Help),
            ("quit" | "q" | "exit", None) => Ok(Command::Quit),
            _ => Err(CommandError(format!("unknown command: {}", line.trim()))),
        };

        Some(command)
    }
}

/// Writes state changes to `out`, skipping repeats of the last state
pub struct TerminalRenderer<W: Write> {
    out: W,
    volatile_icons: bool,
    last: Option<MixerState>,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W, volatile_icons: bool) -> Self {
        Self {
            out,
            volatile_icons,
            last: None,
        }
    }

    /// Forget the last state so the next render always prints
    pub fn invalidate(&mut self) {
        self.last = None;
    }

    pub fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text).and_then(|_| self.out.flush()) {
            tracing::debug!("Terminal write failed: {}", e);
        }
    }

    pub fn sinks(&mut self, sinks: &[SinkInfo]) {
        for sink in sinks {
            let marker = if sink.is_default { '*' } else { ' ' };
            self.line(&format!("{} {}\t{}", marker, sink.name, sink.description));
        }
    }

    #[cfg(test)]
    pub fn output(&self) -> &W {
        &self.out
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn render(&mut self, state: &MixerState) {
        if self.last.as_ref() == Some(state) {
            return;
        }

        let icon = IconState::from(state).icon_name(self.volatile_icons);
        self.line(&format!("{}\t{}", icon, tooltip(state)));
        self.last = Some(state.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(renderer: &TerminalRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.output().clone()).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("up"), Some(Ok(Command::Up)));
        assert_eq!(Command::parse("  -  "), Some(Ok(Command::Down)));
        assert_eq!(Command::parse("set 42"), Some(Ok(Command::Set(42))));
        assert_eq!(Command::parse("set -5"), Some(Ok(Command::Set(-5))));
        assert_eq!(
            Command::parse("default alsa_output.usb"),
            Some(Ok(Command::Default("alsa_output.usb".into())))
        );
        assert_eq!(Command::parse("q"), Some(Ok(Command::Quit)));
        assert_eq!(Command::parse("   "), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(Command::parse("set loud"), Some(Err(_))));
        assert!(matches!(Command::parse("set"), Some(Err(_))));
        assert!(matches!(Command::parse("default"), Some(Err(_))));
        assert!(matches!(Command::parse("up 3"), Some(Err(_))));
        assert!(matches!(Command::parse("louder"), Some(Err(_))));
    }

    #[test]
    fn test_render_skips_repeats() {
        let mut renderer = TerminalRenderer::new(Vec::new(), false);
        let state = MixerState {
            level: 70,
            muted: false,
            device: None,
        };

        renderer.render(&state);
        renderer.render(&state);
        assert_eq!(output(&renderer), "audio-volume-high\tVolume: 70%\n");

        renderer.invalidate();
        renderer.render(&state);
        assert_eq!(output(&renderer).lines().count(), 2);
    }

    #[test]
    fn test_render_volatile_icons() {
        let mut renderer = TerminalRenderer::new(Vec::new(), true);
        renderer.render(&MixerState {
            level: 10,
            muted: true,
            device: None,
        });
        assert_eq!(
            output(&renderer),
            "volatile-audio-volume-muted\tVolume: 10% (muted)\n"
        );
    }

    #[test]
    fn test_sink_listing_marks_default() {
        let mut renderer = TerminalRenderer::new(Vec::new(), false);
        renderer.sinks(&[
            SinkInfo {
                name: "a".into(),
                description: "Speakers".into(),
                is_default: false,
            },
            SinkInfo {
                name: "b".into(),
                description: "Headset".into(),
                is_default: true,
            },
        ]);
        assert_eq!(output(&renderer), "  a\tSpeakers\n* b\tHeadset\n");
    }
}
