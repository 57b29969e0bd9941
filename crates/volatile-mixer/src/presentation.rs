//! What the tray shows: icon, tooltip, scroll step, popup and OSD timing

use crate::sync::MixerState;
use std::time::Duration;
use tokio::time::Instant;

/// Level change per scroll notch
pub const DEFAULT_SCROLL_STEP: u32 = 2;

/// How long the level OSD stays up after the last update
pub const DEFAULT_OSD_TIMEOUT: Duration = Duration::from_secs(2);

const ICON_PREFIX: &str = "volatile-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconState {
    Muted,
    Off,
    Low,
    Medium,
    High,
}

impl IconState {
    pub fn for_state(level: u32, muted: bool) -> Self {
        match level {
            _ if muted => IconState::Muted,
            0..=15 => IconState::Off,
            16..=40 => IconState::Low,
            41..=65 => IconState::Medium,
            _ => IconState::High,
        }
    }

    fn theme_name(self) -> &'static str {
        match self {
            IconState::Muted => "audio-volume-muted",
            IconState::Off => "audio-volume-off",
            IconState::Low => "audio-volume-low",
            IconState::Medium => "audio-volume-medium",
            IconState::High => "audio-volume-high",
        }
    }

    /// Theme icon name, optionally with the applet's own prefix
    pub fn icon_name(self, volatile_icons: bool) -> String {
        if volatile_icons {
            format!("{}{}", ICON_PREFIX, self.theme_name())
        } else {
            self.theme_name().to_string()
        }
    }
}

impl From<&MixerState> for IconState {
    fn from(state: &MixerState) -> Self {
        IconState::for_state(state.level, state.muted)
    }
}

pub fn tooltip(state: &MixerState) -> String {
    let mut text = format!("Volume: {}%", state.level);
    if state.muted {
        text.push_str(" (muted)");
    }
    if let Some(device) = &state.device {
        text.push_str(" \u{2014} ");
        text.push_str(&device.description);
    }
    text
}

/// Scroll direction handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollStep {
    step: u32,
    reverse: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollStep {
    pub fn new(step: u32, reverse: bool) -> Self {
        Self { step, reverse }
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn is_reversed(&self) -> bool {
        self.reverse
    }

    /// Signed level change for one scroll event
    pub fn delta(&self, direction: ScrollDirection) -> i64 {
        let delta = match direction {
            ScrollDirection::Up => self.step as i64,
            ScrollDirection::Down => -(self.step as i64),
        };
        if self.reverse { -delta } else { delta }
    }
}

impl Default for ScrollStep {
    fn default() -> Self {
        Self::new(DEFAULT_SCROLL_STEP, false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Popup {
    #[default]
    Hidden,
    Visible,
}

impl Popup {
    /// Activation flips visibility
    pub fn toggle(&mut self) -> Popup {
        *self = match self {
            Popup::Hidden => Popup::Visible,
            Popup::Visible => Popup::Hidden,
        };
        *self
    }

    pub fn focus_lost(&mut self) {
        *self = Popup::Hidden;
    }

    pub fn is_visible(&self) -> bool {
        matches!(self, Popup::Visible)
    }
}

/// Level on-screen display that hides once updates stop arriving.
///
/// Every update pushes the deadline out again.
#[derive(Debug, Clone)]
pub struct Osd {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl Osd {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    pub fn show(&mut self, now: Instant) {
        self.deadline = Some(now + self.timeout);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_visible(&self) -> bool {
        self.deadline.is_some()
    }

    /// Hide if the deadline has passed; returns whether it just hid
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for Osd {
    fn default() -> Self {
        Self::new(DEFAULT_OSD_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::DeviceIdentity;

    fn state(level: u32, muted: bool) -> MixerState {
        MixerState {
            level,
            muted,
            device: None,
        }
    }

    #[test]
    fn test_icon_thresholds() {
        assert_eq!(IconState::for_state(0, false), IconState::Off);
        assert_eq!(IconState::for_state(15, false), IconState::Off);
        assert_eq!(IconState::for_state(16, false), IconState::Low);
        assert_eq!(IconState::for_state(40, false), IconState::Low);
        assert_eq!(IconState::for_state(41, false), IconState::Medium);
        assert_eq!(IconState::for_state(65, false), IconState::Medium);
        assert_eq!(IconState::for_state(66, false), IconState::High);
        assert_eq!(IconState::for_state(100, false), IconState::High);
        assert_eq!(IconState::for_state(100, true), IconState::Muted);
    }

    #[test]
    fn test_icon_names() {
        let icon = IconState::from(&state(30, false));
        assert_eq!(icon.icon_name(false), "audio-volume-low");
        assert_eq!(icon.icon_name(true), "volatile-audio-volume-low");
        assert_eq!(
            IconState::Muted.icon_name(false),
            "audio-volume-muted"
        );
    }

    #[test]
    fn test_tooltip() {
        assert_eq!(tooltip(&state(42, false)), "Volume: 42%");
        assert_eq!(tooltip(&state(0, true)), "Volume: 0% (muted)");

        let with_device = MixerState {
            level: 75,
            muted: true,
            device: Some(DeviceIdentity::new("usb", "USB Headset")),
        };
        assert_eq!(
            tooltip(&with_device),
            "Volume: 75% (muted) \u{2014} USB Headset"
        );
    }

    #[test]
    fn test_scroll_reversal() {
        let normal = ScrollStep::default();
        assert_eq!(normal.delta(ScrollDirection::Up), 2);
        assert_eq!(normal.delta(ScrollDirection::Down), -2);

        let reversed = ScrollStep::new(5, true);
        assert_eq!(reversed.delta(ScrollDirection::Up), -5);
        assert_eq!(reversed.delta(ScrollDirection::Down), 5);
    }

    #[test]
    fn test_popup_toggle() {
        let mut popup = Popup::default();
        assert_eq!(popup.toggle(), Popup::Visible);
        assert!(popup.is_visible());
        popup.focus_lost();
        assert_eq!(popup, Popup::Hidden);
        popup.focus_lost();
        assert_eq!(popup, Popup::Hidden);
    }

    #[test]
    fn test_osd_debounce() {
        let mut osd = Osd::new(Duration::from_secs(2));
        let start = Instant::now();
        assert!(!osd.expire(start));

        osd.show(start);
        osd.show(start + Duration::from_secs(1));
        assert!(!osd.expire(start + Duration::from_secs(2)));
        assert!(osd.is_visible());

        assert!(osd.expire(start + Duration::from_secs(3)));
        assert!(!osd.is_visible());
        assert_eq!(osd.deadline(), None);
    }
}
