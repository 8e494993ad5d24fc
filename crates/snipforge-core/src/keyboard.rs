use crate::error::{Result, SnipForgeError};
use enigo::{Direction, Enigo, Key as EnigoKey, Keyboard, Settings};
use rdev::{self, EventType, Key as RdevKey};
use std::time::SystemTime;

/// Logical key identifier, independent of the capture backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Any key that produced a printable character (including space).
    Character,
    Backspace,
    Enter,
    Tab,
    Escape,
    Delete,
    /// Arrows, Home/End, Page Up/Down.
    Navigation,
    Function,
    Shift,
    CapsLock,
    AltGraph,
    Control,
    Alt,
    Meta,
    Other,
}

/// Modifier keys held at the time of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub control: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    /// True when a held modifier turns keystrokes into shortcuts.
    pub fn has_command(&self) -> bool {
        self.control || self.alt || self.meta
    }

    /// Track a modifier key transition.
    pub fn apply(&mut self, key: Key, pressed: bool) {
        match key {
            Key::Shift => self.shift = pressed,
            Key::Control => self.control = pressed,
            Key::Alt => self.alt = pressed,
            Key::Meta => self.meta = pressed,
            _ => {}
        }
    }
}

/// One physical key transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub timestamp: SystemTime,
    pub key: Key,
    pub character: Option<char>,
    pub pressed: bool,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub fn press(key: Key, character: Option<char>, modifiers: Modifiers) -> Self {
        Self {
            timestamp: SystemTime::now(),
            key,
            character,
            pressed: true,
            modifiers,
        }
    }

    pub fn release(key: Key, modifiers: Modifiers) -> Self {
        Self {
            timestamp: SystemTime::now(),
            key,
            character: None,
            pressed: false,
            modifiers,
        }
    }

    /// A press of a printable character with no modifiers held.
    pub fn typed(c: char) -> Self {
        Self::press(Key::Character, Some(c), Modifiers::default())
    }
}

/// Map an rdev key to the logical key identifier
pub fn classify_rdev_key(key: &RdevKey) -> Key {
    match key {
        RdevKey::Backspace => Key::Backspace,
        RdevKey::Return | RdevKey::KpReturn => Key::Enter,
        RdevKey::Tab => Key::Tab,
        RdevKey::Escape => Key::Escape,
        RdevKey::Delete | RdevKey::KpDelete => Key::Delete,
        RdevKey::LeftArrow
        | RdevKey::RightArrow
        | RdevKey::UpArrow
        | RdevKey::DownArrow
        | RdevKey::Home
        | RdevKey::End
        | RdevKey::PageUp
        | RdevKey::PageDown => Key::Navigation,
        RdevKey::F1
        | RdevKey::F2
        | RdevKey::F3
        | RdevKey::F4
        | RdevKey::F5
        | RdevKey::F6
        | RdevKey::F7
        | RdevKey::F8
        | RdevKey::F9
        | RdevKey::F10
        | RdevKey::F11
        | RdevKey::F12
        | RdevKey::Function => Key::Function,
        RdevKey::ShiftLeft | RdevKey::ShiftRight => Key::Shift,
        RdevKey::CapsLock => Key::CapsLock,
        RdevKey::AltGr => Key::AltGraph,
        RdevKey::ControlLeft | RdevKey::ControlRight => Key::Control,
        RdevKey::Alt => Key::Alt,
        RdevKey::MetaLeft | RdevKey::MetaRight => Key::Meta,
        _ => Key::Character,
    }
}

/// Extract the printable character rdev resolved for a key press
pub fn rdev_event_char(event: &rdev::Event) -> Option<char> {
    let name = event.name.as_ref()?;
    let mut chars = name.chars();
    let c = chars.next()?;
    if chars.next().is_some() || c.is_control() {
        return None;
    }
    Some(c)
}

/// Convert an rdev event into a KeyEvent, updating the tracked modifiers.
/// Mouse and wheel events yield `None`.
pub fn key_event_from_rdev(event: &rdev::Event, modifiers: &mut Modifiers) -> Option<KeyEvent> {
    let (rdev_key, pressed) = match event.event_type {
        EventType::KeyPress(key) => (key, true),
        EventType::KeyRelease(key) => (key, false),
        _ => return None,
    };

    let mut key = classify_rdev_key(&rdev_key);
    modifiers.apply(key, pressed);

    let character = if pressed && key == Key::Character {
        rdev_event_char(event)
    } else {
        None
    };
    if key == Key::Character && pressed && character.is_none() {
        key = Key::Other;
    }

    Some(KeyEvent {
        timestamp: event.time,
        key,
        character,
        pressed,
        modifiers: *modifiers,
    })
}

/// Keys the injector taps individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticKey {
    Backspace,
    Return,
    Left,
    Right,
}

/// Destination for synthetic input.
pub trait KeySink {
    fn tap(&mut self, key: SyntheticKey) -> Result<()>;
    fn text(&mut self, text: &str) -> Result<()>;
    /// Send the platform paste shortcut.
    fn paste_chord(&mut self) -> Result<()>;
}

/// Synthetic keyboard backed by enigo.
pub struct EnigoKeyboard {
    enigo: Enigo,
}

impl EnigoKeyboard {
    pub fn new() -> Result<Self> {
        Ok(Self {
            enigo: create_keyboard_controller()?,
        })
    }

    fn click(&mut self, key: EnigoKey) -> Result<()> {
        self.enigo
            .key(key, Direction::Click)
            .map_err(|err| SnipForgeError::Enigo(format!("Failed to send {:?}: {}", key, err)))
    }
}

impl KeySink for EnigoKeyboard {
    fn tap(&mut self, key: SyntheticKey) -> Result<()> {
        let key = match key {
            SyntheticKey::Backspace => EnigoKey::Backspace,
            SyntheticKey::Return => EnigoKey::Return,
            SyntheticKey::Left => EnigoKey::LeftArrow,
            SyntheticKey::Right => EnigoKey::RightArrow,
        };
        self.click(key)
    }

    fn text(&mut self, text: &str) -> Result<()> {
        self.enigo
            .text(text)
            .map_err(|err| SnipForgeError::Enigo(format!("Failed to type text: {}", err)))
    }

    fn paste_chord(&mut self) -> Result<()> {
        #[cfg(target_os = "macos")]
        let modifier = EnigoKey::Meta;
        #[cfg(not(target_os = "macos"))]
        let modifier = EnigoKey::Control;

        self.enigo
            .key(modifier, Direction::Press)
            .map_err(|err| SnipForgeError::Enigo(format!("Failed to press modifier: {}", err)))?;
        let result = self.click(EnigoKey::Unicode('v'));
        self.enigo
            .key(modifier, Direction::Release)
            .map_err(|err| SnipForgeError::Enigo(format!("Failed to release modifier: {}", err)))?;
        result
    }
}

/// Create a keyboard controller
pub fn create_keyboard_controller() -> Result<Enigo> {
    Enigo::new(&Settings::default()).map_err(|err| {
        SnipForgeError::Enigo(format!("Failed to create keyboard controller: {}", err))
    })
}
