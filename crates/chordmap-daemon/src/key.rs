//! Key vocabulary shared by every stage of the engine
//!
//! Physical events arrive as [`KeyEvent`]s, modifier keys are described both by
//! their physical identity ([`ModifierKey`], left/right distinct) and by their
//! normalized family ([`Modifier`]) used for chord matching.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use evdev::Key;

/// Phase of a key transition, matching the evdev `EV_KEY` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyPhase {
    /// Key released (value 0)
    Up,
    /// Key pressed (value 1)
    Down,
    /// Autorepeat while held (value 2)
    Repeat,
}

impl KeyPhase {
    /// Map an evdev key event value to a phase.
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(KeyPhase::Up),
            1 => Some(KeyPhase::Down),
            2 => Some(KeyPhase::Repeat),
            _ => None,
        }
    }

    /// The evdev event value for this phase.
    pub fn value(self) -> i32 {
        match self {
            KeyPhase::Up => 0,
            KeyPhase::Down => 1,
            KeyPhase::Repeat => 2,
        }
    }
}

impl fmt::Display for KeyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPhase::Up => write!(f, "up"),
            KeyPhase::Down => write!(f, "down"),
            KeyPhase::Repeat => write!(f, "repeat"),
        }
    }
}

/// A canonical key event read from a physical device.
///
/// Fields are private so an event cannot change after it was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    key: Key,
    phase: KeyPhase,
    timestamp: Instant,
}

impl KeyEvent {
    /// Create an event stamped with the current monotonic time.
    pub fn new(key: Key, phase: KeyPhase) -> Self {
        Self::at(key, phase, Instant::now())
    }

    /// Create an event with an explicit timestamp.
    pub fn at(key: Key, phase: KeyPhase, timestamp: Instant) -> Self {
        Self {
            key,
            phase,
            timestamp,
        }
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn phase(&self) -> KeyPhase {
        self.phase
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", key_name(self.key), self.phase)
    }
}

/// Normalized modifier family.
///
/// Left and right variants are combined so that a chord declared as `ctrl+q`
/// matches either physical Ctrl key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    Ctrl,
    Shift,
    Alt,
    Super,
}

impl Modifier {
    /// Parse a modifier family name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "CTRL" | "CONTROL" => Some(Modifier::Ctrl),
            "SHIFT" => Some(Modifier::Shift),
            "ALT" => Some(Modifier::Alt),
            "SUPER" | "META" | "WIN" => Some(Modifier::Super),
            _ => None,
        }
    }

    /// Map an AutoHotkey-style prefix symbol (`^`, `+`, `!`, `#`).
    pub fn from_prefix(symbol: char) -> Option<Self> {
        match symbol {
            '^' => Some(Modifier::Ctrl),
            '+' => Some(Modifier::Shift),
            '!' => Some(Modifier::Alt),
            '#' => Some(Modifier::Super),
            _ => None,
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modifier::Ctrl => write!(f, "ctrl"),
            Modifier::Shift => write!(f, "shift"),
            Modifier::Alt => write!(f, "alt"),
            Modifier::Super => write!(f, "meta"),
        }
    }
}

/// A physical modifier key, left and right kept apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModifierKey {
    LeftCtrl,
    RightCtrl,
    LeftShift,
    RightShift,
    LeftAlt,
    RightAlt,
    LeftMeta,
    RightMeta,
}

impl ModifierKey {
    pub const ALL: [ModifierKey; 8] = [
        ModifierKey::LeftCtrl,
        ModifierKey::RightCtrl,
        ModifierKey::LeftShift,
        ModifierKey::RightShift,
        ModifierKey::LeftAlt,
        ModifierKey::RightAlt,
        ModifierKey::LeftMeta,
        ModifierKey::RightMeta,
    ];

    /// Returns the modifier identity of an evdev key, if it is one.
    pub fn from_key(key: Key) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.to_key() == key)
    }

    /// Parse a modifier key name; bare family names pick the left key.
    pub fn from_name(name: &str) -> Option<Self> {
        parse_key(name).and_then(Self::from_key)
    }

    pub fn to_key(self) -> Key {
        match self {
            ModifierKey::LeftCtrl => Key::KEY_LEFTCTRL,
            ModifierKey::RightCtrl => Key::KEY_RIGHTCTRL,
            ModifierKey::LeftShift => Key::KEY_LEFTSHIFT,
            ModifierKey::RightShift => Key::KEY_RIGHTSHIFT,
            ModifierKey::LeftAlt => Key::KEY_LEFTALT,
            ModifierKey::RightAlt => Key::KEY_RIGHTALT,
            ModifierKey::LeftMeta => Key::KEY_LEFTMETA,
            ModifierKey::RightMeta => Key::KEY_RIGHTMETA,
        }
    }

    pub fn family(self) -> Modifier {
        match self {
            ModifierKey::LeftCtrl | ModifierKey::RightCtrl => Modifier::Ctrl,
            ModifierKey::LeftShift | ModifierKey::RightShift => Modifier::Shift,
            ModifierKey::LeftAlt | ModifierKey::RightAlt => Modifier::Alt,
            ModifierKey::LeftMeta | ModifierKey::RightMeta => Modifier::Super,
        }
    }
}

impl fmt::Display for ModifierKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", key_name(self.to_key()))
    }
}

/// Check whether a key is one of the eight tracked modifier keys.
pub fn is_modifier(key: Key) -> bool {
    ModifierKey::from_key(key).is_some()
}

/// Names that evdev's own `KEY_*` spelling does not cover.
const KEY_ALIASES: &[(&str, Key)] = &[
    ("ESCAPE", Key::KEY_ESC),
    ("RETURN", Key::KEY_ENTER),
    ("CAPS", Key::KEY_CAPSLOCK),
    ("CAPS_LOCK", Key::KEY_CAPSLOCK),
    ("BS", Key::KEY_BACKSPACE),
    ("CTRL", Key::KEY_LEFTCTRL),
    ("CONTROL", Key::KEY_LEFTCTRL),
    ("LCTRL", Key::KEY_LEFTCTRL),
    ("RCTRL", Key::KEY_RIGHTCTRL),
    ("SHIFT", Key::KEY_LEFTSHIFT),
    ("LSHIFT", Key::KEY_LEFTSHIFT),
    ("RSHIFT", Key::KEY_RIGHTSHIFT),
    ("ALT", Key::KEY_LEFTALT),
    ("LALT", Key::KEY_LEFTALT),
    ("RALT", Key::KEY_RIGHTALT),
    ("ALTGR", Key::KEY_RIGHTALT),
    ("META", Key::KEY_LEFTMETA),
    ("SUPER", Key::KEY_LEFTMETA),
    ("WIN", Key::KEY_LEFTMETA),
    ("LMETA", Key::KEY_LEFTMETA),
    ("RMETA", Key::KEY_RIGHTMETA),
    ("PGUP", Key::KEY_PAGEUP),
    ("PGDN", Key::KEY_PAGEDOWN),
    ("PGDOWN", Key::KEY_PAGEDOWN),
    ("INS", Key::KEY_INSERT),
    ("DEL", Key::KEY_DELETE),
    ("EQUALS", Key::KEY_EQUAL),
    ("LBRACE", Key::KEY_LEFTBRACE),
    ("RBRACE", Key::KEY_RIGHTBRACE),
    ("PERIOD", Key::KEY_DOT),
    ("UPARROW", Key::KEY_UP),
    ("DOWNARROW", Key::KEY_DOWN),
    ("LEFTARROW", Key::KEY_LEFT),
    ("RIGHTARROW", Key::KEY_RIGHT),
    ("PRINTSCREEN", Key::KEY_SYSRQ),
    ("PRINT", Key::KEY_SYSRQ),
    ("MENU", Key::KEY_COMPOSE),
    ("NUM_LOCK", Key::KEY_NUMLOCK),
];

/// Parse a key name to an evdev key.
///
/// Accepts the aliases above, any kernel name with or without the `KEY_`
/// prefix (`capslock`, `KEY_CAPSLOCK`, `f13`), and single characters that
/// need no shift (`a`, `1`, `-`). Matching is case-insensitive, so `A` is the
/// `a` key.
pub fn parse_key(name: &str) -> Option<Key> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return match char_to_key(c.to_ascii_lowercase()) {
            Some((key, false)) => Some(key),
            _ => None,
        };
    }

    let upper = name.to_uppercase();
    if let Some((_, key)) = KEY_ALIASES.iter().find(|(alias, _)| *alias == upper) {
        return Some(*key);
    }

    let kernel_name = if upper.starts_with("KEY_") {
        upper
    } else {
        format!("KEY_{}", upper)
    };
    Key::from_str(&kernel_name).ok()
}

/// Lowercase display name, e.g. `capslock` for `KEY_CAPSLOCK`.
pub fn key_name(key: Key) -> String {
    let debug = format!("{:?}", key);
    debug
        .strip_prefix("KEY_")
        .unwrap_or(&debug)
        .to_lowercase()
}

/// Key and shift state that type a character on a US layout.
pub fn char_to_key(c: char) -> Option<(Key, bool)> {
    if c.is_ascii_lowercase() || c.is_ascii_digit() {
        let name = format!("KEY_{}", c.to_ascii_uppercase());
        return Key::from_str(&name).ok().map(|k| (k, false));
    }
    if c.is_ascii_uppercase() {
        let name = format!("KEY_{}", c);
        return Key::from_str(&name).ok().map(|k| (k, true));
    }

    let entry = match c {
        ' ' => (Key::KEY_SPACE, false),
        '\n' => (Key::KEY_ENTER, false),
        '\t' => (Key::KEY_TAB, false),
        '-' => (Key::KEY_MINUS, false),
        '_' => (Key::KEY_MINUS, true),
        '=' => (Key::KEY_EQUAL, false),
        '+' => (Key::KEY_EQUAL, true),
        '[' => (Key::KEY_LEFTBRACE, false),
        '{' => (Key::KEY_LEFTBRACE, true),
        ']' => (Key::KEY_RIGHTBRACE, false),
        '}' => (Key::KEY_RIGHTBRACE, true),
        ';' => (Key::KEY_SEMICOLON, false),
        ':' => (Key::KEY_SEMICOLON, true),
        '\'' => (Key::KEY_APOSTROPHE, false),
        '"' => (Key::KEY_APOSTROPHE, true),
        '`' => (Key::KEY_GRAVE, false),
        '~' => (Key::KEY_GRAVE, true),
        '\\' => (Key::KEY_BACKSLASH, false),
        '|' => (Key::KEY_BACKSLASH, true),
        ',' => (Key::KEY_COMMA, false),
        '<' => (Key::KEY_COMMA, true),
        '.' => (Key::KEY_DOT, false),
        '>' => (Key::KEY_DOT, true),
        '/' => (Key::KEY_SLASH, false),
        '?' => (Key::KEY_SLASH, true),
        '!' => (Key::KEY_1, true),
        '@' => (Key::KEY_2, true),
        '#' => (Key::KEY_3, true),
        '$' => (Key::KEY_4, true),
        '%' => (Key::KEY_5, true),
        '^' => (Key::KEY_6, true),
        '&' => (Key::KEY_7, true),
        '*' => (Key::KEY_8, true),
        '(' => (Key::KEY_9, true),
        ')' => (Key::KEY_0, true),
        _ => return None,
    };
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_kernel_names() {
        assert_eq!(parse_key("capslock"), Some(Key::KEY_CAPSLOCK));
        assert_eq!(parse_key("PageDown"), Some(Key::KEY_PAGEDOWN));
        assert_eq!(parse_key("tab"), Some(Key::KEY_TAB));
        assert_eq!(parse_key("esc"), Some(Key::KEY_ESC));
        assert_eq!(parse_key("leftalt"), Some(Key::KEY_LEFTALT));
        assert_eq!(parse_key("rightalt"), Some(Key::KEY_RIGHTALT));
        assert_eq!(parse_key("F13"), Some(Key::KEY_F13));
    }

    #[test]
    fn test_parse_key_aliases() {
        assert_eq!(parse_key("Escape"), Some(Key::KEY_ESC));
        assert_eq!(parse_key("ctrl"), Some(Key::KEY_LEFTCTRL));
        assert_eq!(parse_key("meta"), Some(Key::KEY_LEFTMETA));
        assert_eq!(parse_key("PgDn"), Some(Key::KEY_PAGEDOWN));
        assert_eq!(parse_key("Return"), Some(Key::KEY_ENTER));
    }

    #[test]
    fn test_parse_key_single_characters() {
        assert_eq!(parse_key("a"), Some(Key::KEY_A));
        assert_eq!(parse_key("A"), Some(Key::KEY_A));
        assert_eq!(parse_key("?"), None, "shifted characters are not key names");
        assert_eq!(parse_key("5"), Some(Key::KEY_5));
        assert_eq!(parse_key("-"), Some(Key::KEY_MINUS));
        assert_eq!(parse_key("/"), Some(Key::KEY_SLASH));
    }

    #[test]
    fn test_parse_key_raw_evdev_format() {
        assert_eq!(parse_key("KEY_LEFTMETA"), Some(Key::KEY_LEFTMETA));
        assert_eq!(parse_key("key_a"), Some(Key::KEY_A));
    }

    #[test]
    fn test_parse_key_unknown() {
        assert_eq!(parse_key(""), None);
        assert_eq!(parse_key("UnknownKey"), None);
        assert_eq!(parse_key("é"), None);
    }

    #[test]
    fn test_key_name_roundtrips_through_parse() {
        for key in [Key::KEY_CAPSLOCK, Key::KEY_TAB, Key::KEY_PAGEDOWN, Key::KEY_RIGHTALT] {
            assert_eq!(parse_key(&key_name(key)), Some(key));
        }
    }

    #[test]
    fn test_modifier_key_identity() {
        assert_eq!(ModifierKey::from_key(Key::KEY_RIGHTALT), Some(ModifierKey::RightAlt));
        assert_eq!(ModifierKey::from_key(Key::KEY_A), None);
        assert_eq!(ModifierKey::from_name("ctrl"), Some(ModifierKey::LeftCtrl));
        assert_eq!(ModifierKey::from_name("rightmeta"), Some(ModifierKey::RightMeta));
        assert_eq!(ModifierKey::from_name("tab"), None);
        assert_eq!(ModifierKey::RightShift.family(), Modifier::Shift);
        assert!(is_modifier(Key::KEY_LEFTMETA));
        assert!(!is_modifier(Key::KEY_CAPSLOCK));
    }

    #[test]
    fn test_modifier_prefixes() {
        assert_eq!(Modifier::from_prefix('^'), Some(Modifier::Ctrl));
        assert_eq!(Modifier::from_prefix('!'), Some(Modifier::Alt));
        assert_eq!(Modifier::from_prefix('+'), Some(Modifier::Shift));
        assert_eq!(Modifier::from_prefix('#'), Some(Modifier::Super));
        assert_eq!(Modifier::from_prefix('a'), None);
    }

    #[test]
    fn test_char_to_key() {
        assert_eq!(char_to_key('a'), Some((Key::KEY_A, false)));
        assert_eq!(char_to_key('A'), Some((Key::KEY_A, true)));
        assert_eq!(char_to_key('?'), Some((Key::KEY_SLASH, true)));
        assert_eq!(char_to_key(' '), Some((Key::KEY_SPACE, false)));
        assert_eq!(char_to_key('€'), None);
    }

    #[test]
    fn test_key_phase_values() {
        for phase in [KeyPhase::Up, KeyPhase::Down, KeyPhase::Repeat] {
            assert_eq!(KeyPhase::from_value(phase.value()), Some(phase));
        }
        assert_eq!(KeyPhase::from_value(7), None);
    }
}
