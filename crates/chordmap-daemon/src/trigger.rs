//! Binding triggers
//!
//! A trigger is the exact identity a binding is registered under. Lookup is by
//! equality only: there is no "most specific match" search.
//!
//! | text              | trigger                        |
//! |-------------------|--------------------------------|
//! | `pagedown`        | [`Trigger::Key`]               |
//! | `^capslock`       | [`Trigger::Chord`] (ctrl)      |
//! | `ctrl+shift+q`    | [`Trigger::Chord`]             |
//! | `{tab down}`      | [`Trigger::Down`]              |
//! | `{tab up}`        | [`Trigger::Up`]                |
//! | `{tab tap}`       | [`Trigger::Tap`]               |
//! | `{tab hold}`      | [`Trigger::Hold`]              |
//!
//! Prefix symbols follow the AutoHotkey convention: `^` ctrl, `+` shift,
//! `!` alt, `#` meta.

use std::collections::BTreeSet;
use std::fmt;

use evdev::Key;

use crate::error::SpecParseError;
use crate::key::{is_modifier, key_name, parse_key, Modifier};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Plain key press
    Key(Key),
    /// Key pressed while exactly these modifier families are held
    Chord {
        modifiers: BTreeSet<Modifier>,
        key: Key,
    },
    /// Physical press of the key
    Down(Key),
    /// Physical release of the key
    Up(Key),
    /// Press and release with no other key pressed in between
    Tap(Key),
    /// Another key pressed while this key is held; the action receives the
    /// other key
    Hold(Key),
}

impl Trigger {
    /// The physical key this trigger is about.
    pub fn key(&self) -> Key {
        match self {
            Trigger::Key(key)
            | Trigger::Down(key)
            | Trigger::Up(key)
            | Trigger::Tap(key)
            | Trigger::Hold(key) => *key,
            Trigger::Chord { key, .. } => *key,
        }
    }

    /// Whether the key's own events belong to the engine once this trigger is
    /// registered. Chords only claim the key while their modifiers are held.
    pub fn intercepts_key(&self) -> bool {
        !matches!(self, Trigger::Chord { .. })
    }

    /// Whether this trigger makes its key take part in tap/hold resolution.
    pub fn is_resolvable(&self) -> bool {
        matches!(self, Trigger::Tap(_) | Trigger::Hold(_))
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Key(key) => write!(f, "{}", key_name(*key)),
            Trigger::Chord { modifiers, key } => {
                for modifier in modifiers {
                    write!(f, "{}+", modifier)?;
                }
                write!(f, "{}", key_name(*key))
            }
            Trigger::Down(key) => write!(f, "{{{} down}}", key_name(*key)),
            Trigger::Up(key) => write!(f, "{{{} up}}", key_name(*key)),
            Trigger::Tap(key) => write!(f, "{{{} tap}}", key_name(*key)),
            Trigger::Hold(key) => write!(f, "{{{} hold}}", key_name(*key)),
        }
    }
}

impl std::str::FromStr for Trigger {
    type Err = SpecParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_trigger(s)
    }
}

fn lookup_key(input: &str, name: &str) -> Result<Key, SpecParseError> {
    parse_key(name).ok_or_else(|| SpecParseError::new(input, format!("unknown key: '{}'", name)))
}

/// Parse a trigger string.
///
/// # Errors
///
/// Returns [`SpecParseError`] if:
/// - The input is empty
/// - A key name is unrecognized
/// - A pseudo-event phase is not one of `down`, `up`, `tap`, `hold`
/// - A chord has no trigger key, a duplicate modifier, or a modifier key as
///   its trigger key
pub fn parse_trigger(input: &str) -> Result<Trigger, SpecParseError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(SpecParseError::new(input, "empty trigger"));
    }

    if let Some(body) = trimmed.strip_prefix('{') {
        let body = body
            .strip_suffix('}')
            .ok_or_else(|| SpecParseError::new(input, "missing closing '}'"))?;
        return parse_pseudo_event(input, body);
    }

    parse_chord(input, trimmed)
}

fn parse_pseudo_event(input: &str, body: &str) -> Result<Trigger, SpecParseError> {
    let parts: Vec<&str> = body.split_whitespace().collect();

    match parts.as_slice() {
        [name] => Ok(Trigger::Key(lookup_key(input, name)?)),
        [name, phase] => {
            let key = lookup_key(input, name)?;
            match phase.to_lowercase().as_str() {
                "down" => Ok(Trigger::Down(key)),
                "up" => Ok(Trigger::Up(key)),
                "tap" => Ok(Trigger::Tap(key)),
                "hold" => Ok(Trigger::Hold(key)),
                other => Err(SpecParseError::new(
                    input,
                    format!("unknown phase '{}', expected down, up, tap or hold", other),
                )),
            }
        }
        [] => Err(SpecParseError::new(input, "empty braces")),
        _ => Err(SpecParseError::new(
            input,
            "expected `{key}` or `{key phase}`",
        )),
    }
}

fn parse_chord(input: &str, text: &str) -> Result<Trigger, SpecParseError> {
    let mut modifiers = BTreeSet::new();
    let mut rest = text;

    // Prefix symbols, e.g. `^!a`. A lone symbol is left for key parsing.
    while rest.chars().count() > 1 {
        let Some(first) = rest.chars().next() else {
            break;
        };
        let Some(modifier) = Modifier::from_prefix(first) else {
            break;
        };
        if !modifiers.insert(modifier) {
            return Err(SpecParseError::new(
                input,
                format!("duplicate modifier: {}", modifier),
            ));
        }
        rest = &rest[first.len_utf8()..];
    }

    // `ctrl+shift+q` style
    let key_part = match rest.rsplit_once('+') {
        Some((mods, key)) if !key.is_empty() => {
            for part in mods.split('+').map(str::trim) {
                let modifier = Modifier::from_name(part).ok_or_else(|| {
                    SpecParseError::new(input, format!("unknown modifier: '{}'", part))
                })?;
                if !modifiers.insert(modifier) {
                    return Err(SpecParseError::new(
                        input,
                        format!("duplicate modifier: {}", modifier),
                    ));
                }
            }
            key.trim()
        }
        _ => rest,
    };

    let key = lookup_key(input, key_part)?;

    if modifiers.is_empty() {
        return Ok(Trigger::Key(key));
    }

    if is_modifier(key) {
        return Err(SpecParseError::new(
            input,
            "a modifier key cannot be the trigger key of a chord",
        ));
    }

    Ok(Trigger::Chord { modifiers, key })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_key() {
        assert_eq!(parse_trigger("pagedown"), Ok(Trigger::Key(Key::KEY_PAGEDOWN)));
        assert_eq!(parse_trigger("{esc}"), Ok(Trigger::Key(Key::KEY_ESC)));
        assert_eq!(parse_trigger("  a "), Ok(Trigger::Key(Key::KEY_A)));
    }

    #[test]
    fn test_parse_pseudo_events() {
        assert_eq!(parse_trigger("{tab down}"), Ok(Trigger::Down(Key::KEY_TAB)));
        assert_eq!(parse_trigger("{tab up}"), Ok(Trigger::Up(Key::KEY_TAB)));
        assert_eq!(parse_trigger("{capslock tap}"), Ok(Trigger::Tap(Key::KEY_CAPSLOCK)));
        assert_eq!(parse_trigger("{tab hold}"), Ok(Trigger::Hold(Key::KEY_TAB)));
        assert_eq!(parse_trigger("{LeftAlt DOWN}"), Ok(Trigger::Down(Key::KEY_LEFTALT)));
    }

    #[test]
    fn test_parse_prefix_chord() {
        assert_eq!(
            parse_trigger("^capslock"),
            Ok(Trigger::Chord {
                modifiers: BTreeSet::from([Modifier::Ctrl]),
                key: Key::KEY_CAPSLOCK,
            })
        );
        assert_eq!(
            parse_trigger("^!a"),
            Ok(Trigger::Chord {
                modifiers: BTreeSet::from([Modifier::Ctrl, Modifier::Alt]),
                key: Key::KEY_A,
            })
        );
    }

    #[test]
    fn test_parse_named_chord_order_independent() {
        let a = parse_trigger("Ctrl+Shift+Q").unwrap();
        let b = parse_trigger("shift+ctrl+q").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "ctrl+shift+q");
    }

    #[test]
    fn test_parse_mixed_prefix_and_named_chord() {
        assert_eq!(
            parse_trigger("#alt+tab"),
            Ok(Trigger::Chord {
                modifiers: BTreeSet::from([Modifier::Alt, Modifier::Super]),
                key: Key::KEY_TAB,
            })
        );
    }

    #[test]
    fn test_parse_lone_prefix_symbol_is_a_key_attempt() {
        // `-` is a key, `^` alone is not
        assert_eq!(parse_trigger("-"), Ok(Trigger::Key(Key::KEY_MINUS)));
        assert!(parse_trigger("^").is_err());
    }

    #[test]
    fn test_parse_trigger_errors() {
        assert!(parse_trigger("").is_err());
        assert!(parse_trigger("{tab").is_err());
        assert!(parse_trigger("{}").is_err());
        assert!(parse_trigger("{tab sideways}").is_err());
        assert!(parse_trigger("{tab down now}").is_err());
        assert!(parse_trigger("notakey").is_err());
        assert!(parse_trigger("ctrl+").is_err());
        assert!(parse_trigger("hyper+a").is_err());
        assert!(parse_trigger("^^a").is_err(), "duplicate prefix");
        assert!(parse_trigger("ctrl+ctrl+a").is_err(), "duplicate named modifier");
        assert!(parse_trigger("ctrl+alt").is_err(), "modifier as chord key");
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(Trigger::Down(Key::KEY_TAB).to_string(), "{tab down}");
        assert_eq!(Trigger::Key(Key::KEY_PAGEDOWN).to_string(), "pagedown");
        assert_eq!(parse_trigger("^capslock").unwrap().to_string(), "ctrl+capslock");
    }

    #[test]
    fn test_trigger_classification() {
        assert!(Trigger::Tap(Key::KEY_TAB).is_resolvable());
        assert!(Trigger::Hold(Key::KEY_TAB).is_resolvable());
        assert!(!Trigger::Down(Key::KEY_TAB).is_resolvable());
        assert!(!Trigger::Key(Key::KEY_TAB).is_resolvable());
        assert!(Trigger::Key(Key::KEY_TAB).intercepts_key());
        assert!(!parse_trigger("^tab").unwrap().intercepts_key());
    }
}
