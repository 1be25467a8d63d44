//! Output spec parsing
//!
//! An output spec is the string handed to `send`:
//!
//! ```text
//! hello{enter}                typed text, then a tap of enter
//! {ctrl down}c{ctrl up}       ctrl+c
//! {{literal}}                 the text "{literal}"
//! ```
//!
//! Parsed requests are emitted in declaration order, with one exception: a
//! `{mod up}` written before its own `{mod down}` swaps places with it, so
//! `{ctrl up}x{ctrl down}` still types ctrl+x and leaves ctrl released.
//! [`emission_order`] applies this.

use evdev::Key;

use crate::error::SpecParseError;
use crate::key::{char_to_key, parse_key, ModifierKey};

/// One primitive instruction for the output device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputRequest {
    /// Press and release
    Tap(Key),
    /// Press and leave down
    Press(Key),
    /// Release a key left down earlier
    Release(Key),
    ModifierDown(ModifierKey),
    ModifierUp(ModifierKey),
    /// Characters typed one by one, shift-wrapped where needed
    Text(String),
}

/// Parse an output spec into requests, in declaration order.
///
/// # Errors
///
/// Returns [`SpecParseError`] for an unterminated or empty `{...}`, a stray
/// `}`, an unknown key name or phase, or a character that has no key on the
/// US layout.
pub fn parse_output_spec(spec: &str) -> Result<Vec<OutputRequest>, SpecParseError> {
    let mut requests = Vec::new();
    let mut text = String::new();
    let mut chars = spec.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                text.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                text.push('}');
            }
            '{' => {
                let mut body = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(inner) => body.push(inner),
                        None => {
                            return Err(SpecParseError::new(spec, "unterminated '{'"));
                        }
                    }
                }

                if !text.is_empty() {
                    requests.push(OutputRequest::Text(std::mem::take(&mut text)));
                }
                requests.push(parse_braced(spec, &body)?);
            }
            '}' => {
                return Err(SpecParseError::new(
                    spec,
                    "unexpected '}', write '}}' for a literal brace",
                ));
            }
            other => {
                if char_to_key(other).is_none() {
                    return Err(SpecParseError::new(
                        spec,
                        format!("no key types the character {:?}", other),
                    ));
                }
                text.push(other);
            }
        }
    }

    if !text.is_empty() {
        requests.push(OutputRequest::Text(text));
    }

    Ok(requests)
}

fn parse_braced(spec: &str, body: &str) -> Result<OutputRequest, SpecParseError> {
    let parts: Vec<&str> = body.split_whitespace().collect();

    let (name, phase) = match parts.as_slice() {
        [name] => (*name, None),
        [name, phase] => (*name, Some(phase.to_lowercase())),
        [] => return Err(SpecParseError::new(spec, "empty braces")),
        _ => {
            return Err(SpecParseError::new(
                spec,
                format!("expected `{{key}}` or `{{key down|up}}`, got `{{{}}}`", body),
            ))
        }
    };

    let key = parse_key(name)
        .ok_or_else(|| SpecParseError::new(spec, format!("unknown key: '{}'", name)))?;
    let modifier = ModifierKey::from_key(key);

    match (phase.as_deref(), modifier) {
        (None, _) => Ok(OutputRequest::Tap(key)),
        (Some("down"), Some(m)) => Ok(OutputRequest::ModifierDown(m)),
        (Some("up"), Some(m)) => Ok(OutputRequest::ModifierUp(m)),
        (Some("down"), None) => Ok(OutputRequest::Press(key)),
        (Some("up"), None) => Ok(OutputRequest::Release(key)),
        (Some(other), _) => Err(SpecParseError::new(
            spec,
            format!("unknown phase '{}', expected down or up", other),
        )),
    }
}

/// Declaration order, except that an up preceding its matching down is
/// swapped with it.
///
/// An up with no pending down and no later down stays where it is; it
/// releases a modifier left down by an earlier call.
pub fn emission_order(requests: &[OutputRequest]) -> Vec<&OutputRequest> {
    let mut ordered: Vec<&OutputRequest> = requests.iter().collect();
    let mut open: Vec<ModifierKey> = Vec::new();

    for i in 0..ordered.len() {
        let request: &OutputRequest = ordered[i];
        match *request {
            OutputRequest::ModifierDown(modifier) => open.push(modifier),
            OutputRequest::ModifierUp(modifier) => {
                if let Some(pos) = open.iter().rposition(|m| *m == modifier) {
                    open.remove(pos);
                    continue;
                }
                let later_down = (i + 1..ordered.len())
                    .find(|&j| *ordered[j] == OutputRequest::ModifierDown(modifier));
                if let Some(j) = later_down {
                    ordered.swap(i, j);
                    open.push(modifier);
                }
            }
            _ => {}
        }
    }

    ordered
}
