//! Symbolic output to the synthetic device

use std::io;

use evdev::Key;

use crate::error::{SpecParseError, WriteError};
use crate::key::{char_to_key, KeyEvent, KeyPhase};
use crate::sequence::{emission_order, parse_output_spec, OutputRequest};

/// Destination for synthesized key transitions.
pub trait OutputSink: Send {
    /// Emit one key transition, synchronized immediately.
    fn emit(&mut self, key: Key, phase: KeyPhase) -> io::Result<()>;
}

/// Turns output requests into key transitions on an [`OutputSink`].
///
/// Keys left down on the output (synthesized modifiers, `{x down}` presses and
/// passed-through downs) are remembered so [`EventWriter::release_all`] can
/// lift them on shutdown.
pub struct EventWriter {
    sink: Box<dyn OutputSink>,
    held: Vec<Key>,
}

impl EventWriter {
    pub fn new(sink: impl OutputSink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            held: Vec::new(),
        }
    }

    /// Parse and emit an output spec.
    pub fn send(&mut self, spec: &str) -> Result<(), WriteError> {
        let requests = parse_output_spec(spec)?;
        self.send_requests(&requests)
    }

    /// Emit already parsed requests in [`emission_order`].
    pub fn send_requests(&mut self, requests: &[OutputRequest]) -> Result<(), WriteError> {
        for request in emission_order(requests) {
            match request {
                OutputRequest::Tap(key) => self.tap(*key)?,
                OutputRequest::Press(key) => self.press(*key)?,
                OutputRequest::Release(key) => self.release(*key)?,
                OutputRequest::ModifierDown(modifier) => self.press(modifier.to_key())?,
                OutputRequest::ModifierUp(modifier) => self.release(modifier.to_key())?,
                OutputRequest::Text(text) => self.type_text(text)?,
            }
        }
        Ok(())
    }

    /// Emit exactly one modifier transition, e.g. `{leftalt down}`.
    pub fn send_modifier(&mut self, spec: &str) -> Result<(), WriteError> {
        let requests = parse_output_spec(spec)?;

        match requests.as_slice() {
            [OutputRequest::ModifierDown(modifier)] => self.press(modifier.to_key())?,
            [OutputRequest::ModifierUp(modifier)] => self.release(modifier.to_key())?,
            _ => {
                return Err(SpecParseError::new(
                    spec,
                    "expected a single `{modifier down}` or `{modifier up}`",
                )
                .into())
            }
        }
        Ok(())
    }

    /// Forward a physical event unchanged.
    pub fn passthrough(&mut self, event: &KeyEvent) -> Result<(), WriteError> {
        match event.phase() {
            KeyPhase::Down => self.press(event.key())?,
            KeyPhase::Up => self.release(event.key())?,
            KeyPhase::Repeat => self.sink.emit(event.key(), KeyPhase::Repeat)?,
        }
        Ok(())
    }

    /// Release every key still down on the output, newest first.
    ///
    /// Every key is attempted; the first failure is returned.
    pub fn release_all(&mut self) -> io::Result<()> {
        let mut first_error = None;

        while let Some(key) = self.held.pop() {
            tracing::debug!("Releasing held output key {:?}", key);
            if let Err(e) = self.sink.emit(key, KeyPhase::Up) {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Keys currently down on the output, in press order.
    pub fn held(&self) -> &[Key] {
        &self.held
    }

    fn press(&mut self, key: Key) -> io::Result<()> {
        self.sink.emit(key, KeyPhase::Down)?;
        if !self.held.contains(&key) {
            self.held.push(key);
        }
        Ok(())
    }

    fn release(&mut self, key: Key) -> io::Result<()> {
        self.sink.emit(key, KeyPhase::Up)?;
        self.held.retain(|k| *k != key);
        Ok(())
    }

    fn tap(&mut self, key: Key) -> io::Result<()> {
        self.press(key)?;
        self.release(key)
    }

    fn shift_held(&self) -> bool {
        self.held
            .iter()
            .any(|k| *k == Key::KEY_LEFTSHIFT || *k == Key::KEY_RIGHTSHIFT)
    }

    fn type_text(&mut self, text: &str) -> Result<(), WriteError> {
        for c in text.chars() {
            let (key, shifted) = char_to_key(c)
                .ok_or_else(|| SpecParseError::new(text, format!("no key types the character {:?}", c)))?;

            if shifted && !self.shift_held() {
                self.press(Key::KEY_LEFTSHIFT)?;
                self.tap(key)?;
                self.release(Key::KEY_LEFTSHIFT)?;
            } else {
                self.tap(key)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for EventWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventWriter")
            .field("held", &self.held)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn writer() -> (EventWriter, RecordingSink) {
        let sink = RecordingSink::new();
        (EventWriter::new(sink.clone()), sink)
    }

    #[test]
    fn test_send_ctrl_wrapped_key_either_order() {
        for spec in ["{ctrl down}x{ctrl up}", "{ctrl up}x{ctrl down}"] {
            let (mut writer, sink) = writer();
            writer.send(spec).unwrap();
            assert_eq!(
                sink.events(),
                vec![
                    down(Key::KEY_LEFTCTRL),
                    down(Key::KEY_X),
                    up(Key::KEY_X),
                    up(Key::KEY_LEFTCTRL),
                ],
                "spec {}",
                spec
            );
            assert!(writer.held().is_empty());
        }
    }

    #[test]
    fn test_send_modifier_released_before_following_key() {
        let (mut writer, sink) = writer();
        writer.send("{shift down}a{shift up}b").unwrap();

        let mut expected = vec![down(Key::KEY_LEFTSHIFT)];
        expected.extend(tap(Key::KEY_A));
        expected.push(up(Key::KEY_LEFTSHIFT));
        expected.extend(tap(Key::KEY_B));
        assert_eq!(sink.events(), expected);
        assert!(writer.held().is_empty());
    }

    #[test]
    fn test_send_text_shift_wraps_uppercase() {
        let (mut writer, sink) = writer();
        writer.send("aB").unwrap();

        let mut expected = tap(Key::KEY_A).to_vec();
        expected.push(down(Key::KEY_LEFTSHIFT));
        expected.extend(tap(Key::KEY_B));
        expected.push(up(Key::KEY_LEFTSHIFT));
        assert_eq!(sink.events(), expected);
    }

    #[test]
    fn test_send_text_uses_existing_shift() {
        let (mut writer, sink) = writer();
        writer.send("{shift down}?{shift up}").unwrap();

        let mut expected = vec![down(Key::KEY_LEFTSHIFT)];
        expected.extend(tap(Key::KEY_SLASH));
        expected.push(up(Key::KEY_LEFTSHIFT));
        assert_eq!(sink.events(), expected);
    }

    #[test]
    fn test_send_parse_error_emits_nothing() {
        let (mut writer, sink) = writer();
        let err = writer.send("abc{bogus}").unwrap_err();
        assert!(matches!(err, WriteError::Parse(_)));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_send_modifier_one_transition() {
        let (mut writer, sink) = writer();

        writer.send_modifier("{rightalt down}").unwrap();
        assert_eq!(sink.events(), vec![down(Key::KEY_RIGHTALT)]);
        assert_eq!(writer.held(), &[Key::KEY_RIGHTALT]);

        writer.send_modifier("{rightalt up}").unwrap();
        assert_eq!(
            sink.events(),
            vec![down(Key::KEY_RIGHTALT), up(Key::KEY_RIGHTALT)]
        );
        assert!(writer.held().is_empty());
    }

    #[test]
    fn test_send_modifier_rejects_other_specs() {
        let (mut writer, sink) = writer();

        for spec in ["{a down}", "{ctrl}", "{ctrl down}{alt down}", "x", ""] {
            let err = writer.send_modifier(spec).unwrap_err();
            assert!(matches!(err, WriteError::Parse(_)), "spec {:?}", spec);
        }
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_release_all_lifts_held_keys() {
        let (mut writer, sink) = writer();
        writer.send("{ctrl down}{a down}").unwrap();
        writer
            .passthrough(&KeyEvent::new(Key::KEY_B, KeyPhase::Down))
            .unwrap();
        sink.clear();

        writer.release_all().unwrap();
        assert_eq!(
            sink.events(),
            vec![up(Key::KEY_B), up(Key::KEY_A), up(Key::KEY_LEFTCTRL)]
        );
        assert!(writer.held().is_empty());
    }

    #[test]
    fn test_passthrough_forwards_repeat() {
        let (mut writer, sink) = writer();
        writer
            .passthrough(&KeyEvent::new(Key::KEY_J, KeyPhase::Repeat))
            .unwrap();
        assert_eq!(sink.events(), vec![(Key::KEY_J, KeyPhase::Repeat)]);
        assert!(writer.held().is_empty());
    }

    #[test]
    fn test_output_error_reported() {
        let (mut writer, sink) = writer();
        sink.fail_from_now();
        assert!(matches!(writer.send("a"), Err(WriteError::Output(_))));
    }
}
