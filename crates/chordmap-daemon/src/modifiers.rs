//! Physical modifier tracking
//!
//! The tracker only ever sees events read from the physical device. Modifier
//! transitions synthesized on the output device are never fed back here, so
//! the state always mirrors what the user's fingers are doing.

use std::collections::BTreeSet;

use crate::key::{KeyEvent, KeyPhase, Modifier, ModifierKey};

/// Live set of physically held modifier keys.
#[derive(Debug, Clone, Default)]
pub struct ModifierTracker {
    held: BTreeSet<ModifierKey>,
}

impl ModifierTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the held set from a physical key event.
    ///
    /// - Down: the modifier is added (a duplicate down changes nothing)
    /// - Up: the modifier is removed (a duplicate up changes nothing)
    /// - Repeat: ignored
    ///
    /// Non-modifier keys are ignored.
    pub fn on_event(&mut self, event: &KeyEvent) {
        let Some(modifier) = ModifierKey::from_key(event.key()) else {
            return;
        };

        match event.phase() {
            KeyPhase::Down => {
                if self.held.insert(modifier) {
                    tracing::trace!("Modifier {} held", modifier);
                }
            }
            KeyPhase::Up => {
                if self.held.remove(&modifier) {
                    tracing::trace!("Modifier {} released", modifier);
                }
            }
            KeyPhase::Repeat => {}
        }
    }

    /// Whether this exact physical modifier key is down.
    pub fn is_down(&self, modifier: ModifierKey) -> bool {
        self.held.contains(&modifier)
    }

    /// Whether either side of a modifier family is down.
    pub fn is_held(&self, family: Modifier) -> bool {
        self.held.iter().any(|m| m.family() == family)
    }

    /// Copy of the currently held physical modifier keys.
    pub fn snapshot(&self) -> BTreeSet<ModifierKey> {
        self.held.clone()
    }

    /// Held modifiers normalized to families, as used for chord matching.
    pub fn families(&self) -> BTreeSet<Modifier> {
        self.held.iter().map(|m| m.family()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdev::Key;

    fn feed(tracker: &mut ModifierTracker, key: Key, phase: KeyPhase) {
        tracker.on_event(&KeyEvent::new(key, phase));
    }

    #[test]
    fn test_modifier_tracking_press_and_release() {
        let mut tracker = ModifierTracker::new();
        assert!(tracker.is_empty());

        feed(&mut tracker, Key::KEY_LEFTCTRL, KeyPhase::Down);
        feed(&mut tracker, Key::KEY_RIGHTALT, KeyPhase::Down);
        assert!(tracker.is_down(ModifierKey::LeftCtrl));
        assert!(tracker.is_down(ModifierKey::RightAlt));
        assert!(!tracker.is_down(ModifierKey::LeftAlt));

        feed(&mut tracker, Key::KEY_LEFTCTRL, KeyPhase::Up);
        assert!(!tracker.is_down(ModifierKey::LeftCtrl));
        assert_eq!(
            tracker.snapshot(),
            BTreeSet::from([ModifierKey::RightAlt])
        );
    }

    #[test]
    fn test_modifier_tracking_duplicate_down_and_up() {
        let mut tracker = ModifierTracker::new();

        feed(&mut tracker, Key::KEY_LEFTSHIFT, KeyPhase::Down);
        feed(&mut tracker, Key::KEY_LEFTSHIFT, KeyPhase::Down);
        assert_eq!(tracker.snapshot().len(), 1);

        feed(&mut tracker, Key::KEY_LEFTSHIFT, KeyPhase::Up);
        assert!(tracker.is_empty());

        // A second up must not underflow or disturb other state
        feed(&mut tracker, Key::KEY_LEFTSHIFT, KeyPhase::Up);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_modifier_tracking_repeat_ignored() {
        let mut tracker = ModifierTracker::new();

        feed(&mut tracker, Key::KEY_LEFTMETA, KeyPhase::Repeat);
        assert!(tracker.is_empty(), "repeat without a down must not add a modifier");

        feed(&mut tracker, Key::KEY_LEFTMETA, KeyPhase::Down);
        feed(&mut tracker, Key::KEY_LEFTMETA, KeyPhase::Repeat);
        assert!(tracker.is_down(ModifierKey::LeftMeta));
    }

    #[test]
    fn test_modifier_tracking_non_modifier_keys_ignored() {
        let mut tracker = ModifierTracker::new();

        feed(&mut tracker, Key::KEY_A, KeyPhase::Down);
        feed(&mut tracker, Key::KEY_CAPSLOCK, KeyPhase::Down);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_modifier_families_normalize_sides() {
        let mut tracker = ModifierTracker::new();

        feed(&mut tracker, Key::KEY_RIGHTCTRL, KeyPhase::Down);
        feed(&mut tracker, Key::KEY_LEFTSHIFT, KeyPhase::Down);
        assert!(tracker.is_held(Modifier::Ctrl));
        assert!(tracker.is_held(Modifier::Shift));
        assert!(!tracker.is_held(Modifier::Alt));
        assert_eq!(
            tracker.families(),
            BTreeSet::from([Modifier::Ctrl, Modifier::Shift])
        );

        // Both sides held, one released: the family is still held
        feed(&mut tracker, Key::KEY_LEFTCTRL, KeyPhase::Down);
        feed(&mut tracker, Key::KEY_RIGHTCTRL, KeyPhase::Up);
        assert!(tracker.is_held(Modifier::Ctrl));
    }

    #[test]
    fn test_modifier_state_matches_last_event_per_key() {
        // The held set equals the modifiers whose last observed event was a down
        let sequence = [
            (Key::KEY_LEFTALT, KeyPhase::Down),
            (Key::KEY_RIGHTALT, KeyPhase::Down),
            (Key::KEY_LEFTALT, KeyPhase::Up),
            (Key::KEY_LEFTCTRL, KeyPhase::Down),
            (Key::KEY_LEFTCTRL, KeyPhase::Down),
            (Key::KEY_RIGHTALT, KeyPhase::Up),
            (Key::KEY_RIGHTALT, KeyPhase::Up),
            (Key::KEY_LEFTALT, KeyPhase::Down),
        ];

        let mut tracker = ModifierTracker::new();
        for (key, phase) in sequence {
            feed(&mut tracker, key, phase);
        }

        assert_eq!(
            tracker.snapshot(),
            BTreeSet::from([ModifierKey::LeftAlt, ModifierKey::LeftCtrl])
        );
    }
}
