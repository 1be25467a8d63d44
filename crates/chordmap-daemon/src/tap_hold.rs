//! Tap/hold resolution
//!
//! # State Machine
//!
//! ```text
//!  ┌───────┐   own down    ┌──────────────┐  other key down  ┌─────────────┐
//!  │ IDLE  │ ────────────► │ HELD_PENDING │ ───────────────► │ HELD_ACTIVE │
//!  └───────┘               └──────┬───────┘                  └──────┬──────┘
//!      ▲                          │ own up                          │ own up
//!      │                          ▼                                 ▼
//!      │                     Tap (or Consumed)                    Hold
//!      └──────────────────────────┴─────────────────────────────────┘
//! ```
//!
//! The only default signal is whether another key was pressed while the key
//! was down. Autorepeat never counts, for the held key or any other key. A
//! per-key timeout can be opted into with [`TapHoldConfig::timeout`]; it is
//! checked against the release timestamp, no timer runs.
//!
//! The resolver only tracks state. Which actions run for each outcome is
//! decided by the engine.

use std::time::{Duration, Instant};

use evdev::Key;

/// Per-key tap/hold options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TapHoldConfig {
    /// Releases at or after this long count as a hold even without an
    /// intervening key.
    pub timeout: Option<Duration>,
}

/// Observable state of a resolvable key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapHoldState {
    Idle,
    HeldPending,
    HeldActive,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Pressed and released alone
    Tap,
    /// Another key was pressed meanwhile, or the timeout elapsed
    Hold,
    /// Would have been a tap, but an action consumed the key
    Consumed,
}

#[derive(Debug, Clone)]
struct TapHoldSession {
    key: Key,
    start_time: Instant,
    interrupted: bool,
    consumed: bool,
    config: TapHoldConfig,
}

/// Sessions for every resolvable key currently held, in press order.
#[derive(Debug, Default)]
pub struct TapHoldResolver {
    sessions: Vec<TapHoldSession>,
}

impl TapHoldResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for a physical press of a resolvable key.
    ///
    /// A second down for a key that already has a session keeps the existing
    /// session and start time.
    pub fn press(&mut self, key: Key, at: Instant, config: TapHoldConfig) {
        if self.session(key).is_some() {
            tracing::trace!("Duplicate down for {:?}, keeping session", key);
            return;
        }

        self.sessions.push(TapHoldSession {
            key,
            start_time: at,
            interrupted: false,
            consumed: false,
            config,
        });
    }

    /// Record that `key` was pressed while other resolvable keys are down.
    ///
    /// Every other open session becomes held-active. Returns the holders most
    /// recently pressed first, so the caller can offer the key to the newest
    /// holder that has a chord action.
    pub fn interrupt(&mut self, key: Key) -> Vec<Key> {
        let mut holders = Vec::new();

        for session in self.sessions.iter_mut().rev() {
            if session.key == key {
                continue;
            }
            if !session.interrupted {
                tracing::debug!("{:?} interrupted by {:?}, resolving as hold", session.key, key);
            }
            session.interrupted = true;
            holders.push(session.key);
        }

        holders
    }

    /// Close the session for a physical release and report how it resolved.
    ///
    /// Returns `None` if the key had no open session.
    pub fn release(&mut self, key: Key, at: Instant) -> Option<Resolution> {
        let index = self.sessions.iter().position(|s| s.key == key)?;
        let session = self.sessions.remove(index);

        let timed_out = session
            .config
            .timeout
            .map(|timeout| at.saturating_duration_since(session.start_time) >= timeout)
            .unwrap_or(false);

        let resolution = if session.interrupted || timed_out {
            Resolution::Hold
        } else if session.consumed {
            Resolution::Consumed
        } else {
            Resolution::Tap
        };

        tracing::trace!("{:?} resolved as {:?}", key, resolution);
        Some(resolution)
    }

    /// Suppress the tap outcome of an open session.
    ///
    /// Returns `false` if the key has no open session.
    pub fn consume(&mut self, key: Key) -> bool {
        match self.sessions.iter_mut().find(|s| s.key == key) {
            Some(session) => {
                session.consumed = true;
                true
            }
            None => false,
        }
    }

    pub fn state(&self, key: Key) -> TapHoldState {
        match self.session(key) {
            None => TapHoldState::Idle,
            Some(session) if session.interrupted => TapHoldState::HeldActive,
            Some(_) => TapHoldState::HeldPending,
        }
    }

    /// Whether any resolvable key is currently held.
    pub fn is_holding(&self) -> bool {
        !self.sessions.is_empty()
    }

    fn session(&self, key: Key) -> Option<&TapHoldSession> {
        self.sessions.iter().find(|s| s.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver_with(key: Key, at: Instant) -> TapHoldResolver {
        let mut resolver = TapHoldResolver::new();
        resolver.press(key, at, TapHoldConfig::default());
        resolver
    }

    #[test]
    fn test_press_release_alone_is_tap() {
        let start = Instant::now();
        let mut resolver = resolver_with(Key::KEY_TAB, start);
        assert_eq!(resolver.state(Key::KEY_TAB), TapHoldState::HeldPending);

        let resolution = resolver.release(Key::KEY_TAB, start + Duration::from_secs(5));
        assert_eq!(resolution, Some(Resolution::Tap), "no timeout configured, any duration is a tap");
        assert_eq!(resolver.state(Key::KEY_TAB), TapHoldState::Idle);
    }

    #[test]
    fn test_intervening_key_makes_hold() {
        let start = Instant::now();
        let mut resolver = resolver_with(Key::KEY_TAB, start);

        let holders = resolver.interrupt(Key::KEY_A);
        assert_eq!(holders, vec![Key::KEY_TAB]);
        assert_eq!(resolver.state(Key::KEY_TAB), TapHoldState::HeldActive);

        assert_eq!(resolver.release(Key::KEY_TAB, start), Some(Resolution::Hold));
    }

    #[test]
    fn test_own_key_does_not_interrupt() {
        let start = Instant::now();
        let mut resolver = resolver_with(Key::KEY_TAB, start);

        assert!(resolver.interrupt(Key::KEY_TAB).is_empty());
        resolver.press(Key::KEY_TAB, start, TapHoldConfig::default());
        assert_eq!(resolver.state(Key::KEY_TAB), TapHoldState::HeldPending);
        assert_eq!(resolver.release(Key::KEY_TAB, start), Some(Resolution::Tap));
    }

    #[test]
    fn test_consumed_session_does_not_tap() {
        let start = Instant::now();
        let mut resolver = resolver_with(Key::KEY_CAPSLOCK, start);

        assert!(resolver.consume(Key::KEY_CAPSLOCK));
        assert_eq!(
            resolver.release(Key::KEY_CAPSLOCK, start),
            Some(Resolution::Consumed)
        );
        assert!(!resolver.consume(Key::KEY_CAPSLOCK), "no session left to consume");
    }

    #[test]
    fn test_release_without_session() {
        let mut resolver = TapHoldResolver::new();
        assert_eq!(resolver.release(Key::KEY_TAB, Instant::now()), None);
    }

    #[test]
    fn test_timeout_turns_long_press_into_hold() {
        let start = Instant::now();
        let config = TapHoldConfig {
            timeout: Some(Duration::from_millis(200)),
        };

        let mut resolver = TapHoldResolver::new();
        resolver.press(Key::KEY_CAPSLOCK, start, config);
        assert_eq!(
            resolver.release(Key::KEY_CAPSLOCK, start + Duration::from_millis(199)),
            Some(Resolution::Tap)
        );

        resolver.press(Key::KEY_CAPSLOCK, start, config);
        assert_eq!(
            resolver.release(Key::KEY_CAPSLOCK, start + Duration::from_millis(200)),
            Some(Resolution::Hold)
        );
    }

    #[test]
    fn test_multiple_holders_newest_first() {
        let start = Instant::now();
        let mut resolver = TapHoldResolver::new();
        resolver.press(Key::KEY_TAB, start, TapHoldConfig::default());
        resolver.press(Key::KEY_CAPSLOCK, start, TapHoldConfig::default());

        // capslock's own down interrupted nothing yet; a third key hits both
        assert_eq!(
            resolver.interrupt(Key::KEY_A),
            vec![Key::KEY_CAPSLOCK, Key::KEY_TAB]
        );
        assert!(resolver.is_holding());

        assert_eq!(resolver.release(Key::KEY_CAPSLOCK, start), Some(Resolution::Hold));
        assert_eq!(resolver.release(Key::KEY_TAB, start), Some(Resolution::Hold));
        assert!(!resolver.is_holding());
    }

    #[test]
    fn test_intervening_key_released_first_still_hold() {
        let start = Instant::now();
        let mut resolver = resolver_with(Key::KEY_TAB, start);

        resolver.interrupt(Key::KEY_A);
        // `a` goes up before tab: nothing in the resolver undoes the interruption
        assert_eq!(resolver.release(Key::KEY_A, start), None);
        assert_eq!(resolver.release(Key::KEY_TAB, start), Some(Resolution::Hold));
    }
}
