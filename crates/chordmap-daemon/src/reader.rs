//! Physical input
//!
//! The engine pulls canonical [`KeyEvent`]s from an [`EventSource`]. In the
//! daemon that source is a [`ChannelSource`] fed by one async task which merges
//! the streams of every grabbed device, so the engine thread never touches
//! evdev directly.

use std::sync::mpsc;

use evdev::{EventStream, EventType, InputEvent, Key};
use futures::stream::{select_all, StreamExt};

use crate::error::DeviceError;
use crate::key::{KeyEvent, KeyPhase};

/// Blocking source of canonical key events.
pub trait EventSource {
    /// Wait for the next event.
    ///
    /// `Ok(None)` is a clean end of input. An error is fatal for the loop.
    fn next_event(&mut self) -> Result<Option<KeyEvent>, DeviceError>;
}

/// Convert a raw evdev event into a key event.
///
/// Only `EV_KEY` events with value 0, 1 or 2 are kept; everything else
/// (sync reports, scan codes, LEDs) is dropped.
pub fn normalize(event: &InputEvent) -> Option<KeyEvent> {
    if event.event_type() != EventType::KEY {
        return None;
    }
    let phase = KeyPhase::from_value(event.value())?;
    Some(KeyEvent::new(Key::new(event.code()), phase))
}

/// Messages from the reader task to the engine thread.
#[derive(Debug)]
pub enum InputMessage {
    Event(KeyEvent),
    Lost(DeviceError),
    Shutdown,
}

/// Receiving half, read by the engine.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<InputMessage>,
}

/// Sending half, held by the reader task and the signal handler.
#[derive(Debug, Clone)]
pub struct InputSender {
    tx: mpsc::Sender<InputMessage>,
}

/// Create a connected sender and source.
pub fn channel() -> (InputSender, ChannelSource) {
    let (tx, rx) = mpsc::channel();
    (InputSender { tx }, ChannelSource { rx })
}

impl EventSource for ChannelSource {
    fn next_event(&mut self) -> Result<Option<KeyEvent>, DeviceError> {
        match self.rx.recv() {
            Ok(InputMessage::Event(event)) => Ok(Some(event)),
            Ok(InputMessage::Lost(error)) => Err(error),
            Ok(InputMessage::Shutdown) => Ok(None),
            Err(mpsc::RecvError) => Err(DeviceError::Disconnected),
        }
    }
}

impl InputSender {
    /// Returns `false` once the engine has stopped listening.
    pub fn send_event(&self, event: KeyEvent) -> bool {
        self.tx.send(InputMessage::Event(event)).is_ok()
    }

    pub fn report_lost(&self, error: DeviceError) {
        let _ = self.tx.send(InputMessage::Lost(error));
    }

    /// Wake the engine and end its loop cleanly.
    pub fn shutdown(&self) {
        let _ = self.tx.send(InputMessage::Shutdown);
    }
}

/// Forward events from every device stream until one fails or all end.
///
/// Runs as a tokio task. Losing any grabbed device ends input for the engine.
pub async fn forward_devices(devices: Vec<(String, EventStream)>, sender: InputSender) {
    let streams = devices.into_iter().map(|(name, stream)| {
        stream
            .map(move |result| (name.clone(), result))
            .boxed()
    });
    let mut merged = select_all(streams);

    while let Some((name, result)) = merged.next().await {
        match result {
            Ok(raw) => {
                let Some(event) = normalize(&raw) else {
                    continue;
                };
                tracing::trace!("{}: {}", name, event);
                if !sender.send_event(event) {
                    tracing::debug!("Engine stopped listening, ending input task");
                    return;
                }
            }
            Err(source) => {
                tracing::error!("Failed to read from {}: {}", name, source);
                sender.report_lost(DeviceError::Read {
                    device: name,
                    source,
                });
                return;
            }
        }
    }

    tracing::warn!("All input devices closed");
    sender.report_lost(DeviceError::Disconnected);
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;

    use super::*;

    /// Replays a fixed list of events, then ends or fails.
    pub struct ScriptedSource {
        events: VecDeque<KeyEvent>,
        failure: Option<DeviceError>,
    }

    impl ScriptedSource {
        pub fn new(events: Vec<KeyEvent>) -> Self {
            Self {
                events: events.into(),
                failure: None,
            }
        }

        /// A down and an up for each key in turn.
        pub fn taps(keys: &[Key]) -> Self {
            let events = keys
                .iter()
                .flat_map(|key| {
                    [
                        KeyEvent::new(*key, KeyPhase::Down),
                        KeyEvent::new(*key, KeyPhase::Up),
                    ]
                })
                .collect();
            Self::new(events)
        }

        /// Fail with `error` once the events run out.
        pub fn then_fail(mut self, error: DeviceError) -> Self {
            self.failure = Some(error);
            self
        }

        pub fn remaining(&self) -> usize {
            self.events.len()
        }
    }

    impl EventSource for ScriptedSource {
        fn next_event(&mut self) -> Result<Option<KeyEvent>, DeviceError> {
            if let Some(event) = self.events.pop_front() {
                return Ok(Some(event));
            }
            match self.failure.take() {
                Some(error) => Err(error),
                None => Ok(None),
            }
        }
    }
}
