//! Error types for the engine
//!
//! - [`DeviceError`]: the input source is gone, fatal for the event loop
//! - [`EngineError`]: why [`crate::engine::Engine::run`] stopped early
//! - [`BindingError`]: an action failed, logged and skipped
//! - [`SpecParseError`]: a trigger or output string is malformed
//! - [`WriteError`]: `send` could not parse or emit its output

use thiserror::Error;

use crate::trigger::Trigger;

/// The physical input source failed.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("input device disconnected")]
    Disconnected,

    #[error("failed to read from input device {device}: {source}")]
    Read {
        device: String,
        #[source]
        source: std::io::Error,
    },
}

/// The event loop ended with an error.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// A symbolic trigger or output string could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to parse '{input}': {reason}")]
pub struct SpecParseError {
    /// The input string that failed to parse
    pub input: String,
    /// Description of what went wrong
    pub reason: String,
}

impl SpecParseError {
    pub fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure while sending output to the synthetic device.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error(transparent)]
    Parse(#[from] SpecParseError),

    #[error("failed to emit to output device: {0}")]
    Output(#[from] std::io::Error),
}

/// An action returned an error while handling an event.
#[derive(Error, Debug)]
#[error("binding {trigger} failed: {cause:#}")]
pub struct BindingError {
    pub trigger: Trigger,
    pub cause: anyhow::Error,
}

/// A configured binding could not be turned into a trigger and action.
#[derive(Error, Debug)]
#[error("invalid binding `{binding}`")]
pub struct InvalidBinding {
    pub binding: String,
    #[source]
    pub source: SpecParseError,
}
