//! Tap/hold and chord remapping engine
//!
//! Events flow one way:
//!
//! ```text
//! device -> reader -> engine (modifiers, tap/hold, bindings) -> writer -> uinput
//! ```
//!
//! The engine is synchronous and single threaded. Async code lives only at
//! the edges: the device reader task and the daemon's signal handling.

pub mod binding;
pub mod device;
pub mod engine;
pub mod error;
pub mod injector;
pub mod key;
pub mod modifiers;
pub mod reader;
pub mod sequence;
pub mod tap_hold;
pub mod trigger;
pub mod writer;

pub use binding::{Action, ActionContext, BindingTable};
pub use engine::{Engine, ExitHandle};
pub use error::{BindingError, DeviceError, EngineError, InvalidBinding, SpecParseError, WriteError};
pub use key::{KeyEvent, KeyPhase, Modifier, ModifierKey};
pub use reader::EventSource;
pub use tap_hold::{Resolution, TapHoldConfig};
pub use trigger::Trigger;
pub use writer::{EventWriter, OutputSink};
