//! Configuration parsing for chordmap
//!
//! This crate handles parsing the KDL configuration file that declares which
//! devices to grab and which bindings the engine should register.

mod error;
mod model;
mod parser;

pub use error::ConfigError;
pub use model::*;
pub use parser::{parse_config, parse_config_str};
