//! Configuration data model

use std::path::PathBuf;

use serde::Serialize;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize)]
pub struct Config {
    pub global: GlobalConfig,
    pub devices: Vec<DeviceConfig>,
    /// Bindings in declaration order; later entries overwrite earlier ones
    /// with the same trigger when the engine registers them.
    pub bindings: Vec<BindingConfig>,
}

/// Global settings
#[derive(Debug, Clone, Serialize)]
pub struct GlobalConfig {
    pub log_level: LogLevel,
    /// Name of the uinput device the engine writes to
    pub output_name: String,
    /// Forward events that no binding handles to the output device
    pub passthrough: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            output_name: "chordmap".to_string(),
            passthrough: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

/// An input device to grab.
///
/// At least one of `name` and `path` is set; when both are, the path wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceConfig {
    /// Device name to match (from evdev)
    pub name: Option<String>,
    /// Device node, e.g. `/dev/input/by-path/...-event-kbd`
    pub path: Option<PathBuf>,
}

/// One declaration from the `bindings` block.
///
/// Trigger and output strings are kept as written; the daemon parses them
/// when it builds its binding table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BindingConfig {
    /// `map "<trigger>" "<output>"`
    Map { trigger: String, output: String },
    /// `exit "<trigger>"`
    Exit { trigger: String },
    /// `tap "<key>" "<output>"`
    Tap { key: String, output: String },
    /// `tap-hold "<key>" tap="<output>" hold="<modifiers>" timeout-ms=<n>`
    TapHold {
        key: String,
        tap: Option<String>,
        hold: Vec<String>,
        timeout_ms: Option<u64>,
    },
    /// `modifier-passthrough "<modifier>"...`
    ModifierPassthrough { modifier: String },
}

impl BindingConfig {
    /// Short label for log messages
    pub fn describe(&self) -> String {
        match self {
            Self::Map { trigger, output } => format!("map {} -> {}", trigger, output),
            Self::Exit { trigger } => format!("exit on {}", trigger),
            Self::Tap { key, output } => format!("tap {} -> {}", key, output),
            Self::TapHold { key, .. } => format!("tap-hold {}", key),
            Self::ModifierPassthrough { modifier } => format!("modifier passthrough {}", modifier),
        }
    }
}
