//! KDL configuration parser

use std::path::Path;

use crate::error::ConfigError;
use crate::model::*;

/// Parse a configuration file from the given path
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl carries its own miette version, so rebuild the span by hand
        let offset = e.span.offset();
        let len = e.span.len();
        let span = miette::SourceSpan::from((offset, len));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "global" => {
                config.global = parse_global(node)?;
            }
            "device" => {
                config.devices.push(parse_device(node)?);
            }
            "bindings" => {
                config.bindings.extend(parse_bindings(node)?);
            }
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    Ok(config)
}

/// Positional (unnamed) string arguments of a node
fn string_args(node: &kdl::KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

/// Value of a `name=value` property
fn property<'a>(node: &'a kdl::KdlNode, name: &str) -> Option<&'a kdl::KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().map(|n| n.value() == name).unwrap_or(false))
        .map(|e| e.value())
}

fn first_string_arg(node: &kdl::KdlNode, field: &str) -> Result<String, ConfigError> {
    string_args(node)
        .into_iter()
        .next()
        .ok_or_else(|| ConfigError::MissingField {
            field: field.to_string(),
        })
}

fn parse_global(node: &kdl::KdlNode) -> Result<GlobalConfig, ConfigError> {
    let mut global = GlobalConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "log-level" => {
                    if let Some(entry) = child.entries().first() {
                        if let Some(val) = entry.value().as_string() {
                            global.log_level = val.parse().map_err(|e| ConfigError::Invalid {
                                message: e,
                            })?;
                        }
                    }
                }
                "output-name" => {
                    global.output_name = first_string_arg(child, "output-name value")?;
                }
                "passthrough" => {
                    let value = child.entries().first().and_then(|e| e.value().as_bool());
                    global.passthrough = value.ok_or_else(|| ConfigError::Invalid {
                        message: "passthrough expects true or false".to_string(),
                    })?;
                }
                name => {
                    tracing::warn!("Unknown global config option: {}", name);
                }
            }
        }
    }

    Ok(global)
}

fn parse_device(node: &kdl::KdlNode) -> Result<DeviceConfig, ConfigError> {
    let name = string_args(node).into_iter().next();
    let path = property(node, "path")
        .and_then(|v| v.as_string())
        .map(|p| shellexpand::tilde(p).into_owned().into());

    if name.is_none() && path.is_none() {
        return Err(ConfigError::MissingField {
            field: "device name or path (e.g., `device \"My Keyboard\"` or `device path=\"/dev/input/event3\"`)"
                .to_string(),
        });
    }

    Ok(DeviceConfig { name, path })
}

fn parse_bindings(node: &kdl::KdlNode) -> Result<Vec<BindingConfig>, ConfigError> {
    let mut bindings = Vec::new();

    let Some(children) = node.children() else {
        return Ok(bindings);
    };

    for child in children.nodes() {
        let args = string_args(child);

        match child.name().value() {
            "map" => match args.as_slice() {
                [trigger, output] => bindings.push(BindingConfig::Map {
                    trigger: trigger.clone(),
                    output: output.clone(),
                }),
                _ => {
                    return Err(ConfigError::MissingField {
                        field: "map expects a trigger and an output (e.g., `map \"^capslock\" \"capslock\"`)"
                            .to_string(),
                    })
                }
            },
            "exit" => {
                if args.is_empty() {
                    return Err(ConfigError::MissingField {
                        field: "exit trigger (e.g., `exit \"pagedown\"`)".to_string(),
                    });
                }
                bindings.extend(args.into_iter().map(|trigger| BindingConfig::Exit { trigger }));
            }
            "tap" => match args.as_slice() {
                [key, output] => bindings.push(BindingConfig::Tap {
                    key: key.clone(),
                    output: output.clone(),
                }),
                _ => {
                    return Err(ConfigError::MissingField {
                        field: "tap expects a key and an output (e.g., `tap \"capslock\" \"{esc}\"`)"
                            .to_string(),
                    })
                }
            },
            "tap-hold" => bindings.push(parse_tap_hold(child, args)?),
            "modifier-passthrough" => {
                if args.is_empty() {
                    return Err(ConfigError::MissingField {
                        field: "modifier-passthrough modifier (e.g., `modifier-passthrough \"leftalt\"`)"
                            .to_string(),
                    });
                }
                bindings.extend(
                    args.into_iter()
                        .map(|modifier| BindingConfig::ModifierPassthrough { modifier }),
                );
            }
            name => {
                tracing::warn!("Unknown binding kind: {}", name);
            }
        }
    }

    Ok(bindings)
}

fn parse_tap_hold(node: &kdl::KdlNode, args: Vec<String>) -> Result<BindingConfig, ConfigError> {
    let key = args.into_iter().next().ok_or_else(|| ConfigError::MissingField {
        field: "tap-hold key (e.g., `tap-hold \"tab\" tap=\"{tab}\" hold=\"alt meta shift\"`)"
            .to_string(),
    })?;

    let tap = property(node, "tap")
        .and_then(|v| v.as_string())
        .map(|s| s.to_string());

    let hold: Vec<String> = property(node, "hold")
        .and_then(|v| v.as_string())
        .map(|s| s.split_whitespace().map(|m| m.to_string()).collect())
        .unwrap_or_default();

    let timeout_ms = match property(node, "timeout-ms") {
        None => None,
        Some(value) => match value.as_i64() {
            Some(ms) if ms > 0 => Some(ms as u64),
            _ => {
                return Err(ConfigError::Invalid {
                    message: format!("tap-hold '{}': timeout-ms must be a positive integer", key),
                })
            }
        },
    };

    if tap.is_none() && hold.is_empty() {
        return Err(ConfigError::Invalid {
            message: format!("tap-hold '{}' needs at least one of tap= or hold=", key),
        });
    }

    Ok(BindingConfig::TapHold {
        key,
        tap,
        hold,
        timeout_ms,
    })
}
