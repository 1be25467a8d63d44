//! Binding table and actions
//!
//! The table maps exact [`Trigger`]s to [`Action`]s. Registration order is
//! kept; registering the same trigger again replaces the action in place.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use chordmap_config::{BindingConfig, Config};
use evdev::Key;

use crate::engine::ExitHandle;
use crate::error::{InvalidBinding, SpecParseError, WriteError};
use crate::key::{parse_key, KeyEvent, KeyPhase, Modifier, ModifierKey};
use crate::modifiers::ModifierTracker;
use crate::sequence::{parse_output_spec, OutputRequest};
use crate::tap_hold::{Resolution, TapHoldConfig, TapHoldResolver};
use crate::trigger::{parse_trigger, Trigger};
use crate::writer::EventWriter;

/// Callback form of an action. The key argument is the key the action
/// resolved to: the trigger's own key, or the other key for a hold chord.
pub type Callback = Box<dyn FnMut(&mut ActionContext<'_>, Key) -> anyhow::Result<()> + Send>;

/// What a binding does when its trigger fires.
pub enum Action {
    /// Emit pre-parsed output
    Send(Vec<OutputRequest>),
    /// Run arbitrary code against the context
    Invoke(Callback),
}

impl Action {
    /// Parse an output spec once, at registration.
    pub fn send(spec: &str) -> Result<Self, SpecParseError> {
        Ok(Action::Send(parse_output_spec(spec)?))
    }

    pub fn invoke<F>(f: F) -> Self
    where
        F: FnMut(&mut ActionContext<'_>, Key) -> anyhow::Result<()> + Send + 'static,
    {
        Action::Invoke(Box::new(f))
    }

    /// Stop the event loop once the current event is dispatched.
    pub fn exit() -> Self {
        Action::invoke(|ctx, _| {
            ctx.exit();
            Ok(())
        })
    }

    /// Tap the resolved key with `modifiers` held around it.
    pub fn wrap(modifiers: Vec<ModifierKey>) -> Self {
        Action::invoke(move |ctx, key| {
            let mut requests: Vec<OutputRequest> = modifiers
                .iter()
                .map(|m| OutputRequest::ModifierDown(*m))
                .collect();
            requests.push(OutputRequest::Tap(key));
            requests.extend(modifiers.iter().map(|m| OutputRequest::ModifierUp(*m)));
            ctx.send_requests(&requests)?;
            Ok(())
        })
    }

    /// Forward one phase of a physical modifier key to the output.
    ///
    /// Only `Down` and `Up` are meaningful; a `Repeat` phase makes the action
    /// fail when it runs.
    pub fn modifier_passthrough(modifier: ModifierKey, phase: KeyPhase) -> Self {
        let spec = format!("{{{} {}}}", modifier, phase);
        Action::invoke(move |ctx, _| {
            ctx.send_modifier(&spec)?;
            Ok(())
        })
    }

    pub(crate) fn run(&mut self, ctx: &mut ActionContext<'_>, key: Key) -> anyhow::Result<()> {
        match self {
            Action::Send(requests) => Ok(ctx.send_requests(requests)?),
            Action::Invoke(callback) => callback(ctx, key),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Send(requests) => f.debug_tuple("Send").field(requests).finish(),
            Action::Invoke(_) => f.write_str("Invoke(..)"),
        }
    }
}

/// Everything an action may touch while it runs.
pub struct ActionContext<'a> {
    writer: &'a mut EventWriter,
    modifiers: &'a ModifierTracker,
    resolver: &'a mut TapHoldResolver,
    exit: &'a ExitHandle,
    event: KeyEvent,
    resolution: Option<Resolution>,
    consumed: bool,
}

impl<'a> ActionContext<'a> {
    pub(crate) fn new(
        writer: &'a mut EventWriter,
        modifiers: &'a ModifierTracker,
        resolver: &'a mut TapHoldResolver,
        exit: &'a ExitHandle,
        event: KeyEvent,
        resolution: Option<Resolution>,
    ) -> Self {
        Self {
            writer,
            modifiers,
            resolver,
            exit,
            event,
            resolution,
            consumed: false,
        }
    }

    /// Parse and emit an output spec.
    pub fn send(&mut self, spec: &str) -> Result<(), WriteError> {
        self.writer.send(spec)
    }

    pub fn send_requests(&mut self, requests: &[OutputRequest]) -> Result<(), WriteError> {
        self.writer.send_requests(requests)
    }

    /// Emit exactly one modifier transition.
    pub fn send_modifier(&mut self, spec: &str) -> Result<(), WriteError> {
        self.writer.send_modifier(spec)
    }

    /// Ask the loop to stop after this dispatch.
    pub fn exit(&self) {
        self.exit.request();
    }

    /// Whether either side of a modifier family is physically held.
    pub fn is_held(&self, family: Modifier) -> bool {
        self.modifiers.is_held(family)
    }

    /// Whether this physical modifier key is held.
    pub fn is_down(&self, modifier: ModifierKey) -> bool {
        self.modifiers.is_down(modifier)
    }

    /// Suppress the tap action of the key being dispatched.
    pub fn consume(&mut self) {
        self.consumed = true;
        self.resolver.consume(self.event.key());
    }

    /// How the key's tap/hold session ended. Only set for the release of a
    /// resolvable key.
    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    /// The physical event being dispatched.
    pub fn event(&self) -> &KeyEvent {
        &self.event
    }

    pub(crate) fn is_consumed(&self) -> bool {
        self.consumed
    }
}

#[derive(Debug)]
struct Binding {
    trigger: Trigger,
    action: Action,
}

/// Registered bindings plus the per-key facts the dispatcher needs.
#[derive(Debug, Default)]
pub struct BindingTable {
    bindings: Vec<Binding>,
    index: HashMap<Trigger, usize>,
    intercepted: HashSet<Key>,
    resolvable: HashSet<Key>,
    tap_hold: HashMap<Key, TapHoldConfig>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action, replacing any action bound to the identical trigger.
    pub fn register(&mut self, trigger: Trigger, action: Action) {
        let key = trigger.key();
        if trigger.intercepts_key() {
            self.intercepted.insert(key);
        }
        if trigger.is_resolvable() {
            self.resolvable.insert(key);
        }

        match self.index.get(&trigger) {
            Some(&i) => {
                tracing::debug!("Overwriting binding for {}", trigger);
                self.bindings[i].action = action;
            }
            None => {
                tracing::debug!("Registered binding for {}", trigger);
                self.index.insert(trigger.clone(), self.bindings.len());
                self.bindings.push(Binding { trigger, action });
            }
        }
    }

    /// Parse a trigger string and register the action under it.
    pub fn register_spec(&mut self, trigger: &str, action: Action) -> Result<(), SpecParseError> {
        let trigger = parse_trigger(trigger)?;
        self.register(trigger, action);
        Ok(())
    }

    pub fn contains(&self, trigger: &Trigger) -> bool {
        self.index.contains_key(trigger)
    }

    pub(crate) fn action_mut(&mut self, trigger: &Trigger) -> Option<&mut Action> {
        let i = *self.index.get(trigger)?;
        Some(&mut self.bindings[i].action)
    }

    /// Whether the key's own events are handled by bindings and never passed
    /// through verbatim.
    pub fn intercepts(&self, key: Key) -> bool {
        self.intercepted.contains(&key)
    }

    /// Whether the key has a tap or hold binding.
    pub fn is_resolvable(&self, key: Key) -> bool {
        self.resolvable.contains(&key)
    }

    /// Opt a key into the timed tap/hold variant.
    pub fn set_tap_hold_timeout(&mut self, key: Key, timeout: Option<Duration>) {
        self.tap_hold.insert(key, TapHoldConfig { timeout });
    }

    pub fn tap_hold_config(&self, key: Key) -> TapHoldConfig {
        self.tap_hold.get(&key).copied().unwrap_or_default()
    }

    /// Triggers in registration order.
    pub fn triggers(&self) -> impl Iterator<Item = &Trigger> {
        self.bindings.iter().map(|b| &b.trigger)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Build the table from the `bindings` block of a config file.
    ///
    /// Declarations are registered in order, so a later declaration for the
    /// same trigger wins.
    pub fn from_config(config: &Config) -> Result<Self, InvalidBinding> {
        let mut table = Self::new();

        for binding in &config.bindings {
            let invalid = |source: SpecParseError| InvalidBinding {
                binding: binding.describe(),
                source,
            };

            match binding {
                BindingConfig::Map { trigger, output } => {
                    let trigger = parse_trigger(trigger).map_err(invalid)?;
                    let action = Action::Send(parse_config_output(output).map_err(invalid)?);
                    table.register(trigger, action);
                }
                BindingConfig::Exit { trigger } => {
                    let trigger = parse_trigger(trigger).map_err(invalid)?;
                    table.register(trigger, Action::exit());
                }
                BindingConfig::Tap { key, output } => {
                    let key = lookup_key(key).map_err(invalid)?;
                    let action = Action::Send(parse_config_output(output).map_err(invalid)?);
                    table.register(Trigger::Tap(key), action);
                }
                BindingConfig::TapHold {
                    key,
                    tap,
                    hold,
                    timeout_ms,
                } => {
                    let key = lookup_key(key).map_err(invalid)?;

                    if let Some(tap) = tap {
                        let action = Action::Send(parse_config_output(tap).map_err(invalid)?);
                        table.register(Trigger::Tap(key), action);
                    }

                    if !hold.is_empty() {
                        let modifiers = hold
                            .iter()
                            .map(|name| lookup_modifier(name))
                            .collect::<Result<Vec<_>, _>>()
                            .map_err(invalid)?;
                        table.register(Trigger::Hold(key), Action::wrap(modifiers));
                    }

                    if let Some(ms) = timeout_ms {
                        table.set_tap_hold_timeout(key, Some(Duration::from_millis(*ms)));
                    }
                }
                BindingConfig::ModifierPassthrough { modifier } => {
                    let modifier = lookup_modifier(modifier).map_err(invalid)?;
                    let key = modifier.to_key();
                    table.register(
                        Trigger::Down(key),
                        Action::modifier_passthrough(modifier, KeyPhase::Down),
                    );
                    table.register(
                        Trigger::Up(key),
                        Action::modifier_passthrough(modifier, KeyPhase::Up),
                    );
                }
            }
        }

        tracing::debug!("Built binding table with {} binding(s)", table.len());
        Ok(table)
    }
}

fn lookup_key(name: &str) -> Result<Key, SpecParseError> {
    parse_key(name).ok_or_else(|| SpecParseError::new(name, "unknown key"))
}

fn lookup_modifier(name: &str) -> Result<ModifierKey, SpecParseError> {
    ModifierKey::from_name(name).ok_or_else(|| SpecParseError::new(name, "not a modifier key"))
}

/// Config outputs may name a single key without braces (`"capslock"`).
/// Anything else is an ordinary output spec.
fn parse_config_output(output: &str) -> Result<Vec<OutputRequest>, SpecParseError> {
    let trimmed = output.trim();
    if trimmed.chars().count() > 1 && !trimmed.contains(['{', '}']) {
        if let Some(key) = parse_key(trimmed) {
            return Ok(vec![OutputRequest::Tap(key)]);
        }
    }
    parse_output_spec(output)
}
