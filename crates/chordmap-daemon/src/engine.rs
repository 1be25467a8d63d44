//! Dispatcher and event loop
//!
//! # Dispatch order
//!
//! For every physical event, in this order:
//!
//! 1. The modifier tracker sees the event.
//! 2. Repeat and Up of a key whose Down was swallowed are swallowed too.
//! 3. A Down interrupts every open tap/hold session. The newest holder with a
//!    hold action receives the key and dispatch stops there.
//! 4. A Down of a resolvable key opens its session; an Up closes it.
//! 5. Table lookup: chord (held modifier families + key) on Down, then
//!    `{key down}` / `{key up}`, then the plain key on Down. The chord's
//!    physical modifiers are released on the output around its action and
//!    pressed again afterwards.
//! 6. After `{key up}`, a tap resolution fires the key's tap action unless an
//!    action consumed it.
//! 7. Events nothing handled are passed through if the key is not bound.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use evdev::Key;

use crate::binding::{ActionContext, BindingTable};
use crate::error::{BindingError, EngineError};
use crate::key::{is_modifier, KeyEvent, KeyPhase, ModifierKey};
use crate::modifiers::ModifierTracker;
use crate::reader::EventSource;
use crate::sequence::OutputRequest;
use crate::tap_hold::{Resolution, TapHoldResolver};
use crate::trigger::Trigger;
use crate::writer::EventWriter;

/// Shared stop flag for [`Engine::run`].
///
/// Cloneable and usable from any thread; the loop checks it after each
/// dispatch.
#[derive(Debug, Clone, Default)]
pub struct ExitHandle(Arc<AtomicBool>);

impl ExitHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Owns all remapping state and drives events from a source to the writer.
pub struct Engine {
    table: BindingTable,
    writer: EventWriter,
    modifiers: ModifierTracker,
    resolver: TapHoldResolver,
    /// Keys whose Down was consumed by a chord, hold, or plain-key action
    swallowed: HashSet<Key>,
    exit: ExitHandle,
    passthrough: bool,
}

impl Engine {
    pub fn new(table: BindingTable, writer: EventWriter) -> Self {
        Self {
            table,
            writer,
            modifiers: ModifierTracker::new(),
            resolver: TapHoldResolver::new(),
            swallowed: HashSet::new(),
            exit: ExitHandle::new(),
            passthrough: true,
        }
    }

    /// Forward unbound events to the output. Enabled by default.
    pub fn set_passthrough(&mut self, enabled: bool) {
        self.passthrough = enabled;
    }

    pub fn exit_handle(&self) -> ExitHandle {
        self.exit.clone()
    }

    pub fn modifiers(&self) -> &ModifierTracker {
        &self.modifiers
    }

    /// Pump events until an exit is requested, the source ends, or the
    /// source fails.
    ///
    /// Keys still held on the output are released on every path.
    pub fn run<S: EventSource + ?Sized>(&mut self, source: &mut S) -> Result<(), EngineError> {
        tracing::info!("Event loop started with {} binding(s)", self.table.len());

        let result = self.pump(source);

        if let Err(e) = self.writer.release_all() {
            tracing::warn!("Failed to release held output keys: {}", e);
        }

        match &result {
            Ok(()) => tracing::info!("Event loop stopped"),
            Err(e) => tracing::error!("Event loop failed: {}", e),
        }
        result
    }

    fn pump<S: EventSource + ?Sized>(&mut self, source: &mut S) -> Result<(), EngineError> {
        while !self.exit.is_requested() {
            match source.next_event()? {
                Some(event) => self.dispatch(event),
                None => {
                    tracing::debug!("Input ended");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Route one physical event through the tracker, resolver and table.
    pub fn dispatch(&mut self, event: KeyEvent) {
        tracing::trace!("Dispatching {}", event);
        self.modifiers.on_event(&event);

        match event.phase() {
            KeyPhase::Repeat => self.dispatch_repeat(event),
            KeyPhase::Down => self.dispatch_down(event),
            KeyPhase::Up => self.dispatch_up(event),
        }
    }

    fn dispatch_repeat(&mut self, event: KeyEvent) {
        let key = event.key();
        if self.swallowed.contains(&key) || self.table.intercepts(key) {
            return;
        }
        self.pass_through(&event);
    }

    fn dispatch_down(&mut self, event: KeyEvent) {
        let key = event.key();

        let holders = self.resolver.interrupt(key);
        if !is_modifier(key) {
            if let Some(holder) = holders
                .into_iter()
                .find(|holder| self.table.contains(&Trigger::Hold(*holder)))
            {
                self.fire(&Trigger::Hold(holder), event, None, key);
                self.swallowed.insert(key);
                return;
            }
        }

        if self.table.is_resolvable(key) {
            let config = self.table.tap_hold_config(key);
            self.resolver.press(key, event.timestamp(), config);
        }

        let families = self.modifiers.families();
        if !families.is_empty() && !is_modifier(key) {
            let chord = Trigger::Chord {
                modifiers: families,
                key,
            };
            if self.table.contains(&chord) {
                let lifted = self.lift_modifiers();
                self.fire(&chord, event, None, key);
                self.restore_modifiers(&lifted);
                self.swallowed.insert(key);
                return;
            }
        }

        let down = Trigger::Down(key);
        if self.table.contains(&down) {
            self.fire(&down, event, None, key);
            return;
        }

        let plain = Trigger::Key(key);
        if self.table.contains(&plain) {
            self.fire(&plain, event, None, key);
            self.swallowed.insert(key);
            return;
        }

        if !self.table.intercepts(key) {
            self.pass_through(&event);
        }
    }

    fn dispatch_up(&mut self, event: KeyEvent) {
        let key = event.key();
        let resolution = self.resolver.release(key, event.timestamp());

        if self.swallowed.remove(&key) {
            return;
        }

        let mut consumed = false;
        let up = Trigger::Up(key);
        if self.table.contains(&up) {
            consumed = self.fire(&up, event, resolution, key);
        }

        if resolution == Some(Resolution::Tap) && !consumed {
            let tap = Trigger::Tap(key);
            if self.table.contains(&tap) {
                self.fire(&tap, event, resolution, key);
            }
        }

        if !self.table.intercepts(key) {
            self.pass_through(&event);
        }
    }

    /// Run the action bound to `trigger`. Returns whether the action consumed
    /// the key.
    fn fire(
        &mut self,
        trigger: &Trigger,
        event: KeyEvent,
        resolution: Option<Resolution>,
        key: Key,
    ) -> bool {
        let Some(action) = self.table.action_mut(trigger) else {
            return false;
        };

        tracing::debug!("{} fired by {}", trigger, event);

        let mut ctx = ActionContext::new(
            &mut self.writer,
            &self.modifiers,
            &mut self.resolver,
            &self.exit,
            event,
            resolution,
        );

        if let Err(cause) = action.run(&mut ctx, key) {
            let error = BindingError {
                trigger: trigger.clone(),
                cause,
            };
            tracing::warn!("{}", error);
        }

        ctx.is_consumed()
    }

    /// Release the physically held modifiers that are also down on the
    /// output, so a chord action starts from a clean modifier state.
    fn lift_modifiers(&mut self) -> Vec<ModifierKey> {
        let mut lifted = Vec::new();
        for modifier in self.modifiers.snapshot() {
            if !self.writer.held().contains(&modifier.to_key()) {
                continue;
            }
            match self.writer.send_requests(&[OutputRequest::ModifierUp(modifier)]) {
                Ok(()) => lifted.push(modifier),
                Err(e) => tracing::warn!("Failed to release {:?} before chord: {}", modifier, e),
            }
        }
        lifted
    }

    /// Press lifted modifiers again if they are still physically held and the
    /// action did not already leave them down.
    fn restore_modifiers(&mut self, lifted: &[ModifierKey]) {
        for &modifier in lifted {
            if !self.modifiers.is_down(modifier) || self.writer.held().contains(&modifier.to_key()) {
                continue;
            }
            if let Err(e) = self.writer.send_requests(&[OutputRequest::ModifierDown(modifier)]) {
                tracing::warn!("Failed to restore {:?} after chord: {}", modifier, e);
            }
        }
    }

    fn pass_through(&mut self, event: &KeyEvent) {
        if !self.passthrough {
            return;
        }
        if let Err(e) = self.writer.passthrough(event) {
            tracing::warn!("Failed to pass through {}: {}", event, e);
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("bindings", &self.table.len())
            .field("modifiers", &self.modifiers)
            .field("passthrough", &self.passthrough)
            .finish_non_exhaustive()
    }
}
