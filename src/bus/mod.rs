mod commands;
mod guard;

pub use commands::{Command, CommandRegistry};
pub use guard::{Blacklist, BlacklistScope, EmissionGuards};

use crate::message::{Message, Selector};
use crate::scene::{DomEvent, Scene};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;


/// In-process message bus.
///
/// Resolves message selectors against the scene and dispatches events to
/// element listeners, or runs registered commands for function selectors.
/// Emission guards keep a propagation from re-entering the same element.
pub struct MessageBus {
    scene: Arc<Scene>,
    guards: EmissionGuards,
    blacklist: Blacklist,
    commands: CommandRegistry,

    /// Nesting depth of `trigger_emit` calls
    depth: AtomicUsize,

    /// Guards armed during the current outermost propagation
    propagation: Mutex<Vec<String>>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self::with_scene(Arc::new(Scene::new()))
    }

    pub fn with_scene(scene: Arc<Scene>) -> Self {
        Self {
            scene,
            guards: EmissionGuards::new(),
            blacklist: Blacklist::new(),
            commands: CommandRegistry::new(),
            depth: AtomicUsize::new(0),
            propagation: Mutex::new(Vec::new()),
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn shared_scene(&self) -> Arc<Scene> {
        Arc::clone(&self.scene)
    }

    pub fn guards(&self) -> &EmissionGuards {
        &self.guards
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    /// Dispatch a message. Returns the number of targets reached (or 1 when a
    /// command ran).
    ///
    /// Messages without an event or a selector are skipped. Targets whose
    /// guard is armed are skipped; reached targets are armed and stay armed
    /// until something resets them.
    pub fn emit(&self, message: &Message) -> usize {
        let (Some(event), Some(selector)) = (&message.event, &message.selector) else {
            debug!("Message without event or selector, skipping");
            return 0;
        };

        let targets = match selector {
            Selector::Function { command, params } => {
                return self.commands.invoke(self, command, params);
            }
            Selector::Id(id) => {
                if self.scene.contains(id) {
                    vec![id.clone()]
                } else {
                    Vec::new()
                }
            }
            Selector::Class(class) => self.scene.select_class(class),
            Selector::Attribute { name, value } => self.scene.select_attr(name, value),
        };

        if targets.is_empty() {
            debug!(selector = ?selector, "Selector matched no elements");
            return 0;
        }

        let mut dispatched = 0;
        for target in targets {
            if !self.arm(&target) {
                continue;
            }
            self.dispatch(&target, event);
            dispatched += 1;
        }

        dispatched
    }

    /// Emit on behalf of element `source` (what widget listeners call).
    ///
    /// Skipped when `source` is blacklisted or already armed. Otherwise the
    /// source is armed, the message is emitted with its event defaulted to
    /// "mouseover", and once the outermost propagation returns every guard
    /// armed during it is reset so the next interaction fires again.
    pub fn trigger_emit(&self, source: &str, message: &Message) -> usize {
        if self.blacklist.contains(source) {
            debug!(source = %source, "Source blacklisted, not emitting");
            return 0;
        }

        if self.guards.is_armed(source) {
            debug!(source = %source, "Source already emitted in this propagation");
            return 0;
        }

        self.depth.fetch_add(1, Ordering::SeqCst);
        self.arm(source);

        let dispatched = self.emit(&message.with_default_event());

        if self.depth.fetch_sub(1, Ordering::SeqCst) == 1 {
            let armed: Vec<String> = std::mem::take(
                &mut *self.propagation.lock().unwrap_or_else(PoisonError::into_inner),
            );
            for id in &armed {
                self.guards.reset(id);
            }
        }

        dispatched
    }

    /// Dispatch `event` to the listeners of element `id`, bypassing guards.
    /// Returns the number of listeners invoked.
    pub fn dispatch(&self, id: &str, event: &str) -> usize {
        let listeners = self.scene.listeners(id, event);
        let dom_event = DomEvent {
            target: id.to_string(),
            event: event.to_string(),
        };

        for listener in &listeners {
            listener(self, &dom_event);
        }

        listeners.len()
    }

    fn arm(&self, id: &str) -> bool {
        let armed = self.guards.arm(id);
        if armed && self.depth.load(Ordering::SeqCst) > 0 {
            self.propagation
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(id.to_string());
        }
        armed
    }
}
