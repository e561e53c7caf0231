use super::MessageBus;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error};

/// Handler invoked by a function selector, with the message's bound params
pub type Command =
    Arc<dyn Fn(&MessageBus, &Map<String, Value>) -> anyhow::Result<()> + Send + Sync>;

/// Registered commands by name
#[derive(Default)]
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `name`
    pub fn register<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&MessageBus, &Map<String, Value>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.commands
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<Command> {
        self.commands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .commands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Run `name` with `params`. Returns 1 if a handler ran, 0 otherwise.
    /// Handler errors are logged and swallowed.
    pub(crate) fn invoke(&self, bus: &MessageBus, name: &str, params: &Map<String, Value>) -> usize {
        // Clone the handler out so no lock is held while it runs
        let Some(command) = self.get(name) else {
            debug!(command = %name, "No command registered, skipping");
            return 0;
        };

        if let Err(e) = command(bus, params) {
            error!(command = %name, error = %e, "Command failed");
        }
        1
    }
}
