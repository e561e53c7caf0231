use dashmap::DashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Emission guards keyed by element id.
///
/// An armed element is not dispatched to again until its guard is reset.
#[derive(Debug, Default)]
pub struct EmissionGuards {
    armed: DashSet<String>,
}

impl EmissionGuards {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the guard of `id`. Returns false if it was already armed.
    pub fn arm(&self, id: &str) -> bool {
        self.armed.insert(id.to_string())
    }

    pub fn is_armed(&self, id: &str) -> bool {
        self.armed.contains(id)
    }

    pub fn reset(&self, id: &str) {
        self.armed.remove(id);
    }

    pub fn reset_all(&self) {
        self.armed.clear();
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }
}

/// Stack of element ids excluded from emission while a widget redraws them
#[derive(Debug, Default)]
pub struct Blacklist {
    entries: Mutex<Vec<String>>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, id: impl Into<String>) {
        self.entries().push(id.into());
    }

    pub fn pop(&self) -> Option<String> {
        self.entries().pop()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries().iter().any(|entry| entry == id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push `ids` and pop them again when the returned scope is dropped
    pub fn scope<I, S>(&self, ids: I) -> BlacklistScope<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entries = self.entries();
        let before = entries.len();
        entries.extend(ids.into_iter().map(Into::into));
        let pushed = entries.len() - before;

        BlacklistScope {
            blacklist: self,
            pushed,
        }
    }
}

/// Pops the entries pushed by [`Blacklist::scope`] on drop
#[must_use = "entries are popped as soon as the scope is dropped"]
pub struct BlacklistScope<'a> {
    blacklist: &'a Blacklist,
    pushed: usize,
}

impl Drop for BlacklistScope<'_> {
    fn drop(&mut self) {
        let mut entries = self.blacklist.entries();
        let keep = entries.len().saturating_sub(self.pushed);
        entries.truncate(keep);
    }
}
