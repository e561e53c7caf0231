use crate::bus::MessageBus;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};


/// Event delivered to element listeners
#[derive(Debug, Clone, PartialEq)]
pub struct DomEvent {
    /// Id of the element the event was dispatched to
    pub target: String,

    /// Event name ("mouseover", "click", ...)
    pub event: String,
}

/// Listener attached to an element for one event name.
///
/// Listeners get the bus they were dispatched from, so they can re-emit
/// without holding a reference to it.
pub type Listener = Arc<dyn Fn(&MessageBus, &DomEvent) + Send + Sync>;

/// Visual properties a renderer reflects
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementStyle {
    pub fill: Option<String>,
    pub stroke: Option<String>,
    pub stroke_width: Option<f64>,
    pub radius: Option<f64>,
    pub opacity: Option<f64>,
    /// Tooltip text
    pub title: Option<String>,
    /// Side length of square elements (heatmap tiles)
    pub size: Option<f64>,
    pub hidden: bool,
}

/// A retained visual element on the rendering surface
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub id: String,
    pub classes: BTreeSet<String>,
    /// Data attributes, matched by attribute selectors
    pub attrs: BTreeMap<String, String>,
    pub style: ElementStyle,
    /// Widget-space coordinates (lat/lon on maps, pixels on charts)
    pub position: Option<(f64, f64)>,
    /// Owning widget or layer
    pub group: Option<String>,
}

impl Element {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.insert(class.into());
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some((x, y));
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

/// Headless element tree shared by all widgets.
///
/// Elements are kept sorted by id so selection results are deterministic.
#[derive(Default)]
pub struct Scene {
    elements: RwLock<BTreeMap<String, Element>>,
    listeners: RwLock<HashMap<(String, String), Vec<Listener>>>,
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene").field("elements", &self.len()).finish()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an element. Listeners of a replaced element are kept.
    pub fn insert(&self, element: Element) -> Option<Element> {
        let mut elements = self.elements.write().unwrap_or_else(PoisonError::into_inner);
        elements.insert(element.id.clone(), element)
    }

    /// Remove an element together with its listeners
    pub fn remove(&self, id: &str) -> Option<Element> {
        let removed = self
            .elements
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);

        if removed.is_some() {
            self.listeners
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(element, _), _| element != id);
        }

        removed
    }

    pub fn get(&self, id: &str) -> Option<Element> {
        self.elements
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.elements
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Mutate an element in place. Returns false when the id is unknown.
    pub fn update<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Element),
    {
        let mut elements = self.elements.write().unwrap_or_else(PoisonError::into_inner);
        match elements.get_mut(id) {
            Some(element) => {
                f(element);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.elements
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of elements carrying `class`
    pub fn select_class(&self, class: &str) -> Vec<String> {
        self.select_where(|e| e.has_class(class))
    }

    /// Ids of elements whose attribute `name` equals `value`
    pub fn select_attr(&self, name: &str, value: &str) -> Vec<String> {
        self.select_where(|e| e.attr(name) == Some(value))
    }

    /// Ids of elements belonging to `group`
    pub fn group(&self, group: &str) -> Vec<String> {
        self.select_where(|e| e.group.as_deref() == Some(group))
    }

    /// Remove every element of `group`; returns how many were removed
    pub fn remove_group(&self, group: &str) -> usize {
        let ids = self.group(group);
        ids.iter().filter(|id| self.remove(id).is_some()).count()
    }

    fn select_where<P>(&self, predicate: P) -> Vec<String>
    where
        P: Fn(&Element) -> bool,
    {
        self.elements
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| predicate(e))
            .map(|e| e.id.clone())
            .collect()
    }

    /// Attach a listener for `event` on element `id`
    pub fn on<F>(&self, id: &str, event: &str, listener: F)
    where
        F: Fn(&MessageBus, &DomEvent) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((id.to_string(), event.to_string()))
            .or_default()
            .push(listener);
    }

    /// Snapshot of the listeners for (`id`, `event`), in attach order
    pub fn listeners(&self, id: &str, event: &str) -> Vec<Listener> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(id.to_string(), event.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}
