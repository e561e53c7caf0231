use crate::bus::MessageBus;
use crate::widgets::{TimeFrame, Widget, WidgetError, WidgetKind};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Widgets in registration order, keyed by kind and id
#[derive(Default)]
pub struct WidgetRegistry {
    widgets: RwLock<Vec<Arc<dyn Widget>>>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a widget. A widget of the same kind and id is replaced in place
    /// and returned.
    pub fn register(&self, widget: Arc<dyn Widget>) -> Option<Arc<dyn Widget>> {
        let mut widgets = self.widgets.write().unwrap_or_else(PoisonError::into_inner);

        match widgets
            .iter_mut()
            .find(|w| w.kind() == widget.kind() && w.id() == widget.id())
        {
            Some(slot) => {
                warn!(widget_id = %widget.id(), kind = %widget.kind(), "Replacing registered widget");
                Some(std::mem::replace(slot, widget))
            }
            None => {
                widgets.push(widget);
                None
            }
        }
    }

    pub fn remove(&self, kind: WidgetKind, id: &str) -> Option<Arc<dyn Widget>> {
        let mut widgets = self.widgets.write().unwrap_or_else(PoisonError::into_inner);
        let index = widgets.iter().position(|w| w.kind() == kind && w.id() == id)?;
        Some(widgets.remove(index))
    }

    pub fn get(&self, kind: WidgetKind, id: &str) -> Option<Arc<dyn Widget>> {
        self.widgets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|w| w.kind() == kind && w.id() == id)
            .cloned()
    }

    /// Snapshot of every widget, in registration order
    pub fn all(&self) -> Vec<Arc<dyn Widget>> {
        self.widgets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.widgets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Update one widget
    pub fn update(
        &self,
        kind: WidgetKind,
        id: &str,
        bus: &MessageBus,
        frame: TimeFrame,
    ) -> Result<(), WidgetError> {
        let widget = self
            .get(kind, id)
            .ok_or_else(|| WidgetError::UnknownWidget(id.to_string()))?;
        widget.update(bus, frame)
    }

    /// Update every loaded widget in registration order. Widgets still
    /// loading are skipped. Returns how many were updated.
    pub fn update_all(&self, bus: &MessageBus, frame: TimeFrame) -> usize {
        let mut updated = 0;

        for widget in self.all() {
            if !widget.is_loaded() {
                debug!(widget_id = %widget.id(), "Widget not loaded yet, skipping update");
                continue;
            }
            match widget.update(bus, frame) {
                Ok(()) => updated += 1,
                Err(e) => warn!(widget_id = %widget.id(), error = %e, "Widget update failed"),
            }
        }

        updated
    }
}

/// Time keys the dashboard steps through
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    steps: Vec<i64>,
}

impl Timeline {
    pub fn new(steps: Vec<i64>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[i64] {
        &self.steps
    }

    pub fn time_at(&self, position: usize) -> Option<i64> {
        self.steps.get(position).copied()
    }

    /// First position showing `time`
    pub fn position_of(&self, time: i64) -> Option<usize> {
        self.steps.iter().position(|t| *t == time)
    }

    /// Last position (0 for an empty timeline)
    pub fn last_position(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    /// Frame at `position`, clamped to the last timestep. Without
    /// timesteps, positions are time keys.
    pub fn frame(&self, position: usize) -> TimeFrame {
        if self.steps.is_empty() {
            return TimeFrame::new(position, position as i64);
        }
        let position = position.min(self.last_position());
        TimeFrame::new(position, self.steps[position])
    }
}
