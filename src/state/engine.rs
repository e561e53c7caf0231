use crate::state::selection::{ParamSelection, SelectionChanged, SelectionField, SelectionState};
use serde_json::Value;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Dashboard state shared by the controller and every widget.
///
/// Each mutation is broadcast so that interested tasks (e.g. the per-node
/// chart loader) can react without polling.
pub struct DashboardState {
    selection: RwLock<SelectionState>,

    /// Broadcast channel for selection changes
    changes_tx: broadcast::Sender<SelectionChanged>,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new(SelectionState::default())
    }
}

impl DashboardState {
    pub fn new(initial: SelectionState) -> Self {
        let (changes_tx, _) = broadcast::channel(256);

        Self {
            selection: RwLock::new(initial),
            changes_tx,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SelectionState> {
        self.selection.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SelectionState> {
        self.selection.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn broadcast(&self, change: SelectionChanged) -> SelectionChanged {
        // No receivers is fine
        let _ = self.changes_tx.send(change.clone());
        change
    }

    /// Subscribe to selection changes
    pub fn subscribe(&self) -> broadcast::Receiver<SelectionChanged> {
        self.changes_tx.subscribe()
    }

    /// Copy of the whole selection
    pub fn snapshot(&self) -> SelectionState {
        self.read().clone()
    }

    pub fn time_idx(&self) -> i64 {
        self.read().time_idx
    }

    pub fn set_time_idx(&self, time_idx: i64) -> SelectionChanged {
        let old = std::mem::replace(&mut self.write().time_idx, time_idx);
        debug!(time_idx = time_idx, "Time index selected");
        self.broadcast(SelectionChanged::new(
            SelectionField::TimeIdx,
            Value::from(old),
            Value::from(time_idx),
        ))
    }

    pub fn node_select(&self) -> Option<String> {
        self.read().node_select.clone()
    }

    /// Select a node (or clear the selection). Returns `None` when the
    /// selection did not change.
    pub fn select_node(&self, label: Option<String>) -> Option<SelectionChanged> {
        let old = {
            let mut selection = self.write();
            if selection.node_select == label {
                return None;
            }
            std::mem::replace(&mut selection.node_select, label.clone())
        };

        info!(node = ?label, previous = ?old, "Node selected");
        Some(self.broadcast(SelectionChanged::new(
            SelectionField::Node,
            Value::from(old),
            Value::from(label),
        )))
    }

    pub fn gazetteer_select(&self) -> Option<String> {
        self.read().gazetteer_select.clone()
    }

    pub fn gazetteer_model(&self) -> Option<String> {
        self.read().gazetteer_model.clone()
    }

    pub fn select_gazetteer(&self, value: String, model: Option<String>) -> SelectionChanged {
        let old = {
            let mut selection = self.write();
            selection.gazetteer_model = model;
            std::mem::replace(&mut selection.gazetteer_select, Some(value.clone()))
        };

        info!(gazetteer = %value, "Gazetteer selected");
        self.broadcast(SelectionChanged::new(
            SelectionField::Gazetteer,
            Value::from(old),
            Value::from(value),
        ))
    }

    pub fn params_select(&self) -> Vec<ParamSelection> {
        self.read().params_select.clone()
    }

    /// Toggle the highlight of `class_name`.
    ///
    /// On first selection the class is added toggled on, with the fills
    /// returned by `original_fills` remembered for restoring later. On later
    /// calls its `toggled` flag flips. Returns the updated entry.
    pub fn toggle_param<F>(&self, class_name: &str, original_fills: F) -> ParamSelection
    where
        F: FnOnce() -> Vec<(String, Option<String>)>,
    {
        let param = {
            let mut selection = self.write();
            match selection
                .params_select
                .iter_mut()
                .find(|p| p.class_name == class_name)
            {
                Some(param) => {
                    param.toggled = !param.toggled;
                    param.clone()
                }
                None => {
                    let param = ParamSelection {
                        class_name: class_name.to_string(),
                        fill: original_fills(),
                        toggled: true,
                    };
                    selection.params_select.push(param.clone());
                    param
                }
            }
        };

        self.broadcast(SelectionChanged::new(
            SelectionField::Params,
            Value::from(class_name),
            Value::from(param.toggled),
        ));
        param
    }

    /// Drop every param selection
    pub fn clear_params(&self) {
        let cleared = std::mem::take(&mut self.write().params_select);
        if !cleared.is_empty() {
            self.broadcast(SelectionChanged::new(
                SelectionField::Params,
                Value::from(cleared.len()),
                Value::from(0),
            ));
        }
    }
}
