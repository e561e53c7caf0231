use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current UI selection shared by every widget
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionState {
    /// Time key currently shown (a simulation day)
    pub time_idx: i64,

    /// Label of the selected node, if any
    pub node_select: Option<String>,

    /// Selected gazetteer (prefix of the map data file)
    pub gazetteer_select: Option<String>,

    /// Model attached to the selected gazetteer entry
    pub gazetteer_model: Option<String>,

    /// Highlighted heatmap params, in selection order
    pub params_select: Vec<ParamSelection>,
}

/// A heatmap param highlighted from a timeseries legend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamSelection {
    /// Class shared by the highlighted elements
    pub class_name: String,

    /// Fill of each element before it was first highlighted
    pub fill: Vec<(String, Option<String>)>,

    pub toggled: bool,
}

/// Which part of the selection changed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionField {
    TimeIdx,
    Node,
    Gazetteer,
    Params,
}

/// Selection change broadcast to subscribers
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectionChanged {
    pub field: SelectionField,
    pub old_value: Value,
    pub new_value: Value,
    pub timestamp: DateTime<Utc>,
}

impl SelectionChanged {
    pub(crate) fn new(field: SelectionField, old_value: Value, new_value: Value) -> Self {
        Self {
            field,
            old_value,
            new_value,
            timestamp: Utc::now(),
        }
    }
}
