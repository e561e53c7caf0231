// Dashboard widgets: each owns a set of scene elements, builds them once on
// load and restyles them on every update

pub mod heatmap;
pub mod map;
pub mod overlay;
pub mod scatter;
pub mod slider;
pub mod timeseries;

pub use heatmap::{HeatmapConfig, HeatmapWidget};
pub use map::{ImageBinding, MapConfig, MapStyle, MapWidget};
pub use overlay::{OverlayState, OverlayStep, OverlayTracker};
pub use scatter::{ScatterConfig, ScatterWidget};
pub use slider::{SliderConfig, SliderWidget};
pub use timeseries::{TimeseriesConfig, TimeseriesWidget};

use crate::bus::MessageBus;
use crate::data::DataSource;
use crate::entity::Entity;
use crate::scale::{AttrBinding, ColorScale};
use crate::scene::{Element, Scene};
use crate::temporal::{resolve_f64, FillPolicy};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use tracing::error;


/// Fill used for negative values and unbound channels
pub const NO_DATA_COLOR: &str = "gray";

/// One animation frame: position in the timeline and the time key it shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFrame {
    pub position: usize,
    pub time: i64,
}

impl TimeFrame {
    pub fn new(position: usize, time: i64) -> Self {
        Self { position, time }
    }
}

/// Widget kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetKind {
    Map,
    Scatter,
    Heatmap,
    Timeseries,
    Slider,
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WidgetKind::Map => "map",
            WidgetKind::Scatter => "scatter",
            WidgetKind::Heatmap => "heatmap",
            WidgetKind::Timeseries => "timeseries",
            WidgetKind::Slider => "slider",
        };
        write!(f, "{}", name)
    }
}

/// Widget errors
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetError {
    /// `update` was called before `load` completed
    NotLoaded(String),
    /// No widget registered under this id
    UnknownWidget(String),
}

impl fmt::Display for WidgetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WidgetError::NotLoaded(id) => {
                write!(f, "widget '{}' must be loaded before it is updated", id)
            }
            WidgetError::UnknownWidget(id) => write!(f, "no widget with id '{}'", id),
        }
    }
}

impl std::error::Error for WidgetError {}

impl WidgetError {
    /// Log and build the error for a widget used before load
    pub(crate) fn not_loaded(id: &str) -> Self {
        let err = WidgetError::NotLoaded(id.to_string());
        error!(widget_id = %id, "{}", err);
        err
    }
}

/// Update contract shared by every widget.
///
/// `load` fetches the backing data and builds the widget's elements and
/// listeners. `update` only restyles existing elements for a frame; it
/// never refetches or rebuilds, and fails with [`WidgetError::NotLoaded`]
/// before `load` has completed.
#[async_trait]
pub trait Widget: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> WidgetKind;

    fn is_loaded(&self) -> bool;

    /// Whether the backing file is chosen by the selected gazetteer, so a
    /// gazetteer change must reload the widget
    fn follows_gazetteer(&self) -> bool {
        false
    }

    async fn load(&self, source: &dyn DataSource, bus: &MessageBus) -> anyhow::Result<()>;

    fn update(&self, bus: &MessageBus, frame: TimeFrame) -> Result<(), WidgetError>;
}

/// Header name as used in element ids and `param` attributes
/// (spaces and slashes removed)
pub fn sanitize_name(name: &str) -> String {
    name.chars().filter(|c| *c != ' ' && *c != '/').collect()
}

/// Text form of a record value (strings without quotes)
pub(crate) fn value_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Id of a widget's colour-bar pointer
pub fn pointer_id(widget_id: &str) -> String {
    format!("{}-pointer", widget_id)
}

/// Create the colour-bar pointer of a widget
pub(crate) fn insert_pointer(scene: &Scene, widget_id: &str) {
    scene.insert(
        Element::new(pointer_id(widget_id))
            .with_class("colorbar-pointer")
            .with_group(widget_id),
    );
}

/// Move a widget's colour-bar pointer to `value`
pub(crate) fn point_to(scene: &Scene, widget_id: &str, value: f64) {
    scene.update(&pointer_id(widget_id), |pointer| {
        pointer.position = Some((value, 0.0));
        pointer.attrs.insert("value".to_string(), value.to_string());
    });
}

/// Value of a bound attribute at `time`. `None` when the node lacks the
/// attribute or has no data, in which case the visual is left as it was.
pub(crate) fn bound_value(
    node: &Entity,
    attribute: &str,
    time: i64,
    policy: FillPolicy,
) -> Option<f64> {
    node.attribute(attribute)
        .and_then(|attr| resolve_f64(attr, time, policy))
}

/// Colour of a bound attribute; negative values are drawn as no-data
pub(crate) fn bound_color(
    node: &Entity,
    binding: &AttrBinding<ColorScale>,
    time: i64,
    policy: FillPolicy,
) -> Option<String> {
    let value = bound_value(node, &binding.attribute, time, policy)?;
    if value >= 0.0 {
        binding.scale.apply(value).map(str::to_string)
    } else {
        Some(NO_DATA_COLOR.to_string())
    }
}
