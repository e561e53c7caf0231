use super::{
    bound_color, bound_value, insert_pointer, point_to, OverlayStep, OverlayTracker, TimeFrame,
    Widget, WidgetError, WidgetKind, NO_DATA_COLOR,
};
use crate::bus::MessageBus;
use crate::data::{parse_gazetteer, DataSource};
use crate::entity::{node_key, Entity, GeoBounds};
use crate::message::{parse_comm_msg, Message};
use crate::scale::{AttrBinding, ColorScale, NumericScale};
use crate::scene::{DomEvent, Element, ElementStyle, Scene};
use crate::state::DashboardState;
use crate::temporal::{as_number, is_truthy, resolve, FillPolicy};
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Radius of a node marker before any styling
pub const NODE_RADIUS: f64 = 10.0;

/// Opacity of node markers without an override or binding
pub const DEFAULT_NODE_OPACITY: f64 = 0.6;

/// Radius of attribute-image markers
pub const MARKER_RADIUS: f64 = 6.5;

/// Pixel offsets of the attribute-image markers around a node; only this
/// many markers are drawn per node
pub const MARKER_OFFSETS: [(f64, f64); 4] = [(-5.0, -5.0), (5.0, -5.0), (-5.0, 5.0), (5.0, 5.0)];

const SELECTED_STROKE: &str = "black";
const SELECTED_STROKE_WIDTH: f64 = 2.0;

/// A node attribute shown as an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBinding {
    #[serde(alias = "node_attr_img", alias = "node_event_img")]
    pub attribute: String,

    /// Maps the attribute value to an image index
    #[serde(alias = "img_scale")]
    pub scale: NumericScale,

    /// Image sources by index; when empty, fills reference patterns by id
    #[serde(default, alias = "img_src")]
    pub images: Vec<String>,
}

impl ImageBinding {
    /// Fill for `value`: the image source at the scaled index, or a
    /// `url(#{prefix}{attribute}_{index})` pattern reference
    pub fn fill(&self, prefix: &str, value: &Value) -> String {
        let index = as_number(value)
            .and_then(|v| self.scale.apply(v))
            .map(|i| i.round().max(0.0) as usize)
            .unwrap_or(0);

        match self.images.len() {
            0 => format!("url(#{}{}_{})", prefix, self.attribute, index),
            n => self.images[index.min(n - 1)].clone(),
        }
    }
}

/// Styling options of a map (`styleMap`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapStyle {
    /// Fixed time key, in place of the dashboard time
    #[serde(default)]
    pub time_idx: Option<i64>,

    #[serde(default)]
    pub node_attr_2_color: Option<AttrBinding<ColorScale>>,

    #[serde(default)]
    pub node_attr_2_radius: Option<AttrBinding<NumericScale>>,

    #[serde(default)]
    pub node_attr_2_stroke: Option<AttrBinding<ColorScale>>,

    #[serde(default)]
    pub node_attr_2_opacity: Option<AttrBinding<NumericScale>>,

    /// Fixed opacity; wins over `node_attr_2_opacity`
    #[serde(default)]
    pub node_opacity: Option<f64>,

    /// Attribute markers, faded out when the attribute goes quiet
    #[serde(default)]
    pub node_attrs_2_img: Vec<ImageBinding>,

    /// Event overlays drawn on top of the node
    #[serde(default)]
    pub node_events_2_img: Vec<ImageBinding>,

    #[serde(default)]
    pub missing_values: FillPolicy,
}

/// Map widget configuration (`loadMap` + `styleMap`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    pub id: String,

    /// Node file; prefixed with the selected gazetteer when there is one
    pub data_file: String,

    #[serde(default = "default_map_width")]
    pub width: u32,

    #[serde(default = "default_map_height")]
    pub height: u32,

    #[serde(default)]
    pub base_layer: Option<String>,

    #[serde(default)]
    pub additional_layers: Vec<String>,

    #[serde(default)]
    pub style: MapStyle,

    #[serde(default)]
    pub comm_msg: Option<Message>,
}

fn default_map_width() -> u32 {
    800
}

fn default_map_height() -> u32 {
    600
}

impl MapConfig {
    pub fn new(id: impl Into<String>, data_file: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data_file: data_file.into(),
            width: default_map_width(),
            height: default_map_height(),
            base_layer: None,
            additional_layers: Vec::new(),
            style: MapStyle::default(),
            comm_msg: None,
        }
    }
}

/// Id of the attribute marker of `attribute` on node `key`
pub fn marker_id(attribute: &str, key: &str) -> String {
    format!("attr{}_{}", attribute, key)
}

/// Id of the event overlay of `event` on node `key`
pub fn event_overlay_id(event: &str, key: &str) -> String {
    format!("event{}_{}", event, key)
}

/// Node markers over geographic coordinates
pub struct MapWidget {
    config: MapConfig,
    state: Arc<DashboardState>,
    overlays: OverlayTracker,
    nodes: RwLock<Option<Arc<Vec<Entity>>>>,

    /// Colour value per node at the last update, read by the pointer
    color_values: Arc<DashMap<String, f64>>,
}

impl MapWidget {
    pub fn new(config: MapConfig, state: Arc<DashboardState>) -> Self {
        Self {
            config,
            state,
            overlays: OverlayTracker::default(),
            nodes: RwLock::new(None),
            color_values: Arc::new(DashMap::new()),
        }
    }

    pub fn with_ttl_max(mut self, ttl_max: u32) -> Self {
        self.overlays = OverlayTracker::new(ttl_max);
        self
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn overlays(&self) -> &OverlayTracker {
        &self.overlays
    }

    pub fn nodes(&self) -> Option<Arc<Vec<Entity>>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Data file for the current gazetteer selection
    pub fn data_path(&self) -> String {
        match self.state.gazetteer_select() {
            Some(gazetteer) => format!("{}_{}", gazetteer, self.config.data_file),
            None => self.config.data_file.clone(),
        }
    }

    pub fn node_key(&self, label: &str) -> String {
        node_key(label, &self.config.id)
    }

    /// Group of the event overlays
    pub fn clone_group(&self) -> String {
        format!("clone{}", self.config.id)
    }

    fn build_elements(&self, scene: &Scene, nodes: &[Entity]) {
        let id = &self.config.id;

        let mut container = Element::new(format!("map_container_{}", id))
            .with_group(id.as_str())
            .with_attr("width", self.config.width.to_string())
            .with_attr("height", self.config.height.to_string());
        if let Some(base_layer) = &self.config.base_layer {
            container = container.with_attr("base-layer", base_layer.as_str());
        }
        if !self.config.additional_layers.is_empty() {
            container = container.with_attr("layers", self.config.additional_layers.join(","));
        }
        if let Some((lat, lon)) = GeoBounds::of(nodes).map(|b| b.center()) {
            container = container.at(lat, lon);
        }
        scene.insert(container);

        if self.config.style.node_attr_2_color.is_some() {
            insert_pointer(scene, id);
        }

        for node in nodes {
            let key = self.node_key(&node.label);

            let mut marker = Element::new(&key)
                .with_class(node.label.as_str())
                .with_attr("node-group", id.as_str())
                .with_group(id.as_str())
                .at(node.latitude, node.longitude);
            marker.style.radius = Some(NODE_RADIUS);
            scene.insert(marker);

            for (binding, (dx, dy)) in self.config.style.node_attrs_2_img.iter().zip(MARKER_OFFSETS) {
                let mut image = Element::new(marker_id(&binding.attribute, &key))
                    .with_class(binding.attribute.as_str())
                    .with_attr("dx", dx.to_string())
                    .with_attr("dy", dy.to_string())
                    .with_group(id.as_str())
                    .at(node.latitude, node.longitude);
                image.style.radius = Some(MARKER_RADIUS);
                image.style.opacity = Some(0.0);
                scene.insert(image);
            }

            self.attach_mouseover(scene, node, &key);
        }
    }

    fn attach_mouseover(&self, scene: &Scene, node: &Entity, key: &str) {
        let widget_id = self.config.id.clone();
        let has_color = self.config.style.node_attr_2_color.is_some();
        let color_values = Arc::clone(&self.color_values);
        let comm_msg = self.config.comm_msg.clone();
        let record = node.record.clone();

        scene.on(key, "mouseover", move |bus: &MessageBus, event: &DomEvent| {
            if has_color {
                if let Some(value) = color_values.get(&event.target).map(|v| *v) {
                    point_to(bus.scene(), &widget_id, value);
                }
            }

            if let Some(template) = &comm_msg {
                let message = parse_comm_msg(template, &record);
                bus.trigger_emit(&event.target, &message);
            }
        });
    }

    fn style_node(&self, node: &Entity, time: i64, selected: bool, style: &mut ElementStyle) {
        let options = &self.config.style;
        let policy = options.missing_values;

        match &options.node_attr_2_color {
            Some(binding) => {
                if let Some(fill) = bound_color(node, binding, time, policy) {
                    style.fill = Some(fill);
                }
            }
            None => style.fill = Some(NO_DATA_COLOR.to_string()),
        }

        if selected {
            style.stroke = Some(SELECTED_STROKE.to_string());
            style.stroke_width = Some(SELECTED_STROKE_WIDTH);
        } else {
            match &options.node_attr_2_stroke {
                Some(binding) => {
                    if let Some(stroke) = bound_color(node, binding, time, policy) {
                        style.stroke = Some(stroke);
                    }
                }
                None => style.stroke = Some(NO_DATA_COLOR.to_string()),
            }
        }

        if let Some(binding) = &options.node_attr_2_radius {
            if let Some(radius) = bound_value(node, &binding.attribute, time, policy)
                .and_then(|v| binding.scale.apply(v))
            {
                style.radius = Some(radius.max(0.0));
            }
        }

        match (options.node_opacity, &options.node_attr_2_opacity) {
            (Some(opacity), _) => style.opacity = Some(opacity),
            (None, Some(binding)) => {
                if let Some(opacity) = bound_value(node, &binding.attribute, time, policy)
                    .and_then(|v| binding.scale.apply(v))
                {
                    style.opacity = Some(opacity);
                }
            }
            (None, None) => style.opacity = Some(DEFAULT_NODE_OPACITY),
        }
    }

    fn style_markers(&self, scene: &Scene, node: &Entity, key: &str, time: i64) {
        let bindings = self.config.style.node_attrs_2_img.iter().take(MARKER_OFFSETS.len());

        for binding in bindings {
            let id = marker_id(&binding.attribute, key);
            let mut fill = None;

            match node.attribute(&binding.attribute) {
                Some(attr) => match resolve(attr, time, FillPolicy::NoFill) {
                    Some(value) if is_truthy(&value) => {
                        self.overlays.refresh(&id);
                        fill = Some(binding.fill("attr", &value));
                    }
                    _ => {
                        self.overlays.decay(&id);
                    }
                },
                None => self.overlays.expire(&id),
            }

            let opacity = self.overlays.opacity(self.overlays.ttl(&id).unwrap_or(0));
            scene.update(&id, |marker| {
                if let Some(fill) = fill {
                    marker.style.fill = Some(fill);
                }
                marker.style.opacity = Some(opacity);
            });
        }
    }

    fn style_events(&self, scene: &Scene, node: &Entity, key: &str, time: i64) {
        for binding in &self.config.style.node_events_2_img {
            let Some(attr) = node.attribute(&binding.attribute) else {
                continue;
            };

            let value = resolve(attr, time, FillPolicy::NoFill).filter(is_truthy);
            let id = event_overlay_id(&binding.attribute, key);

            match self.overlays.advance(&id, value.is_some()) {
                OverlayStep::Created => {
                    let Some(mut overlay) = scene.get(key) else {
                        continue;
                    };
                    let group = self.clone_group();
                    overlay.id = id;
                    overlay.attrs.insert("node-group".to_string(), group.clone());
                    overlay.group = Some(group);
                    overlay.style.fill = value.as_ref().map(|v| binding.fill("event", v));
                    overlay.style.opacity = Some(1.0);
                    scene.insert(overlay);
                }
                OverlayStep::Refreshed => {
                    let fill = value.as_ref().map(|v| binding.fill("event", v));
                    scene.update(&id, |overlay| {
                        overlay.style.fill = fill;
                        overlay.style.opacity = Some(1.0);
                    });
                }
                OverlayStep::Faded(ttl) => {
                    let opacity = self.overlays.opacity(ttl);
                    scene.update(&id, |overlay| overlay.style.opacity = Some(opacity));
                }
                OverlayStep::Removed => {
                    scene.remove(&id);
                }
                OverlayStep::Untouched => {}
            }
        }
    }
}

#[async_trait]
impl Widget for MapWidget {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn kind(&self) -> WidgetKind {
        WidgetKind::Map
    }

    fn is_loaded(&self) -> bool {
        self.nodes().is_some()
    }

    fn follows_gazetteer(&self) -> bool {
        true
    }

    async fn load(&self, source: &dyn DataSource, bus: &MessageBus) -> Result<()> {
        let path = self.data_path();
        let text = source
            .fetch(&path)
            .await
            .with_context(|| format!("Failed to load map '{}'", self.config.id))?;
        let nodes = parse_gazetteer(&text).with_context(|| format!("Invalid node file {}", path))?;

        let scene = bus.scene();
        scene.remove_group(&self.config.id);
        scene.remove_group(&self.clone_group());
        self.overlays.clear();
        self.color_values.clear();

        self.build_elements(scene, &nodes);

        info!(
            widget_id = %self.config.id,
            data_file = %path,
            source = source.name(),
            nodes = nodes.len(),
            "Map loaded"
        );

        *self.nodes.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(nodes));
        Ok(())
    }

    fn update(&self, bus: &MessageBus, frame: TimeFrame) -> Result<(), WidgetError> {
        let nodes = self
            .nodes()
            .ok_or_else(|| WidgetError::not_loaded(&self.config.id))?;

        let time = self.config.style.time_idx.unwrap_or(frame.time);
        let selected = self.state.node_select();
        let scene = bus.scene();

        for node in nodes.iter() {
            let key = self.node_key(&node.label);
            bus.guards().reset(&key);

            if let Some(binding) = &self.config.style.node_attr_2_color {
                match bound_value(node, &binding.attribute, time, self.config.style.missing_values) {
                    Some(value) => {
                        self.color_values.insert(key.clone(), value);
                    }
                    None => {
                        self.color_values.remove(&key);
                    }
                }
            }

            let is_selected = selected.as_deref() == Some(node.label.as_str());
            scene.update(&key, |marker| {
                self.style_node(node, time, is_selected, &mut marker.style)
            });

            self.style_markers(scene, node, &key, time);
            self.style_events(scene, node, &key, time);
        }

        debug!(widget_id = %self.config.id, time = time, "Map restyled");
        Ok(())
    }
}
