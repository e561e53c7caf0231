use super::{
    bound_color, bound_value, insert_pointer, point_to, TimeFrame, Widget, WidgetError,
    WidgetKind, NO_DATA_COLOR,
};
use crate::bus::MessageBus;
use crate::data::{parse_gazetteer, DataSource};
use crate::entity::{node_key, Entity};
use crate::message::{parse_comm_msg, Message};
use crate::scale::{AttrBinding, ColorScale, NumericScale, OR_RD_9};
use crate::scene::{DomEvent, Element, Scene};
use crate::state::DashboardState;
use crate::temporal::FillPolicy;
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Plot margins: top, right, bottom, left
const MARGIN: (f64, f64, f64, f64) = (50.0, 20.0, 50.0, 40.0);

/// 2D scatter configuration (`load2dScatter`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterConfig {
    pub id: String,

    /// Node file; prefixed with the selected gazetteer when there is one
    pub data_file: String,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Fixed time key, in place of the dashboard time
    #[serde(default)]
    pub time_idx: Option<i64>,

    #[serde(default = "default_opacity")]
    pub node_opacity: f64,

    #[serde(default = "default_color")]
    pub node_attr_2_color: AttrBinding<ColorScale>,

    #[serde(default = "default_radius")]
    pub node_attr_2_radius: AttrBinding<NumericScale>,

    #[serde(default = "default_x")]
    pub node_attr_2_x: String,

    #[serde(default = "default_y")]
    pub node_attr_2_y: String,

    #[serde(default)]
    pub missing_values: FillPolicy,

    #[serde(default)]
    pub comm_msg: Option<Message>,
}

fn default_width() -> u32 {
    500
}

fn default_height() -> u32 {
    600
}

fn default_opacity() -> f64 {
    0.6
}

fn default_color() -> AttrBinding<ColorScale> {
    AttrBinding::new("RDT_obs", ColorScale::quantize([0.0, 0.52], &OR_RD_9))
}

fn default_radius() -> AttrBinding<NumericScale> {
    AttrBinding::new("Population", NumericScale::sqrt([0.0, 1e3], [0.0, 8.0]))
}

fn default_x() -> String {
    "x".to_string()
}

fn default_y() -> String {
    "y".to_string()
}

impl ScatterConfig {
    pub fn new(id: impl Into<String>, data_file: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data_file: data_file.into(),
            width: default_width(),
            height: default_height(),
            time_idx: None,
            node_opacity: default_opacity(),
            node_attr_2_color: default_color(),
            node_attr_2_radius: default_radius(),
            node_attr_2_x: default_x(),
            node_attr_2_y: default_y(),
            missing_values: FillPolicy::default(),
            comm_msg: None,
        }
    }

    /// Drawable area (width, height) inside the margins
    pub fn plot_size(&self) -> (f64, f64) {
        let (top, right, bottom, left) = MARGIN;
        (
            f64::from(self.width) - left - right,
            f64::from(self.height) - top - bottom,
        )
    }
}

fn extent(values: &[f64]) -> [f64; 2] {
    values
        .iter()
        .fold(None, |acc: Option<[f64; 2]>, v| match acc {
            None => Some([*v, *v]),
            Some([lo, hi]) => Some([lo.min(*v), hi.max(*v)]),
        })
        .unwrap_or([0.0, 1.0])
}

/// Nodes placed by two attributes, coloured and sized by two more
pub struct ScatterWidget {
    config: ScatterConfig,
    state: Arc<DashboardState>,
    nodes: RwLock<Option<Arc<Vec<Entity>>>>,
    color_values: Arc<DashMap<String, f64>>,
}

impl ScatterWidget {
    pub fn new(config: ScatterConfig, state: Arc<DashboardState>) -> Self {
        Self {
            config,
            state,
            nodes: RwLock::new(None),
            color_values: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &ScatterConfig {
        &self.config
    }

    pub fn nodes(&self) -> Option<Arc<Vec<Entity>>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn data_path(&self) -> String {
        match self.state.gazetteer_select() {
            Some(gazetteer) => format!("{}_{}", gazetteer, self.config.data_file),
            None => self.config.data_file.clone(),
        }
    }

    pub fn node_key(&self, label: &str) -> String {
        node_key(label, &self.config.id)
    }

    fn local_time(&self, frame: TimeFrame) -> i64 {
        self.config.time_idx.unwrap_or(frame.time)
    }

    fn build_elements(&self, scene: &Scene, nodes: &[Entity]) {
        let config = &self.config;
        let time = config.time_idx.unwrap_or_else(|| self.state.time_idx());
        let policy = config.missing_values;

        let coords: Vec<(Option<f64>, Option<f64>)> = nodes
            .iter()
            .map(|node| {
                (
                    bound_value(node, &config.node_attr_2_x, time, policy),
                    bound_value(node, &config.node_attr_2_y, time, policy),
                )
            })
            .collect();
        let xs: Vec<f64> = coords.iter().filter_map(|(x, _)| *x).collect();
        let ys: Vec<f64> = coords.iter().filter_map(|(_, y)| *y).collect();

        let (width, height) = config.plot_size();
        let x_scale = NumericScale::linear(extent(&xs), [0.0, width]);
        let y_scale = NumericScale::linear(extent(&ys), [height, 0.0]);

        insert_pointer(scene, &config.id);

        for (node, (x, y)) in nodes.iter().zip(coords) {
            let key = self.node_key(&node.label);

            let mut marker = Element::new(&key)
                .with_class(node.label.as_str())
                .with_group(config.id.as_str());
            if let (Some(cx), Some(cy)) = (
                x.and_then(|x| x_scale.apply(x)),
                y.and_then(|y| y_scale.apply(y)),
            ) {
                marker = marker.at(cx, cy);
            }
            marker.style.stroke = Some(NO_DATA_COLOR.to_string());
            marker.style.opacity = Some(config.node_opacity);
            scene.insert(marker);

            self.attach_mouseover(scene, node, &key);
        }
    }

    fn attach_mouseover(&self, scene: &Scene, node: &Entity, key: &str) {
        let widget_id = self.config.id.clone();
        let domain_max = self.config.node_attr_2_color.scale.domain_max();
        let color_values = Arc::clone(&self.color_values);
        let comm_msg = self.config.comm_msg.clone();
        let record = node.record.clone();

        scene.on(key, "mouseover", move |bus: &MessageBus, event: &DomEvent| {
            if let Some(value) = color_values.get(&event.target).map(|v| *v) {
                let clamped = domain_max.map_or(value, |max| max.min(value));
                point_to(bus.scene(), &widget_id, clamped);
            }

            if let Some(template) = &comm_msg {
                let message = parse_comm_msg(template, &record);
                bus.trigger_emit(&event.target, &message);
            }
        });
    }
}

#[async_trait]
impl Widget for ScatterWidget {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn kind(&self) -> WidgetKind {
        WidgetKind::Scatter
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
            .with_context(|| format!("Failed to load scatter '{}'", self.config.id))?;
        let nodes = parse_gazetteer(&text).with_context(|| format!("Invalid node file {}", path))?;

        let scene = bus.scene();
        scene.remove_group(&self.config.id);
        self.color_values.clear();
        self.build_elements(scene, &nodes);

        info!(
            widget_id = %self.config.id,
            data_file = %path,
            nodes = nodes.len(),
            "Scatter loaded"
        );

        *self.nodes.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(nodes));
        Ok(())
    }

    fn update(&self, bus: &MessageBus, frame: TimeFrame) -> Result<(), WidgetError> {
        let nodes = self
            .nodes()
            .ok_or_else(|| WidgetError::not_loaded(&self.config.id))?;

        let config = &self.config;
        let time = self.local_time(frame);
        let policy = config.missing_values;
        let color = &config.node_attr_2_color;
        let radius = &config.node_attr_2_radius;

        for node in nodes.iter() {
            let key = self.node_key(&node.label);
            bus.guards().reset(&key);

            let value = bound_value(node, &color.attribute, time, policy);
            match value {
                Some(v) => {
                    self.color_values.insert(key.clone(), v);
                }
                None => {
                    self.color_values.remove(&key);
                }
            }

            let fill = bound_color(node, color, time, policy);
            let size = bound_value(node, &radius.attribute, time, policy)
                .and_then(|v| radius.scale.apply(v));
            let shown = match value {
                Some(v) if v >= 0.0 => v.to_string(),
                _ => "N/A".to_string(),
            };
            let title = format!("{}: {}: {}", node.label, color.attribute, shown);

            bus.scene().update(&key, |marker| {
                if let Some(fill) = fill {
                    marker.style.fill = Some(fill);
                }
                if let Some(r) = size {
                    marker.style.radius = Some(r.max(0.0));
                }
                marker.style.title = Some(title);
            });
        }

        debug!(widget_id = %config.id, time = time, "Scatter restyled");
        Ok(())
    }
}
