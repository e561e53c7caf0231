use super::{insert_pointer, point_to, value_label, TimeFrame, Widget, WidgetError, WidgetKind, NO_DATA_COLOR};
use crate::bus::MessageBus;
use crate::data::{DataSource, HeatmapData, HeatmapPoint};
use crate::message::{parse_comm_msg, Message};
use crate::scale::{ColorScale, NumericScale, OR_RD_9};
use crate::scene::{DomEvent, Element, Scene};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Room left of and below the grid for the axes
pub const AXIS_MARGIN: f64 = 75.0;

/// Heatmap configuration (`load_heatmap`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapConfig {
    /// Heatmap id; data is read from `hm_{id}.json`
    pub id: String,

    #[serde(default = "default_height")]
    pub height: f64,

    /// Point field on the x axis
    #[serde(alias = "attr_2_x")]
    pub x_attr: String,

    /// Point field on the y axis
    #[serde(alias = "attr_2_y")]
    pub y_attr: String,

    /// Point field that is coloured
    #[serde(alias = "attr_2_z")]
    pub z_attr: String,

    /// Colour of the log-normalized z value (domain 0..1)
    #[serde(default = "default_color_scale")]
    pub color_scale: ColorScale,

    #[serde(default)]
    pub comm_msg: Option<Message>,
}

fn default_height() -> f64 {
    600.0
}

fn default_color_scale() -> ColorScale {
    ColorScale::quantize([0.0, 1.0], &OR_RD_9)
}

impl HeatmapConfig {
    pub fn new(
        id: impl Into<String>,
        x_attr: impl Into<String>,
        y_attr: impl Into<String>,
        z_attr: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            height: default_height(),
            x_attr: x_attr.into(),
            y_attr: y_attr.into(),
            z_attr: z_attr.into(),
            color_scale: default_color_scale(),
            comm_msg: None,
        }
    }

    pub fn data_file(&self) -> String {
        format!("hm_{}.json", self.id)
    }
}

/// Parameter key shared by the tile of `(x, y)` and the series of the same
/// name: `"{x_attr}_{x}_{y_attr}_{y}"`
pub fn param_key(x_attr: &str, x: &Value, y_attr: &str, y: &Value) -> String {
    format!("{}_{}_{}_{}", x_attr, value_label(x), y_attr, value_label(y))
}

/// Id of a heatmap tile
pub fn tile_id(heatmap_id: &str, point: &HeatmapPoint) -> String {
    format!("hm_{}_{}_{}", heatmap_id, point.x_idx, point.y_idx)
}

/// Square grid of tiles over two parameters
pub struct HeatmapWidget {
    config: HeatmapConfig,
    data: RwLock<Option<Arc<HeatmapData>>>,
}

impl HeatmapWidget {
    pub fn new(config: HeatmapConfig) -> Self {
        Self {
            config,
            data: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &HeatmapConfig {
        &self.config
    }

    pub fn data(&self) -> Option<Arc<HeatmapData>> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Container group of the tiles
    pub fn group(&self) -> String {
        format!("hm_container_{}", self.config.id)
    }

    fn build_elements(&self, scene: &Scene, data: &HeatmapData) {
        let config = &self.config;
        let group = self.group();
        let tile_size = (config.height - AXIS_MARGIN) / data.grid_side();

        // Log scale over the z extent, normalized to 0..1
        let dynamic_scale = data
            .extent(&config.z_attr)
            .map(|(lo, hi)| NumericScale::Log {
                domain: [lo, hi],
                range: [0.0, 1.0],
            });

        insert_pointer(scene, &group);

        for point in &data.points {
            let id = tile_id(&config.id, point);
            let null = Value::Null;
            let x = point.fields.get(&config.x_attr).unwrap_or(&null);
            let y = point.fields.get(&config.y_attr).unwrap_or(&null);
            let z = point.fields.get(&config.z_attr).unwrap_or(&null);
            let key = param_key(&config.x_attr, x, &config.y_attr, y);

            let normalized = point
                .value(&config.z_attr)
                .and_then(|z| dynamic_scale.as_ref().and_then(|s| s.apply(z)));
            let color = normalized
                .and_then(|v| config.color_scale.apply(v))
                .unwrap_or(NO_DATA_COLOR)
                .to_string();

            let mut tile = Element::new(&id)
                .with_class(key.as_str())
                .with_attr("param", key.as_str())
                .with_group(group.as_str())
                .at(
                    AXIS_MARGIN + tile_size * point.x_idx as f64,
                    config.height - tile_size * point.y_idx as f64 - AXIS_MARGIN,
                );
            tile.style.size = Some(tile_size);
            tile.style.fill = Some(color.clone());
            tile.style.stroke = Some(color);
            tile.style.title = Some(format!(
                "({}, {}, {})",
                value_label(x),
                value_label(y),
                value_label(z)
            ));
            scene.insert(tile);

            self.attach_listeners(scene, point, &id, normalized);
        }
    }

    fn attach_listeners(&self, scene: &Scene, point: &HeatmapPoint, id: &str, normalized: Option<f64>) {
        let pointer_group = self.group();
        scene.on(id, "mouseover", move |bus: &MessageBus, _event: &DomEvent| {
            if let Some(value) = normalized {
                point_to(bus.scene(), &pointer_group, value);
            }
        });

        if let Some(template) = self.config.comm_msg.clone() {
            let mut record: Map<String, Value> = point.fields.clone();
            record.insert("x_idx".to_string(), Value::from(point.x_idx));
            record.insert("y_idx".to_string(), Value::from(point.y_idx));

            scene.on(id, "click", move |bus: &MessageBus, event: &DomEvent| {
                let message = parse_comm_msg(&template, &record);
                bus.trigger_emit(&event.target, &message);
            });
        }
    }
}

#[async_trait]
impl Widget for HeatmapWidget {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn kind(&self) -> WidgetKind {
        WidgetKind::Heatmap
    }

    fn is_loaded(&self) -> bool {
        self.data().is_some()
    }

    async fn load(&self, source: &dyn DataSource, bus: &MessageBus) -> Result<()> {
        let path = self.config.data_file();
        let text = source
            .fetch(&path)
            .await
            .with_context(|| format!("Failed to load heatmap '{}'", self.config.id))?;
        let data = HeatmapData::parse(&text).with_context(|| format!("Invalid heatmap file {}", path))?;

        let scene = bus.scene();
        scene.remove_group(&self.group());
        self.build_elements(scene, &data);

        info!(
            widget_id = %self.config.id,
            data_file = %path,
            points = data.points.len(),
            "Heatmap loaded"
        );

        *self.data.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(data));
        Ok(())
    }

    fn update(&self, bus: &MessageBus, frame: TimeFrame) -> Result<(), WidgetError> {
        let data = self
            .data()
            .ok_or_else(|| WidgetError::not_loaded(&self.config.id))?;

        for point in &data.points {
            bus.guards().reset(&tile_id(&self.config.id, point));
        }

        debug!(widget_id = %self.config.id, position = frame.position, "Heatmap guards reset");
        Ok(())
    }
}
