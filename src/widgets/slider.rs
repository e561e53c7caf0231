use super::{TimeFrame, Widget, WidgetError, WidgetKind};
use crate::bus::MessageBus;
use crate::data::{DataSource, TimeseriesTable};
use crate::message::{parse_comm_msg, Message};
use crate::scale::NumericScale;
use crate::scene::{Element, Scene};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

/// Track length of the slider
pub const TRACK_WIDTH: f64 = 860.0;

const HANDLE_RADIUS: f64 = 9.0;

/// Slider configuration (`loadSlider`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliderConfig {
    pub id: String,

    /// Time-series file whose rows are the slider positions
    pub data_file: String,

    /// Initial position
    #[serde(default)]
    pub time_idx: Option<usize>,

    #[serde(default)]
    pub comm_msg: Option<Message>,
}

impl SliderConfig {
    pub fn new(id: impl Into<String>, data_file: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data_file: data_file.into(),
            time_idx: None,
            comm_msg: None,
        }
    }
}

/// Id of a slider's handle element
pub fn handle_id(slider_id: &str) -> String {
    format!("{}-slider-brush", slider_id)
}

/// Timeline slider over the rows of a time-series file
pub struct SliderWidget {
    config: SliderConfig,
    dates: RwLock<Option<Vec<NaiveDate>>>,
}

impl SliderWidget {
    pub fn new(config: SliderConfig) -> Self {
        Self {
            config,
            dates: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &SliderConfig {
        &self.config
    }

    pub fn handle_id(&self) -> String {
        handle_id(&self.config.id)
    }

    /// Number of positions, once loaded
    pub fn len(&self) -> Option<usize> {
        self.dates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Vec::len)
    }

    /// Position under the handle
    pub fn position(&self, scene: &Scene) -> Option<usize> {
        scene
            .get(&self.handle_id())
            .and_then(|handle| handle.attr("position").and_then(|p| p.parse().ok()))
    }

    fn track_scale(rows: usize) -> NumericScale {
        NumericScale::linear([0.0, rows.saturating_sub(1) as f64], [0.0, TRACK_WIDTH])
    }

    fn move_handle(&self, scene: &Scene, position: usize) -> bool {
        let Some(rows) = self.len() else {
            return false;
        };
        let position = position.min(rows.saturating_sub(1));
        let dates = self.dates.read().unwrap_or_else(PoisonError::into_inner);
        let date = dates.as_ref().and_then(|d| d.get(position)).copied();
        let cx = Self::track_scale(rows).apply(position as f64).unwrap_or(0.0);

        scene.update(&self.handle_id(), |handle| {
            handle.position = Some((cx, 0.0));
            handle.attrs.insert("position".to_string(), position.to_string());
            if let Some(date) = date {
                handle.attrs.insert("date".to_string(), date.to_string());
            }
        })
    }

    /// User drag to `value` (a fractional position): moves the handle to the
    /// nearest row and emits `{"time": position}`. Returns the position.
    pub fn drag(&self, bus: &MessageBus, value: f64) -> Result<usize, WidgetError> {
        let rows = self
            .len()
            .ok_or_else(|| WidgetError::not_loaded(&self.config.id))?;

        let last = rows.saturating_sub(1) as f64;
        let position = value.clamp(0.0, last).round() as usize;
        self.move_handle(bus.scene(), position);

        debug!(widget_id = %self.config.id, position = position, "Slider dragged");

        if let Some(template) = &self.config.comm_msg {
            let mut record = Map::new();
            record.insert("time".to_string(), Value::from(position));
            let message = parse_comm_msg(template, &record);
            bus.trigger_emit(&self.handle_id(), &message);
        }

        Ok(position)
    }
}

#[async_trait]
impl Widget for SliderWidget {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn kind(&self) -> WidgetKind {
        WidgetKind::Slider
    }

    fn is_loaded(&self) -> bool {
        self.len().is_some()
    }

    async fn load(&self, source: &dyn DataSource, bus: &MessageBus) -> Result<()> {
        let path = &self.config.data_file;
        let text = source
            .fetch(path)
            .await
            .with_context(|| format!("Failed to load slider '{}'", self.config.id))?;
        let table = TimeseriesTable::parse(&text).with_context(|| format!("Invalid timeseries file {}", path))?;

        let scene = bus.scene();
        scene.remove_group(&self.config.id);

        let mut handle = Element::new(self.handle_id())
            .with_class("slider-handle")
            .with_group(self.config.id.as_str());
        handle.style.radius = Some(HANDLE_RADIUS);
        scene.insert(handle);

        let rows = table.len();
        *self.dates.write().unwrap_or_else(PoisonError::into_inner) = Some(table.dates);

        let initial = self.config.time_idx.unwrap_or(0).min(rows.saturating_sub(1));
        self.move_handle(scene, initial);

        info!(
            widget_id = %self.config.id,
            data_file = %path,
            positions = rows,
            "Slider loaded"
        );
        Ok(())
    }

    fn update(&self, bus: &MessageBus, frame: TimeFrame) -> Result<(), WidgetError> {
        if !self.is_loaded() {
            return Err(WidgetError::not_loaded(&self.config.id));
        }

        bus.guards().reset(&self.handle_id());
        self.move_handle(bus.scene(), frame.position);
        Ok(())
    }
}
