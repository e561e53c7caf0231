use super::{sanitize_name, TimeFrame, Widget, WidgetError, WidgetKind};
use crate::bus::MessageBus;
use crate::data::{DataSource, TimeseriesTable};
use crate::message::{parse_comm_msg, Message};
use crate::scene::{DomEvent, Element, Scene};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Plot area
pub const PLOT_WIDTH: f64 = 700.0;
pub const PLOT_HEIGHT: f64 = 380.0;

/// Legend fill of a hidden series
pub const INACTIVE_COLOR: &str = "#F1F1F2";

const LEGEND_RADIUS: f64 = 20.0;
const LEGEND_HEIGHT: f64 = 450.0;
const LEGEND_X: f64 = PLOT_WIDTH + 350.0 / 3.0 - 25.0;
const LINE_WIDTH: f64 = 1.5;
const HOVER_LINE_WIDTH: f64 = 2.5;
const DOT_RADIUS: f64 = 5.0;

/// ColorBrewer Paired, 12 classes
const PAIRED_12: [&str; 12] = [
    "#a6cee3", "#1f78b4", "#b2df8a", "#33a02c", "#fb9a99", "#e31a1c", "#fdbf6f", "#ff7f00",
    "#cab2d6", "#6a3d9a", "#ffff99", "#b15928",
];

/// Timeseries configuration (`loadTimeseries`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesConfig {
    /// Series id; data is read from `{prefix}_{id}.tsv`
    pub id: String,

    /// Value column prefix, also the y axis label
    #[serde(alias = "ts_type")]
    pub prefix: String,

    /// Series colours, assigned to columns in order and reused cyclically
    #[serde(default = "default_colors")]
    pub colors: Vec<String>,

    /// Series shown from the start, drawn as dots
    #[serde(default)]
    pub special: Option<String>,

    #[serde(default)]
    pub comm_msg: Option<Message>,
}

fn default_colors() -> Vec<String> {
    PAIRED_12.iter().map(|c| c.to_string()).collect()
}

impl TimeseriesConfig {
    pub fn new(id: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prefix: prefix.into(),
            colors: default_colors(),
            special: None,
            comm_msg: None,
        }
    }

    pub fn data_file(&self) -> String {
        format!("{}_{}.tsv", self.prefix, self.id)
    }
}

/// A series as currently shown
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesView {
    pub name: String,
    /// Sanitized name, the `param` attribute of its legend item
    pub param: String,
    pub color: String,
    pub visible: bool,
    pub special: bool,
}

impl SeriesView {
    fn legend_fill(&self) -> String {
        if self.visible {
            self.color.clone()
        } else {
            INACTIVE_COLOR.to_string()
        }
    }

    /// Record bound into the legend's comm message
    fn record(&self) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert("name".to_string(), Value::from(self.name.as_str()));
        record.insert("param".to_string(), Value::from(self.param.as_str()));
        record.insert("ts_color".to_string(), Value::from(self.color.as_str()));
        record.insert("visible".to_string(), Value::from(self.visible));
        record
    }
}

struct Loaded {
    table: TimeseriesTable,
    series: Vec<SeriesView>,
    y_max: Option<f64>,
}

struct Inner {
    config: TimeseriesConfig,
    loaded: RwLock<Option<Loaded>>,
}

impl Inner {
    fn group(&self) -> String {
        format!("ts_container_{}", self.config.id)
    }

    fn line_id(&self, param: &str) -> String {
        format!("line-{}-{}", self.config.id, param)
    }

    fn legend_id(&self, param: &str) -> String {
        format!("{}-legend-{}", self.config.id, param)
    }

    fn dot_id(&self, row: usize) -> String {
        format!("{}-dot-{}", self.config.id, row)
    }

    fn y_axis_id(&self) -> String {
        format!("{}-y-axis", self.config.id)
    }

    fn x_axis_id(&self) -> String {
        format!("{}-x-axis", self.config.id)
    }

    fn cursor_id(&self) -> String {
        format!("{}-date-cursor", self.config.id)
    }

    fn series(&self, param: &str) -> Option<SeriesView> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|loaded| loaded.series.iter().find(|s| s.param == param).cloned())
    }

    fn special_rows(&self, table: &TimeseriesTable, name: &str) -> Vec<usize> {
        table
            .column(name)
            .map(|column| {
                column
                    .values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| v.is_some())
                    .map(|(row, _)| row)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Flip the visibility of a series and rescale the y axis to the
    /// visible series. Returns the updated series.
    fn toggle(&self, scene: &Scene, param: &str) -> Option<SeriesView> {
        let (view, y_max, dots) = {
            let mut guard = self.loaded.write().unwrap_or_else(PoisonError::into_inner);
            let loaded = guard.as_mut()?;

            let series = loaded.series.iter_mut().find(|s| s.param == param)?;
            series.visible = !series.visible;
            let view = series.clone();

            loaded.y_max = visible_max(&loaded.table, &loaded.series);
            let dots = if view.special {
                self.special_rows(&loaded.table, &view.name)
            } else {
                Vec::new()
            };
            (view, loaded.y_max, dots)
        };

        scene.update(&self.line_id(&view.param), |line| {
            line.style.hidden = !view.visible || view.special;
        });
        for row in dots {
            scene.update(&self.dot_id(row), |dot| dot.style.hidden = !view.visible);
        }
        scene.update(&self.legend_id(&view.param), |legend| {
            legend.style.fill = Some(view.legend_fill());
        });
        set_y_max(scene, &self.y_axis_id(), y_max);

        debug!(
            widget_id = %self.config.id,
            series = %view.name,
            visible = view.visible,
            "Series toggled"
        );
        Some(view)
    }

    fn build_elements(&self, scene: &Scene, table: &TimeseriesTable, series: &[SeriesView], y_max: Option<f64>) {
        let group = self.group();

        let mut y_axis = Element::new(self.y_axis_id())
            .with_class("y-axis")
            .with_attr("label", self.config.prefix.as_str())
            .with_group(group.as_str());
        if let Some(max) = y_max {
            y_axis = y_axis.with_attr("max", max.to_string());
        }
        scene.insert(y_axis);

        scene.insert(Element::new(self.x_axis_id()).with_class("x-axis").with_group(group.as_str()));
        set_x_domain(scene, &self.x_axis_id(), table.date_extent());

        let mut cursor = Element::new(self.cursor_id())
            .with_class("date-cursor")
            .with_group(group.as_str());
        cursor.style.hidden = true;
        scene.insert(cursor);

        let legend_space = LEGEND_HEIGHT / series.len().max(1) as f64;

        for (i, view) in series.iter().enumerate() {
            let mut line = Element::new(self.line_id(&view.param))
                .with_class("line")
                .with_group(group.as_str());
            line.style.stroke = Some(view.color.clone());
            line.style.stroke_width = Some(LINE_WIDTH);
            line.style.hidden = !view.visible || view.special;
            scene.insert(line);

            if view.special {
                let values = table.column(&view.name).map(|c| c.values.as_slice()).unwrap_or_default();
                for (row, value) in values.iter().enumerate() {
                    let Some(value) = value else { continue };
                    let mut dot = Element::new(self.dot_id(row))
                        .with_class("dot")
                        .with_attr("date", table.dates[row].to_string())
                        .with_attr("value", value.to_string())
                        .with_group(group.as_str());
                    dot.style.radius = Some(DOT_RADIUS);
                    dot.style.fill = Some(view.color.clone());
                    dot.style.stroke = Some("#000".to_string());
                    dot.style.stroke_width = Some(LINE_WIDTH);
                    dot.style.hidden = !view.visible;
                    scene.insert(dot);
                }
            }

            let legend_id = self.legend_id(&view.param);
            let mut legend = Element::new(&legend_id)
                .with_class("legend-box")
                .with_attr("param", view.param.as_str())
                .with_group(group.as_str())
                .at(LEGEND_X, legend_space + i as f64 * legend_space - 4.0);
            legend.style.radius = Some(LEGEND_RADIUS);
            legend.style.fill = Some(view.legend_fill());
            legend.style.title = Some(view.name.clone());
            scene.insert(legend);
        }
    }
}

fn series_color(colors: &[String], i: usize) -> String {
    if colors.is_empty() {
        PAIRED_12[i % PAIRED_12.len()].to_string()
    } else {
        colors[i % colors.len()].clone()
    }
}

fn visible_max(table: &TimeseriesTable, series: &[SeriesView]) -> Option<f64> {
    series
        .iter()
        .filter(|s| s.visible)
        .filter_map(|s| table.column(&s.name).and_then(|c| c.max()))
        .reduce(f64::max)
}

fn set_y_max(scene: &Scene, id: &str, y_max: Option<f64>) {
    scene.update(id, |axis| match y_max {
        Some(max) => {
            axis.attrs.insert("max".to_string(), max.to_string());
        }
        None => {
            axis.attrs.remove("max");
        }
    });
}

fn set_x_domain(scene: &Scene, id: &str, domain: Option<(NaiveDate, NaiveDate)>) {
    scene.update(id, |axis| {
        if let Some((from, to)) = domain {
            axis.attrs.insert("from".to_string(), from.to_string());
            axis.attrs.insert("to".to_string(), to.to_string());
        }
    });
}

/// Multi-series line chart with a toggling legend
pub struct TimeseriesWidget {
    inner: Arc<Inner>,
}

impl TimeseriesWidget {
    pub fn new(config: TimeseriesConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                loaded: RwLock::new(None),
            }),
        }
    }

    pub fn config(&self) -> &TimeseriesConfig {
        &self.inner.config
    }

    /// Container group of the chart elements
    pub fn group(&self) -> String {
        self.inner.group()
    }

    pub fn legend_id(&self, name: &str) -> String {
        self.inner.legend_id(&sanitize_name(name))
    }

    pub fn line_id(&self, name: &str) -> String {
        self.inner.line_id(&sanitize_name(name))
    }

    pub fn cursor_id(&self) -> String {
        self.inner.cursor_id()
    }

    pub fn series(&self) -> Vec<SeriesView> {
        self.inner
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|loaded| loaded.series.clone())
            .unwrap_or_default()
    }

    /// Upper bound of the y axis
    pub fn y_max(&self) -> Option<f64> {
        self.inner
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|loaded| loaded.y_max)
    }

    /// Toggle a series by name, as a legend click does, without emitting
    pub fn toggle_series(&self, scene: &Scene, name: &str) -> Option<SeriesView> {
        self.inner.toggle(scene, &sanitize_name(name))
    }

    /// Restrict the x axis to a date window; `None` restores the full range.
    /// The y axis is rescaled to the visible series.
    pub fn brush(&self, scene: &Scene, window: Option<(NaiveDate, NaiveDate)>) {
        let (full, y_max) = {
            let mut guard = self.inner.loaded.write().unwrap_or_else(PoisonError::into_inner);
            let Some(loaded) = guard.as_mut() else {
                return;
            };
            loaded.y_max = visible_max(&loaded.table, &loaded.series);
            (loaded.table.date_extent(), loaded.y_max)
        };

        set_x_domain(scene, &self.inner.x_axis_id(), window.or(full));
        set_y_max(scene, &self.inner.y_axis_id(), y_max);
    }

    fn attach_listeners(&self, scene: &Scene, series: &[SeriesView]) {
        for view in series {
            let legend_id = self.inner.legend_id(&view.param);

            let inner = Arc::clone(&self.inner);
            let param = view.param.clone();
            scene.on(&legend_id, "click", move |bus: &MessageBus, event: &DomEvent| {
                let Some(toggled) = inner.toggle(bus.scene(), &param) else {
                    return;
                };
                if let Some(template) = &inner.config.comm_msg {
                    let message = parse_comm_msg(template, &toggled.record());
                    bus.trigger_emit(&event.target, &message);
                }
            });

            let inner = Arc::clone(&self.inner);
            let param = view.param.clone();
            scene.on(&legend_id, "mouseover", move |bus: &MessageBus, event: &DomEvent| {
                let Some(view) = inner.series(&param) else {
                    return;
                };
                bus.scene().update(&event.target, |legend| {
                    legend.style.fill = Some(view.color.clone());
                });
                bus.scene().update(&inner.line_id(&param), |line| {
                    line.style.stroke_width = Some(HOVER_LINE_WIDTH);
                });
            });

            let inner = Arc::clone(&self.inner);
            let param = view.param.clone();
            scene.on(&legend_id, "mouseout", move |bus: &MessageBus, event: &DomEvent| {
                let Some(view) = inner.series(&param) else {
                    return;
                };
                bus.scene().update(&event.target, |legend| {
                    legend.style.fill = Some(view.legend_fill());
                });
                bus.scene().update(&inner.line_id(&param), |line| {
                    line.style.stroke_width = Some(LINE_WIDTH);
                });
            });
        }
    }
}

#[async_trait]
impl Widget for TimeseriesWidget {
    fn id(&self) -> &str {
        &self.inner.config.id
    }

    fn kind(&self) -> WidgetKind {
        WidgetKind::Timeseries
    }

    fn is_loaded(&self) -> bool {
        self.inner
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn load(&self, source: &dyn DataSource, bus: &MessageBus) -> Result<()> {
        let config = &self.inner.config;
        let path = config.data_file();
        let text = source
            .fetch(&path)
            .await
            .with_context(|| format!("Failed to load timeseries '{}'", config.id))?;
        let table = TimeseriesTable::parse(&text).with_context(|| format!("Invalid timeseries file {}", path))?;

        let series: Vec<SeriesView> = table
            .column_names()
            .enumerate()
            .map(|(i, name)| {
                let special = config.special.as_deref() == Some(name);
                SeriesView {
                    name: name.to_string(),
                    param: sanitize_name(name),
                    color: series_color(&config.colors, i),
                    visible: special,
                    special,
                }
            })
            .collect();

        // Initial y domain spans every series
        let y_max = table.columns.iter().filter_map(|c| c.max()).reduce(f64::max);

        let scene = bus.scene();
        scene.remove_group(&self.inner.group());
        self.inner.build_elements(scene, &table, &series, y_max);
        self.attach_listeners(scene, &series);

        info!(
            widget_id = %config.id,
            data_file = %path,
            series = series.len(),
            rows = table.len(),
            "Timeseries loaded"
        );

        *self.inner.loaded.write().unwrap_or_else(PoisonError::into_inner) = Some(Loaded {
            table,
            series,
            y_max,
        });
        Ok(())
    }

    fn update(&self, bus: &MessageBus, frame: TimeFrame) -> Result<(), WidgetError> {
        let (date, legends) = {
            let guard = self.inner.loaded.read().unwrap_or_else(PoisonError::into_inner);
            let loaded = guard
                .as_ref()
                .ok_or_else(|| WidgetError::not_loaded(&self.inner.config.id))?;
            let legends: Vec<String> = loaded
                .series
                .iter()
                .map(|s| self.inner.legend_id(&s.param))
                .collect();
            (loaded.table.dates.get(frame.position).copied(), legends)
        };

        for legend in &legends {
            bus.guards().reset(legend);
        }

        // Date cursor
        if let Some(date) = date {
            bus.scene().update(&self.inner.cursor_id(), |cursor| {
                cursor.attrs.insert("date".to_string(), date.to_string());
                cursor.position = Some((frame.position as f64, 0.0));
                cursor.style.hidden = false;
            });
        }

        Ok(())
    }
}
