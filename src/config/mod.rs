use crate::data::{DataSource, FsDataSource, HttpDataSource};
use crate::message::Message;
use crate::scale::{ColorScale, OR_RD_9};
use crate::state::SelectionState;
use crate::widgets::WidgetKind;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

// Widget configs live next to their widgets
pub use crate::widgets::{HeatmapConfig, MapConfig, ScatterConfig, SliderConfig, TimeseriesConfig};

/// Complete dashboard configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub animation: AnimationConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub timeline: TimelineConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub widgets: Vec<WidgetConfig>,
    /// Per-node charts, reloaded when the selected node changes
    #[serde(default)]
    pub node_charts: Option<NodeChartsConfig>,
}

/// Animation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AnimationConfig {
    /// Period of the animation tick (milliseconds)
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
}

fn default_tick_millis() -> u64 {
    125
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            tick_millis: default_tick_millis(),
        }
    }
}

/// Event overlay configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OverlayConfig {
    /// Updates an overlay survives after its event stops
    #[serde(default = "default_ttl_max")]
    pub ttl_max: u32,
}

fn default_ttl_max() -> u32 {
    crate::widgets::overlay::DEFAULT_TTL_MAX
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            ttl_max: default_ttl_max(),
        }
    }
}

/// Where data files come from
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Directory data file paths are relative to
    #[serde(default = "default_data_directory")]
    pub directory: PathBuf,

    /// When set, data files are fetched over HTTP from here instead
    #[serde(default)]
    pub base_url: Option<String>,

    /// Gazetteer catalog file (models and their selectable gazetteers)
    #[serde(default)]
    pub catalog: Option<String>,
}

fn default_data_directory() -> PathBuf {
    PathBuf::from(".")
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            directory: default_data_directory(),
            base_url: None,
            catalog: None,
        }
    }
}

impl DataConfig {
    /// Data source for this configuration
    pub fn source(&self) -> Arc<dyn DataSource> {
        match &self.base_url {
            Some(url) => Arc::new(HttpDataSource::new(url.as_str())),
            None => Arc::new(FsDataSource::new(self.directory.clone())),
        }
    }
}

/// Time keys the animation steps through
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimelineConfig {
    /// Explicit time keys, in playback order
    #[serde(default)]
    pub timesteps: Vec<i64>,

    /// First key of a contiguous range (used when `timesteps` is empty)
    #[serde(default)]
    pub start: Option<i64>,

    /// Length of the contiguous range
    #[serde(default)]
    pub count: usize,
}

impl TimelineConfig {
    pub fn timesteps(&self) -> Vec<i64> {
        if !self.timesteps.is_empty() {
            return self.timesteps.clone();
        }
        match self.start {
            Some(start) => (0..self.count as i64)
                .map_while(|i| start.checked_add(i))
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Initial selection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectionConfig {
    #[serde(default)]
    pub time_idx: i64,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub gazetteer: Option<String>,
}

impl SelectionConfig {
    pub fn initial_state(&self) -> SelectionState {
        SelectionState {
            time_idx: self.time_idx,
            node_select: self.node.clone(),
            gazetteer_select: self.gazetteer.clone(),
            ..Default::default()
        }
    }
}

/// One `[[widgets]]` entry, tagged by `kind`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WidgetConfig {
    Map(MapConfig),
    Scatter(ScatterConfig),
    Heatmap(HeatmapConfig),
    Timeseries(TimeseriesConfig),
    Slider(SliderConfig),
}

impl WidgetConfig {
    pub fn id(&self) -> &str {
        match self {
            WidgetConfig::Map(c) => &c.id,
            WidgetConfig::Scatter(c) => &c.id,
            WidgetConfig::Heatmap(c) => &c.id,
            WidgetConfig::Timeseries(c) => &c.id,
            WidgetConfig::Slider(c) => &c.id,
        }
    }

    pub fn kind(&self) -> WidgetKind {
        match self {
            WidgetConfig::Map(_) => WidgetKind::Map,
            WidgetConfig::Scatter(_) => WidgetKind::Scatter,
            WidgetConfig::Heatmap(_) => WidgetKind::Heatmap,
            WidgetConfig::Timeseries(_) => WidgetKind::Timeseries,
            WidgetConfig::Slider(_) => WidgetKind::Slider,
        }
    }
}

/// Charts drawn for the selected node
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeChartsConfig {
    #[serde(default)]
    pub heatmap: Option<NodeHeatmapConfig>,
    #[serde(default)]
    pub timeseries: Option<NodeTimeseriesConfig>,
}

/// Heatmap read from `hm_{node}.json`
#[derive(Debug, Clone, Deserialize)]
pub struct NodeHeatmapConfig {
    pub x_attr: String,
    pub y_attr: String,
    pub z_attr: String,
    #[serde(default = "default_heatmap_height")]
    pub height: f64,
    #[serde(default = "default_heatmap_colors")]
    pub color_scale: ColorScale,
}

fn default_heatmap_height() -> f64 {
    600.0
}

fn default_heatmap_colors() -> ColorScale {
    ColorScale::quantize([0.0, 1.0], &OR_RD_9)
}

impl NodeHeatmapConfig {
    /// Heatmap of `node`. Tile clicks highlight the series of the same
    /// parameters.
    pub fn for_node(&self, node: &str) -> HeatmapConfig {
        let mut config = HeatmapConfig::new(node, &self.x_attr, &self.y_attr, &self.z_attr);
        config.height = self.height;
        config.color_scale = self.color_scale.clone();
        config.comm_msg = Some(
            Message::call("emit_param_key_by_params")
                .param("event", "click")
                .param("x_attr", self.x_attr.as_str())
                .param("y_attr", self.y_attr.as_str())
                .requiring([self.x_attr.as_str(), self.y_attr.as_str()]),
        );
        config
    }
}

/// Time series read from `{prefix}_{node}.tsv`
#[derive(Debug, Clone, Deserialize)]
pub struct NodeTimeseriesConfig {
    #[serde(alias = "ts_type")]
    pub prefix: String,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub special: Option<String>,
}

impl NodeTimeseriesConfig {
    /// Time series of `node`. Legend clicks highlight the heatmap tile of
    /// the same parameters.
    pub fn for_node(&self, node: &str) -> TimeseriesConfig {
        let mut config = TimeseriesConfig::new(node, &self.prefix);
        if !self.colors.is_empty() {
            config.colors = self.colors.clone();
        }
        config.special = self.special.clone();
        config.comm_msg =
            Some(Message::call("style_selected_hm_param").requiring(["name", "ts_color"]));
        config
    }
}

impl DashboardConfig {
    /// Override settings from the environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override settings from `EPIDASH_*` variables looked up with `var`.
    /// Unparsable values are logged and ignored.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("EPIDASH_TICK_MILLIS") {
            match v.parse::<u64>() {
                Ok(n) => self.animation.tick_millis = n,
                Err(e) => warn!(value = %v, error = %e, "Ignoring invalid EPIDASH_TICK_MILLIS"),
            }
        }
        if let Some(v) = var("EPIDASH_DATA_DIR") {
            if !v.is_empty() {
                self.data.directory = PathBuf::from(v);
            }
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<DashboardConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: DashboardConfig = toml::from_str(&contents)
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    Ok(config)
}
