// Dashboard controller: widget registry, frame rendering, built-in commands
// and the selection-driven chart loader

pub mod animation;
pub mod commands;
mod node_charts;
mod registry;

pub use animation::{Animation, Playback};
pub use node_charts::NodeChartLoader;
pub use registry::{Timeline, WidgetRegistry};

use crate::bus::MessageBus;
use crate::config::{DashboardConfig, WidgetConfig};
use crate::data::{parse_catalog, CatalogEntry, DataSource};
use crate::state::{DashboardState, SelectionField};
use crate::widgets::{
    HeatmapWidget, MapWidget, ScatterWidget, SliderWidget, TimeFrame, TimeseriesWidget, Widget,
};
use anyhow::{Context, Result};
use futures::future::join_all;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[cfg(test)]
mod tests;

/// Renders frames: resolves a timeline position to a time key, records it
/// in the state and updates every loaded widget. Renders never overlap:
/// each one holds the render lock until its last widget is restyled.
#[derive(Clone)]
pub struct Controller {
    state: Arc<DashboardState>,
    registry: Arc<WidgetRegistry>,
    timeline: Arc<Timeline>,
    render_lock: Arc<Mutex<()>>,
}

impl Controller {
    pub fn new(state: Arc<DashboardState>, registry: Arc<WidgetRegistry>, timeline: Timeline) -> Self {
        Self {
            state,
            registry,
            timeline: Arc::new(timeline),
            render_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Exclusive access to widget updates. Not reentrant: never call a
    /// render while holding it.
    pub fn lock_render(&self) -> MutexGuard<'_, ()> {
        self.render_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> &Arc<DashboardState> {
        &self.state
    }

    pub fn registry(&self) -> &Arc<WidgetRegistry> {
        &self.registry
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    fn position_for(&self, time: i64) -> usize {
        match self.timeline.position_of(time) {
            Some(position) => position,
            None if self.timeline.is_empty() => time.max(0) as usize,
            None => 0,
        }
    }

    /// Frame of the selected time key; the first timestep when the key is
    /// not on the timeline
    pub fn current_frame(&self) -> TimeFrame {
        let time = self.state.time_idx();
        match self.timeline.position_of(time) {
            Some(position) => TimeFrame::new(position, time),
            None if self.timeline.is_empty() => TimeFrame::new(self.position_for(time), time),
            None => self.timeline.frame(0),
        }
    }

    /// Update every loaded widget to `frame`. Returns how many were updated.
    pub fn render_frame(&self, bus: &MessageBus, frame: TimeFrame) -> usize {
        let _render = self.lock_render();
        if self.state.time_idx() != frame.time {
            self.state.set_time_idx(frame.time);
        }
        let updated = self.registry.update_all(bus, frame);
        debug!(
            position = frame.position,
            time = frame.time,
            widgets = updated,
            "Frame rendered"
        );
        updated
    }

    /// Render the frame at a timeline position
    pub fn render(&self, bus: &MessageBus, position: usize) -> TimeFrame {
        let frame = self.timeline.frame(position);
        self.render_frame(bus, frame);
        frame
    }

    /// Render a time key
    pub fn render_time(&self, bus: &MessageBus, time: i64) -> TimeFrame {
        let frame = TimeFrame::new(self.position_for(time), time);
        self.render_frame(bus, frame);
        frame
    }

    pub fn render_current(&self, bus: &MessageBus) -> TimeFrame {
        let frame = self.current_frame();
        self.render_frame(bus, frame);
        frame
    }
}

/// Build the widget described by a `[[widgets]]` entry
pub fn build_widget(config: &WidgetConfig, state: &Arc<DashboardState>, ttl_max: u32) -> Arc<dyn Widget> {
    match config.clone() {
        WidgetConfig::Map(c) => Arc::new(MapWidget::new(c, Arc::clone(state)).with_ttl_max(ttl_max)),
        WidgetConfig::Scatter(c) => Arc::new(ScatterWidget::new(c, Arc::clone(state))),
        WidgetConfig::Heatmap(c) => Arc::new(HeatmapWidget::new(c)),
        WidgetConfig::Timeseries(c) => Arc::new(TimeseriesWidget::new(c)),
        WidgetConfig::Slider(c) => Arc::new(SliderWidget::new(c)),
    }
}

/// Load widgets concurrently. Failures are logged and leave the widget
/// unloaded. Returns how many loaded.
pub async fn load_widgets(widgets: &[Arc<dyn Widget>], source: &dyn DataSource, bus: &MessageBus) -> usize {
    let results = join_all(widgets.iter().map(|widget| widget.load(source, bus))).await;

    let mut loaded = 0;
    for (widget, result) in widgets.iter().zip(results) {
        match result {
            Ok(()) => loaded += 1,
            Err(e) => error!(
                widget_id = %widget.id(),
                kind = %widget.kind(),
                error = %format!("{:#}", e),
                "Widget failed to load"
            ),
        }
    }
    loaded
}

/// The dashboard: shared state, message bus, widgets and animation
pub struct Dashboard {
    controller: Controller,
    bus: Arc<MessageBus>,
    source: Arc<dyn DataSource>,
    /// Widgets declared in the configuration (node charts excluded)
    widgets: Arc<RwLock<Vec<Arc<dyn Widget>>>>,
    catalog: Arc<RwLock<Vec<CatalogEntry>>>,
    catalog_file: Option<String>,
    node_charts: Arc<NodeChartLoader>,
    animation: Animation,
    ttl_max: u32,
}

impl Dashboard {
    /// Dashboard reading data from the configured directory or URL
    pub fn new(config: DashboardConfig) -> Self {
        let source = config.data.source();
        Self::with_source(config, source)
    }

    pub fn with_source(config: DashboardConfig, source: Arc<dyn DataSource>) -> Self {
        let state = Arc::new(DashboardState::new(config.selection.initial_state()));
        let registry = Arc::new(WidgetRegistry::new());
        let controller = Controller::new(state, registry, Timeline::new(config.timeline.timesteps()));
        let bus = Arc::new(MessageBus::new());
        let catalog = Arc::new(RwLock::new(Vec::new()));

        commands::register_builtin(&bus, &controller, Arc::clone(&catalog));

        let animation = Animation::new(
            controller.clone(),
            Arc::clone(&bus),
            Duration::from_millis(config.animation.tick_millis),
        );

        let dashboard = Self {
            controller,
            bus,
            source,
            widgets: Arc::new(RwLock::new(Vec::new())),
            catalog,
            catalog_file: config.data.catalog.clone(),
            node_charts: Arc::new(NodeChartLoader::new(config.node_charts.clone())),
            animation,
            ttl_max: config.overlay.ttl_max,
        };

        for widget in &config.widgets {
            dashboard.add_widget(build_widget(widget, dashboard.state(), dashboard.ttl_max));
        }

        info!(
            widgets = config.widgets.len(),
            timesteps = dashboard.timeline().len(),
            source = dashboard.source.name(),
            "Dashboard created"
        );
        dashboard
    }

    pub fn state(&self) -> &Arc<DashboardState> {
        self.controller.state()
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<WidgetRegistry> {
        self.controller.registry()
    }

    pub fn timeline(&self) -> &Timeline {
        self.controller.timeline()
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn animation(&self) -> &Animation {
        &self.animation
    }

    pub fn node_charts(&self) -> &NodeChartLoader {
        &self.node_charts
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    /// Register a widget; it is loaded by the next `load_all`
    pub fn add_widget(&self, widget: Arc<dyn Widget>) {
        self.registry().register(Arc::clone(&widget));

        let mut widgets = self.widgets.write().unwrap_or_else(PoisonError::into_inner);
        widgets.retain(|w| !(w.kind() == widget.kind() && w.id() == widget.id()));
        widgets.push(widget);
    }

    /// Catalog of gazetteers, once loaded
    pub fn catalog(&self) -> Vec<CatalogEntry> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn load_catalog(&self) -> Result<()> {
        let Some(path) = &self.catalog_file else {
            return Ok(());
        };
        let text = self
            .source
            .fetch(path)
            .await
            .with_context(|| format!("Failed to load gazetteer catalog {}", path))?;
        let entries = parse_catalog(&text).with_context(|| format!("Invalid gazetteer catalog {}", path))?;

        info!(catalog = %path, entries = entries.len(), "Gazetteer catalog loaded");
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = entries;
        Ok(())
    }

    /// Load every configured widget (and the catalog, if any) concurrently,
    /// then render the current frame and the charts of the selected node.
    /// Returns how many widgets loaded.
    pub async fn load_all(&self) -> usize {
        let widgets = self.widgets.read().unwrap_or_else(PoisonError::into_inner).clone();

        let (loaded, catalog) = tokio::join!(
            load_widgets(&widgets, self.source.as_ref(), &self.bus),
            self.load_catalog()
        );
        if let Err(e) = catalog {
            error!(error = %format!("{:#}", e), "Gazetteer catalog unavailable");
        }

        self.controller.render_current(&self.bus);

        if let Some(node) = self.state().node_select() {
            self.node_charts
                .show(&node, &self.controller, &self.bus, self.source.as_ref())
                .await;
        }

        info!(loaded = loaded, total = widgets.len(), "Dashboard loaded");
        loaded
    }

    /// Render the frame at a timeline position
    pub fn update_widgets(&self, position: usize) -> TimeFrame {
        self.controller.render(&self.bus, position)
    }

    /// Render a time key
    pub fn select_time(&self, time: i64) -> TimeFrame {
        self.controller.render_time(&self.bus, time)
    }

    /// Spawn the task that reacts to selection changes: a new node gets its
    /// charts loaded, a new gazetteer reloads the maps and scatter plots.
    pub fn spawn_selection_loader(&self) -> JoinHandle<()> {
        let mut changes = self.state().subscribe();
        let controller = self.controller.clone();
        let bus = Arc::clone(&self.bus);
        let source = Arc::clone(&self.source);
        let widgets = Arc::clone(&self.widgets);
        let node_charts = Arc::clone(&self.node_charts);

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => match change.field {
                        SelectionField::Node => {
                            if let Value::String(node) = &change.new_value {
                                node_charts.show(node, &controller, &bus, source.as_ref()).await;
                            }
                        }
                        SelectionField::Gazetteer => {
                            let widgets: Vec<Arc<dyn Widget>> = widgets
                                .read()
                                .unwrap_or_else(PoisonError::into_inner)
                                .iter()
                                .filter(|w| w.follows_gazetteer())
                                .cloned()
                                .collect();
                            let loaded = load_widgets(&widgets, source.as_ref(), &bus).await;
                            controller.render_current(&bus);
                            info!(gazetteer = %change.new_value, loaded = loaded, "Widgets reloaded");

                            if let Some(node) = controller.state().node_select() {
                                node_charts.show(&node, &controller, &bus, source.as_ref()).await;
                            }
                        }
                        SelectionField::TimeIdx | SelectionField::Params => {}
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Selection loader lagged, skipped changes");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        error!("Selection broadcast channel closed");
                        break;
                    }
                }
            }
        })
    }
}
