use super::{load_widgets, Controller};
use crate::bus::MessageBus;
use crate::config::NodeChartsConfig;
use crate::data::DataSource;
use crate::widgets::{HeatmapWidget, TimeseriesWidget, Widget, WidgetKind};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Charts currently drawn for a node
struct ShownCharts {
    node: String,
    widgets: Vec<(WidgetKind, String)>,
    groups: Vec<String>,
}

/// Swaps the per-node heatmap and time series when the selection changes
pub struct NodeChartLoader {
    config: Option<NodeChartsConfig>,
    shown: Mutex<Option<ShownCharts>>,
}

impl NodeChartLoader {
    pub fn new(config: Option<NodeChartsConfig>) -> Self {
        Self {
            config,
            shown: Mutex::new(None),
        }
    }

    /// Node whose charts are drawn
    pub fn node(&self) -> Option<String> {
        self.shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|shown| shown.node.clone())
    }

    /// Remove the charts of the previous node and load those of `node`.
    /// Returns how many charts loaded.
    pub async fn show(
        &self,
        node: &str,
        controller: &Controller,
        bus: &MessageBus,
        source: &dyn DataSource,
    ) -> usize {
        let Some(config) = &self.config else {
            debug!(node = %node, "No node charts configured");
            return 0;
        };

        self.clear(controller, bus);

        let mut widgets: Vec<Arc<dyn Widget>> = Vec::new();
        let mut groups = Vec::new();

        if let Some(template) = &config.heatmap {
            let heatmap = HeatmapWidget::new(template.for_node(node));
            groups.push(heatmap.group());
            widgets.push(Arc::new(heatmap));
        }
        if let Some(template) = &config.timeseries {
            let timeseries = TimeseriesWidget::new(template.for_node(node));
            groups.push(timeseries.group());
            widgets.push(Arc::new(timeseries));
        }

        for widget in &widgets {
            controller.registry().register(Arc::clone(widget));
        }
        *self.shown.lock().unwrap_or_else(PoisonError::into_inner) = Some(ShownCharts {
            node: node.to_string(),
            widgets: widgets
                .iter()
                .map(|w| (w.kind(), w.id().to_string()))
                .collect(),
            groups,
        });

        let loaded = load_widgets(&widgets, source, bus).await;

        let _render = controller.lock_render();
        let frame = controller.current_frame();
        for widget in widgets.iter().filter(|w| w.is_loaded()) {
            if let Err(e) = widget.update(bus, frame) {
                warn!(widget_id = %widget.id(), error = %e, "Node chart update failed");
            }
        }

        info!(node = %node, charts = loaded, "Node charts loaded");
        loaded
    }

    /// Remove the charts of the current node
    pub fn clear(&self, controller: &Controller, bus: &MessageBus) {
        let Some(shown) = self.shown.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return;
        };

        for (kind, id) in &shown.widgets {
            controller.registry().remove(*kind, id);
        }
        for group in &shown.groups {
            bus.scene().remove_group(group);
        }
        debug!(node = %shown.node, "Node charts removed");
    }
}
