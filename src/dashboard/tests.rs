use super::commands::*;
use super::*;
use crate::config::{
    AnimationConfig, DataConfig, MapConfig, NodeChartsConfig, NodeHeatmapConfig, NodeTimeseriesConfig,
    SelectionConfig, SliderConfig, TimelineConfig, TimeseriesConfig,
};
use crate::data::MemoryDataSource;
use crate::entity::NODE_LABEL;
use crate::message::Message;
use crate::scale::{AttrBinding, ColorScale, NumericScale, OR_RD_9};
use crate::widgets::{HeatmapConfig, WidgetError, WidgetKind};
use serde_json::json;
use std::time::Duration;

const HOUR_MILLIS: u64 = 3_600_000;

const SLIDER_TSV: &str = "date\tprevalence\n\
20140101\t0.1\n\
20140108\t0.2\n\
20140115\t0.3\n";

const NODE_SERIES_TSV: &str = "date\tobserved\tbeta_0.1_gamma_1\tbeta_0.2_gamma_1\n\
20140101\t0.1\t0.3\t0.2\n\
20140108\tNaN\t0.5\t0.1\n\
20140115\t0.2\t0.4\t0.3\n";

fn nodes_json() -> String {
    json!([
        {"NodeLabel": "N1", "Latitude": -16.0, "Longitude": 27.0, "Population": 100},
        {"NodeLabel": "N2", "Latitude": -16.5, "Longitude": 27.5, "Population": {"time": true, "5": 50}}
    ])
    .to_string()
}

fn heatmap_json() -> String {
    json!({
        "points": [
            {"x_idx": 0, "y_idx": 0, "beta": 0.1, "gamma": 1, "zi": 1.0},
            {"x_idx": 1, "y_idx": 0, "beta": 0.2, "gamma": 1, "zi": 10.0},
            {"x_idx": 0, "y_idx": 1, "beta": 0.1, "gamma": 2, "zi": 100.0},
            {"x_idx": 1, "y_idx": 1, "beta": 0.2, "gamma": 2, "zi": 1000.0}
        ]
    })
    .to_string()
}

fn source() -> Arc<MemoryDataSource> {
    Arc::new(
        MemoryDataSource::new()
            .with_file("nodes.json", nodes_json())
            .with_file("prevalence.tsv", SLIDER_TSV)
            .with_file("hm_N1.json", heatmap_json())
            .with_file("prevalence_N1.tsv", NODE_SERIES_TSV),
    )
}

fn node_charts() -> NodeChartsConfig {
    NodeChartsConfig {
        heatmap: Some(NodeHeatmapConfig {
            x_attr: "beta".to_string(),
            y_attr: "gamma".to_string(),
            z_attr: "zi".to_string(),
            height: 600.0,
            color_scale: ColorScale::quantize([0.0, 1.0], &OR_RD_9),
        }),
        timeseries: Some(NodeTimeseriesConfig {
            prefix: "prevalence".to_string(),
            colors: Vec::new(),
            special: Some("observed".to_string()),
        }),
    }
}

fn config(timesteps: Vec<i64>) -> DashboardConfig {
    let mut map = MapConfig::new("m", "nodes.json");
    map.style.node_attr_2_radius = Some(AttrBinding::new(
        "Population",
        NumericScale::linear([0.0, 100.0], [0.0, 10.0]),
    ));
    map.comm_msg = Some(Message::call(LOAD_NODE_CHARTS).requiring([NODE_LABEL]));

    DashboardConfig {
        animation: AnimationConfig {
            tick_millis: HOUR_MILLIS,
        },
        timeline: TimelineConfig {
            timesteps,
            ..Default::default()
        },
        widgets: vec![WidgetConfig::Map(map)],
        node_charts: Some(node_charts()),
        ..Default::default()
    }
}

/// Dashboard over the in-memory files with a slider wired to `update_widgets`
async fn loaded_dashboard() -> (Dashboard, Arc<SliderWidget>) {
    let dashboard = Dashboard::with_source(config(vec![0, 5, 10]), source());

    let mut slider_config = SliderConfig::new("s", "prevalence.tsv");
    slider_config.comm_msg = Some(Message::call(UPDATE_WIDGETS).requiring(["time"]));
    let slider = Arc::new(SliderWidget::new(slider_config));
    dashboard.add_widget(slider.clone());

    assert_eq!(dashboard.load_all().await, 2);
    (dashboard, slider)
}

fn radius(dashboard: &Dashboard, id: &str) -> Option<f64> {
    dashboard.bus().scene().get(id).and_then(|e| e.style.radius)
}

fn fill(dashboard: &Dashboard, id: &str) -> Option<String> {
    dashboard.bus().scene().get(id).and_then(|e| e.style.fill)
}

fn timeseries(dashboard: &Dashboard, node: &str) -> Arc<dyn Widget> {
    dashboard
        .registry()
        .get(WidgetKind::Timeseries, node)
        .expect("timeseries registered")
}

/// Visibility of a node series, read off its legend fill
fn series_visible(dashboard: &Dashboard, node: &str, name: &str) -> bool {
    let legend = format!("{}-legend-{}", node, name);
    fill(dashboard, &legend).as_deref() != Some(crate::widgets::timeseries::INACTIVE_COLOR)
}

async fn wait_for<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[test]
fn test_timeline_frames() {
    let timeline = Timeline::new(vec![0, 5, 10]);
    assert_eq!(timeline.len(), 3);
    assert_eq!(timeline.frame(1), TimeFrame::new(1, 5));
    assert_eq!(timeline.position_of(10), Some(2));
    assert_eq!(timeline.position_of(7), None);
    assert_eq!(timeline.last_position(), 2);

    // Positions past the end show the last timestep
    assert_eq!(timeline.frame(7), TimeFrame::new(2, 10));

    // Without timesteps positions are time keys
    let empty = Timeline::default();
    assert!(empty.is_empty());
    assert_eq!(empty.frame(7), TimeFrame::new(7, 7));
    assert_eq!(empty.last_position(), 0);
}

#[tokio::test]
async fn test_registry_keys_by_kind_and_id() {
    let registry = WidgetRegistry::new();
    let bus = MessageBus::new();

    assert!(registry
        .register(Arc::new(SliderWidget::new(SliderConfig::new("N1", "a.tsv"))))
        .is_none());
    let replaced = registry.register(Arc::new(SliderWidget::new(SliderConfig::new("N1", "b.tsv"))));
    assert!(replaced.is_some());
    assert_eq!(registry.len(), 1);

    // Same id, different kind
    registry.register(Arc::new(HeatmapWidget::new(HeatmapConfig::new("N1", "beta", "gamma", "zi"))));
    assert_eq!(registry.len(), 2);
    assert!(registry.get(WidgetKind::Heatmap, "N1").is_some());

    assert_eq!(
        registry.update(WidgetKind::Map, "N1", &bus, TimeFrame::new(0, 0)),
        Err(WidgetError::UnknownWidget("N1".to_string()))
    );

    // Nothing is loaded yet
    assert_eq!(registry.update_all(&bus, TimeFrame::new(0, 0)), 0);

    assert!(registry.remove(WidgetKind::Slider, "N1").is_some());
    assert!(registry.remove(WidgetKind::Slider, "N1").is_none());
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_load_all_renders_first_frame() {
    let (dashboard, slider) = loaded_dashboard().await;

    assert_eq!(dashboard.state().time_idx(), 0);
    assert_eq!(radius(&dashboard, "n_N1_m"), Some(10.0));
    assert_eq!(slider.position(dashboard.bus().scene()), Some(0));
}

#[tokio::test]
async fn test_missing_file_leaves_widget_unloaded() {
    let dashboard = Dashboard::with_source(config(vec![0, 5]), Arc::new(MemoryDataSource::new()));

    assert_eq!(dashboard.load_all().await, 0);
    assert!(!dashboard.registry().get(WidgetKind::Map, "m").unwrap().is_loaded());
    assert!(dashboard.bus().scene().is_empty());
}

#[tokio::test]
async fn test_slider_drag_updates_widgets() {
    let (dashboard, slider) = loaded_dashboard().await;

    assert_eq!(slider.drag(dashboard.bus(), 1.2).unwrap(), 1);
    assert_eq!(dashboard.state().time_idx(), 5);
    assert_eq!(radius(&dashboard, "n_N2_m"), Some(5.0));

    slider.drag(dashboard.bus(), 9.0).unwrap();
    assert_eq!(dashboard.state().time_idx(), 10);
    assert_eq!(slider.position(dashboard.bus().scene()), Some(2));
    assert_eq!(dashboard.bus().guards().armed_count(), 0);
}

#[tokio::test]
async fn test_select_time_command() {
    let (dashboard, slider) = loaded_dashboard().await;
    let bus = dashboard.bus();

    bus.emit(&Message::call(SELECT_TIME).on("call").param("time_idx", 5));
    assert_eq!(dashboard.state().time_idx(), 5);
    assert_eq!(slider.position(bus.scene()), Some(1));

    // Negative positions are rejected and change nothing
    bus.emit(&Message::call(UPDATE_WIDGETS).on("call").param("time", -1));
    assert_eq!(dashboard.state().time_idx(), 5);

    assert_eq!(dashboard.update_widgets(2), TimeFrame::new(2, 10));
    assert_eq!(dashboard.select_time(0), TimeFrame::new(0, 0));
    assert_eq!(dashboard.state().time_idx(), 0);
}

#[tokio::test]
async fn test_update_widgets_past_last_step() {
    let (dashboard, slider) = loaded_dashboard().await;
    let bus = dashboard.bus();

    bus.emit(&Message::call(UPDATE_WIDGETS).on("call").param("time", 7));
    assert_eq!(dashboard.state().time_idx(), 10);
    assert_eq!(slider.position(bus.scene()), Some(2));
    assert_eq!(slider.len(), Some(3));
    assert_eq!(radius(&dashboard, "n_N2_m"), Some(5.0));
}

#[tokio::test]
async fn test_render_waits_for_running_render() {
    let (dashboard, slider) = loaded_dashboard().await;
    let controller = dashboard.controller().clone();

    let running = controller.lock_render();
    let render = std::thread::spawn({
        let controller = controller.clone();
        let bus = Arc::clone(dashboard.bus());
        move || controller.render(&bus, 2)
    });

    std::thread::sleep(Duration::from_millis(50));
    assert!(!render.is_finished());
    assert_eq!(dashboard.state().time_idx(), 0);
    assert_eq!(slider.position(dashboard.bus().scene()), Some(0));

    drop(running);
    assert_eq!(render.join().unwrap(), TimeFrame::new(2, 10));
    assert_eq!(dashboard.state().time_idx(), 10);
    assert_eq!(slider.position(dashboard.bus().scene()), Some(2));
}

#[tokio::test]
async fn test_load_node_charts_highlights_node() {
    let (dashboard, _slider) = loaded_dashboard().await;
    let bus = dashboard.bus();
    let scene = bus.scene();

    dashboard.state().toggle_param("beta_0.1_gamma_1", Vec::new);

    bus.dispatch("n_N1_m", "mouseover");
    assert_eq!(dashboard.state().node_select().as_deref(), Some("N1"));
    assert!(dashboard.state().params_select().is_empty());

    let n1 = scene.get("n_N1_m").unwrap();
    assert_eq!(n1.style.stroke.as_deref(), Some("black"));
    assert_eq!(n1.style.stroke_width, Some(2.0));
    assert!(bus.blacklist().is_empty());
    assert_eq!(bus.guards().armed_count(), 0);

    bus.dispatch("n_N2_m", "mouseover");
    assert_eq!(dashboard.state().node_select().as_deref(), Some("N2"));

    let n1 = scene.get("n_N1_m").unwrap();
    assert_eq!(n1.style.stroke.as_deref(), Some(crate::widgets::NO_DATA_COLOR));
    assert_eq!(n1.style.stroke_width, None);
    assert_eq!(scene.get("n_N2_m").unwrap().style.stroke_width, Some(2.0));

    // Selecting the same node again changes nothing
    let mut changes = dashboard.state().subscribe();
    bus.emit(&Message::call(LOAD_NODE_CHARTS).on("call").param(NODE_LABEL, "N2"));
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn test_node_charts_swap_with_selection() {
    let (dashboard, _slider) = loaded_dashboard().await;
    let charts = dashboard.node_charts();
    let scene = dashboard.bus().scene();

    let loaded = charts
        .show("N1", dashboard.controller(), dashboard.bus(), dashboard.source().as_ref())
        .await;
    assert_eq!(loaded, 2);
    assert_eq!(charts.node().as_deref(), Some("N1"));
    assert!(dashboard.registry().get(WidgetKind::Heatmap, "N1").is_some_and(|w| w.is_loaded()));
    assert!(timeseries(&dashboard, "N1").is_loaded());
    assert!(scene.contains("hm_N1_0_0"));

    // The new charts follow later frames
    dashboard.update_widgets(1);
    let cursor = scene.get("N1-date-cursor").unwrap();
    assert_eq!(cursor.attr("date"), Some("2014-01-08"));

    // N2 has no chart files
    let loaded = charts
        .show("N2", dashboard.controller(), dashboard.bus(), dashboard.source().as_ref())
        .await;
    assert_eq!(loaded, 0);
    assert_eq!(charts.node().as_deref(), Some("N2"));
    assert!(!scene.contains("hm_N1_0_0"));
    assert!(dashboard.registry().get(WidgetKind::Heatmap, "N1").is_none());
    assert!(dashboard.registry().get(WidgetKind::Heatmap, "N2").is_some());

    charts.clear(dashboard.controller(), dashboard.bus());
    assert_eq!(charts.node(), None);
    assert!(dashboard.registry().get(WidgetKind::Heatmap, "N2").is_none());
}

#[tokio::test]
async fn test_selection_loader_loads_node_charts() {
    let (dashboard, _slider) = loaded_dashboard().await;
    let loader = dashboard.spawn_selection_loader();

    dashboard.bus().dispatch("n_N1_m", "mouseover");

    let registry = Arc::clone(dashboard.registry());
    wait_for(|| {
        registry
            .get(WidgetKind::Heatmap, "N1")
            .is_some_and(|w| w.is_loaded())
    })
    .await;
    assert_eq!(dashboard.node_charts().node().as_deref(), Some("N1"));

    loader.abort();
}

#[tokio::test]
async fn test_load_all_shows_initially_selected_node() {
    let mut config = config(vec![0, 5, 10]);
    config.selection = SelectionConfig {
        node: Some("N1".to_string()),
        ..Default::default()
    };
    let dashboard = Dashboard::with_source(config, source());

    dashboard.load_all().await;
    assert_eq!(dashboard.node_charts().node().as_deref(), Some("N1"));
    assert!(timeseries(&dashboard, "N1").is_loaded());
}

#[tokio::test]
async fn test_legend_click_styles_heatmap_tiles() {
    let (dashboard, _slider) = loaded_dashboard().await;
    dashboard
        .node_charts()
        .show("N1", dashboard.controller(), dashboard.bus(), dashboard.source().as_ref())
        .await;
    let bus = dashboard.bus();

    let original = fill(&dashboard, "hm_N1_0_0");
    assert!(original.is_some());

    bus.dispatch("N1-legend-beta_0.1_gamma_1", "click");
    assert!(series_visible(&dashboard, "N1", "beta_0.1_gamma_1"));
    assert_eq!(fill(&dashboard, "hm_N1_0_0").as_deref(), Some("#1f78b4"));
    // Other tiles keep their colour
    assert_ne!(fill(&dashboard, "hm_N1_1_0").as_deref(), Some("#1f78b4"));

    let params = dashboard.state().params_select();
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].class_name, "beta_0.1_gamma_1");
    assert_eq!(params[0].fill, vec![("hm_N1_0_0".to_string(), original.clone())]);

    bus.dispatch("N1-legend-beta_0.1_gamma_1", "click");
    assert!(!series_visible(&dashboard, "N1", "beta_0.1_gamma_1"));
    assert_eq!(fill(&dashboard, "hm_N1_0_0"), original);
    assert!(!dashboard.state().params_select()[0].toggled);
}

#[tokio::test]
async fn test_heatmap_click_toggles_matching_series() {
    let (dashboard, _slider) = loaded_dashboard().await;
    dashboard
        .node_charts()
        .show("N1", dashboard.controller(), dashboard.bus(), dashboard.source().as_ref())
        .await;
    let bus = dashboard.bus();
    let original = fill(&dashboard, "hm_N1_1_0");

    bus.dispatch("hm_N1_1_0", "click");
    assert!(series_visible(&dashboard, "N1", "beta_0.2_gamma_1"));
    assert!(!series_visible(&dashboard, "N1", "beta_0.1_gamma_1"));

    // The legend was reached by the tile's message, so it does not emit again
    assert_eq!(fill(&dashboard, "hm_N1_1_0"), original);
    assert!(dashboard.state().params_select().is_empty());
    assert_eq!(bus.guards().armed_count(), 0);
}

#[tokio::test]
async fn test_emit_param_key_by_header() {
    let (dashboard, _slider) = loaded_dashboard().await;
    dashboard
        .node_charts()
        .show("N1", dashboard.controller(), dashboard.bus(), dashboard.source().as_ref())
        .await;
    let bus = dashboard.bus();

    bus.emit(
        &Message::call(EMIT_PARAM_KEY_BY_HEADER)
            .on("call")
            .param("name", "beta_0.2_gamma_1")
            .param("event", "click"),
    );
    assert!(series_visible(&dashboard, "N1", "beta_0.2_gamma_1"));

    // Without a name nothing is sent
    bus.guards().reset_all();
    bus.emit(&Message::call(EMIT_PARAM_KEY_BY_HEADER).on("call"));
    assert!(series_visible(&dashboard, "N1", "beta_0.2_gamma_1"));
}

#[tokio::test]
async fn test_emit_param_key_by_params() {
    let (dashboard, _slider) = loaded_dashboard().await;
    dashboard
        .node_charts()
        .show("N1", dashboard.controller(), dashboard.bus(), dashboard.source().as_ref())
        .await;

    dashboard.bus().emit(
        &Message::call(EMIT_PARAM_KEY_BY_PARAMS)
            .on("call")
            .param("x_attr", "beta")
            .param("y_attr", "gamma")
            .param("beta", 0.1)
            .param("gamma", 1),
    );
    assert!(series_visible(&dashboard, "N1", "beta_0.1_gamma_1"));
}

#[tokio::test]
async fn test_select_gazetteer_reloads_maps_only() {
    let files = source();
    files.insert(
        "catalog.json",
        json!([
            {"model": "model_a", "params": "", "select": [{"value": "Munumbwe", "name": "Munumbwe HFCA"}]}
        ])
        .to_string(),
    );
    files.insert(
        "Munumbwe_nodes.json",
        json!([{"NodeLabel": "N9", "Latitude": -16.2, "Longitude": 27.1, "Population": 40}]).to_string(),
    );

    let mut config = config(vec![0, 5, 10]);
    config.data = DataConfig {
        catalog: Some("catalog.json".to_string()),
        ..Default::default()
    };
    files.insert("prevalence_top.tsv", NODE_SERIES_TSV);
    let dashboard = Dashboard::with_source(config, files);
    dashboard.add_widget(Arc::new(TimeseriesWidget::new(TimeseriesConfig::new("top", "prevalence"))));
    assert_eq!(dashboard.load_all().await, 2);
    assert_eq!(dashboard.catalog().len(), 1);

    dashboard.bus().dispatch("top-legend-beta_0.1_gamma_1", "click");
    assert!(series_visible(&dashboard, "top", "beta_0.1_gamma_1"));

    let loader = dashboard.spawn_selection_loader();
    dashboard
        .bus()
        .emit(&Message::call(SELECT_GAZETTEER).on("call").param("value", "Munumbwe"));

    assert_eq!(dashboard.state().gazetteer_select().as_deref(), Some("Munumbwe"));
    assert_eq!(dashboard.state().gazetteer_model().as_deref(), Some("model_a"));

    let scene = dashboard.bus().shared_scene();
    wait_for(|| scene.get("n_N9_m").and_then(|e| e.style.radius) == Some(4.0)).await;
    assert!(!scene.contains("n_N1_m"));

    // The time series does not depend on the gazetteer and keeps its toggles
    assert!(series_visible(&dashboard, "top", "beta_0.1_gamma_1"));

    loader.abort();
}

#[tokio::test]
async fn test_animation_stops_after_last_step() {
    let dashboard = Dashboard::with_source(config(vec![0, 5, 10, 15, 20]), source());
    dashboard.load_all().await;
    let animation = dashboard.animation();

    assert_eq!(animation.play(), Playback::Playing);
    assert_eq!(animation.position(), 0);

    for _ in 0..3 {
        assert_eq!(animation.tick(), Playback::Playing);
    }
    assert_eq!(animation.tick(), Playback::Stopped);
    assert_eq!(animation.ticks(), 4);
    assert_eq!(dashboard.state().time_idx(), 20);

    // Ticks after the end do nothing
    assert_eq!(animation.tick(), Playback::Stopped);
    assert_eq!(animation.ticks(), 4);

    // A completed run starts over
    assert_eq!(animation.play(), Playback::Playing);
    assert_eq!(animation.position(), 0);
    assert_eq!(dashboard.state().time_idx(), 0);
    animation.pause();
}

#[tokio::test]
async fn test_animation_pause_and_resume() {
    let dashboard = Dashboard::with_source(config(vec![0, 5, 10, 15]), source());
    dashboard.load_all().await;
    let animation = dashboard.animation();

    animation.play();
    animation.tick();
    assert_eq!(animation.pause(), Playback::Stopped);
    assert_eq!(animation.last_paused_time(), 1);
    assert_eq!(dashboard.state().time_idx(), 5);

    assert_eq!(animation.tick(), Playback::Stopped);
    assert_eq!(animation.position(), 1);

    assert_eq!(animation.play(), Playback::Playing);
    assert_eq!(animation.position(), 1);
    assert_eq!(animation.ticks(), 0);
    animation.tick();
    assert_eq!(dashboard.state().time_idx(), 10);
    animation.pause();
}

#[tokio::test]
async fn test_animation_run_with_timer() {
    let mut config = config(vec![0, 1, 2, 3, 4, 5]);
    config.animation.tick_millis = 1;
    let dashboard = Dashboard::with_source(config, source());
    dashboard.load_all().await;

    tokio::time::timeout(Duration::from_secs(5), dashboard.animation().run())
        .await
        .expect("animation did not finish");

    assert_eq!(dashboard.animation().playback(), Playback::Stopped);
    assert_eq!(dashboard.animation().ticks(), 5);
    assert_eq!(dashboard.state().time_idx(), 5);
}

#[tokio::test]
async fn test_single_step_timeline_does_not_play() {
    let dashboard = Dashboard::with_source(config(vec![7]), source());
    dashboard.load_all().await;

    assert_eq!(dashboard.animation().play(), Playback::Stopped);
    assert_eq!(dashboard.state().time_idx(), 7);
    assert_eq!(dashboard.animation().ticks(), 0);
}
