// Integration tests: dashboards built from TOML configuration files over
// data read from disk or HTTP

use epidash::config::load_config;
use epidash::dashboard::{Dashboard, Playback};
use epidash::widgets::map::event_overlay_id;
use mockito::Server;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn nodes_json() -> String {
    json!([
        {
            "NodeLabel": "N1", "Latitude": -16.0, "Longitude": 27.0,
            "Population": 100,
            "Outbreak": {"time": true, "0": 1}
        },
        {
            "NodeLabel": "N2", "Latitude": -16.5, "Longitude": 27.5,
            "Population": {"time": true, "5": 50}
        }
    ])
    .to_string()
}

const MAP_WIDGET: &str = r#"
[[widgets]]
kind = "map"
id = "m"
data_file = "nodes.json"

[widgets.style]
node_attr_2_radius = ["Population", { type = "linear", domain = [0, 100], range = [0, 10] }]

[[widgets.style.node_events_2_img]]
attribute = "Outbreak"
scale = { type = "linear", domain = [0, 1], range = [0, 1] }
images = ["outbreak.png"]
"#;

/// Write the data files and a config reading them; returns the config path
fn write_fixture(dir: &Path, settings: &str, widgets: &str) -> std::path::PathBuf {
    std::fs::write(dir.join("nodes.json"), nodes_json()).unwrap();

    let config = format!(
        "[data]\ndirectory = {:?}\n\n{}\n{}",
        dir.display().to_string(),
        settings,
        widgets
    );
    let path = dir.join("dashboard.toml");
    std::fs::write(&path, config).unwrap();
    path
}

fn radius(dashboard: &Dashboard, id: &str) -> Option<f64> {
    dashboard.bus().scene().get(id).and_then(|e| e.style.radius)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_map_radius_from_scalar_and_temporal_population() {
    let dir = TempDir::new().unwrap();
    let widgets = MAP_WIDGET.replace("[widgets.style]", "[widgets.style]\ntime_idx = 5");
    let path = write_fixture(dir.path(), "[timeline]\ntimesteps = [0, 5]", &widgets);

    let dashboard = Dashboard::new(load_config(&path).unwrap());
    assert_eq!(dashboard.load_all().await, 1);

    // N1 is a scalar 100, N2 is 50 at t=5
    assert_eq!(radius(&dashboard, "n_N1_m"), Some(10.0));
    assert_eq!(radius(&dashboard, "n_N2_m"), Some(5.0));
}

#[tokio::test]
async fn test_animation_stops_after_l_minus_one_ticks() {
    let dir = TempDir::new().unwrap();
    let settings = "[animation]\ntick_millis = 1\n\n[timeline]\nstart = 0\ncount = 4";
    let path = write_fixture(dir.path(), settings, MAP_WIDGET);

    let dashboard = Dashboard::new(load_config(&path).unwrap());
    dashboard.load_all().await;

    tokio::time::timeout(Duration::from_secs(5), dashboard.animation().run())
        .await
        .expect("animation did not stop");

    let animation = dashboard.animation();
    assert_eq!(animation.playback(), Playback::Stopped);
    assert_eq!(animation.ticks(), 3);
    assert_eq!(dashboard.state().time_idx(), 3);

    // Not looping: nothing moves afterwards
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(animation.ticks(), 3);
    assert_eq!(dashboard.state().time_idx(), 3);
}

#[tokio::test]
async fn test_event_overlay_decays_across_frames() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(dir.path(), "[timeline]\nstart = 0\ncount = 30", MAP_WIDGET);

    let dashboard = Dashboard::new(load_config(&path).unwrap());
    dashboard.load_all().await;

    let overlay = event_overlay_id("Outbreak", "n_N1_m");
    let scene = dashboard.bus().scene();
    assert_eq!(scene.get(&overlay).unwrap().style.opacity, Some(1.0));

    for position in 1..=20 {
        dashboard.update_widgets(position);
        let expected = (20 - position) as f64 / 20.0;
        let opacity = scene.get(&overlay).unwrap().style.opacity.unwrap();
        assert!((opacity - expected).abs() < 1e-9, "position {}", position);
    }

    dashboard.update_widgets(21);
    assert!(!scene.contains(&overlay));
}

#[tokio::test]
async fn test_missing_data_keeps_dashboard_usable() {
    let dir = TempDir::new().unwrap();
    let widgets = format!(
        "{}\n[[widgets]]\nkind = \"slider\"\nid = \"s\"\ndata_file = \"missing.tsv\"\n",
        MAP_WIDGET
    );
    let path = write_fixture(dir.path(), "[timeline]\ntimesteps = [0, 5]", &widgets);

    let dashboard = Dashboard::new(load_config(&path).unwrap());
    assert_eq!(dashboard.load_all().await, 1);

    assert_eq!(dashboard.update_widgets(1).time, 5);
    assert_eq!(radius(&dashboard, "n_N2_m"), Some(5.0));
}

#[tokio::test]
async fn test_dashboard_over_http() {
    let mut server = Server::new_async().await;
    let _nodes = server
        .mock("GET", "/nodes.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(nodes_json())
        .create_async()
        .await;

    let text = format!(
        "[data]\nbase_url = {:?}\n\n[timeline]\ntimesteps = [5]\n{}",
        server.url(),
        MAP_WIDGET
    );
    let config = toml::from_str(&text).unwrap();

    let dashboard = Dashboard::new(config);
    assert_eq!(dashboard.source().name(), "http");
    assert_eq!(dashboard.load_all().await, 1);
    assert_eq!(dashboard.state().time_idx(), 5);
    assert_eq!(radius(&dashboard, "n_N2_m"), Some(5.0));
}
