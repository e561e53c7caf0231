use anyhow::Result;
use epidash::config::load_config;
use epidash::dashboard::Dashboard;
use tracing::{info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "epidash=info".into()),
        )
        .init();

    info!("Epidash starting...");

    let config_path =
        std::env::var("EPIDASH_CONFIG").unwrap_or_else(|_| "dashboard.toml".to_string());
    let mut config = load_config(&config_path)?;
    config.apply_env();

    info!(
        config = %config_path,
        widgets = config.widgets.len(),
        tick_millis = config.animation.tick_millis,
        data_dir = %config.data.directory.display(),
        "Configuration loaded"
    );

    let dashboard = Dashboard::new(config);
    let selection_loader = dashboard.spawn_selection_loader();

    let loaded = dashboard.load_all().await;
    if loaded == 0 {
        warn!("No widget loaded, check the data directory");
    }

    // Play the timeline once, or until interrupted
    tokio::select! {
        _ = dashboard.animation().run() => {
            info!(
                ticks = dashboard.animation().ticks(),
                time_idx = dashboard.state().time_idx(),
                "Animation complete"
            );
        }
        _ = tokio::signal::ctrl_c() => {
            dashboard.animation().pause();
            info!("Shutdown signal received");
        }
    }

    selection_loader.abort();
    info!(elements = dashboard.bus().scene().len(), "Epidash stopped");

    Ok(())
}
