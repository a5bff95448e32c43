pub mod config;
pub mod state;
pub mod telemetry;
pub mod ui;

use crate::config::DashConfig;
use crate::telemetry::TelemetryHandle;
use crate::ui::CarHudUI;
use color_eyre::{eyre::eyre, Result};
use eframe::egui;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = DashConfig::load();

    info!("starting telemetry link");
    let (mut telemetry, snapshots, publisher) = TelemetryHandle::spawn(
        config.broker.clone(),
        config.topics.clone(),
        config.history_window(),
    );
    let status = telemetry.status();

    info!("starting UI");
    let mut native_options = eframe::NativeOptions::default();
    native_options.viewport = egui::ViewportBuilder::default().with_inner_size([1024.0, 600.0]);

    let ui_result = eframe::run_native(
        "Car HUD",
        native_options,
        Box::new(|cc| Ok(Box::new(CarHudUI::new(cc, snapshots, status, publisher)))),
    );

    // The broker subscription must be released on every exit path,
    // including an abnormal UI teardown.
    if let Err(e) = telemetry.shutdown().await {
        warn!("telemetry link shutdown: {}", e);
    }

    ui_result.map_err(|e| eyre!("UI error: {e}"))
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
