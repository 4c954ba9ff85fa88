mod capture;
mod command;
mod config;
mod disk_monitor;
mod gpio;
mod indicator;
mod power_monitor;
mod recorder;
mod server;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::capture::{CaptureBackend, RaspiCapture};
use crate::config::{Config, LogFormat};
use crate::disk_monitor::{DiskMonitor, DiskUsage};
use crate::gpio::{SysfsInputPin, SysfsOutputPin};
use crate::indicator::Indicator;
use crate::power_monitor::{HostShutdown, PowerMonitor};
use crate::recorder::Recorder;

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = config::load_or_default(&config::config_path())?;
    config::apply_env(&mut config, |key| std::env::var(key).ok())?;
    init_logging(&config)?;

    info!(version = env!("CARGO_PKG_VERSION"), "dashcam-daemon starting");

    std::fs::create_dir_all(&config.recording_dir).with_context(|| {
        format!(
            "failed to create recording directory {}",
            config.recording_dir.display()
        )
    })?;

    // Pin setup failures are fatal: without the indicator or the power
    // sense there is nothing useful this daemon can do.
    let indicator_pin =
        SysfsOutputPin::open(config.indicator_pin).context("failed to open indicator pin")?;
    let power_pin = SysfsInputPin::open(config.power_pin).context("failed to open power sense pin")?;

    let capture: Arc<dyn CaptureBackend> = Arc::new(RaspiCapture::new());
    let (recorder_handle, recorder) = Recorder::new(
        Indicator::new(Box::new(indicator_pin)),
        Arc::clone(&capture),
        config.recording_dir.clone(),
    );
    let recorder_task = tokio::spawn(recorder.run());

    let power_monitor = PowerMonitor::spawn(
        Box::new(power_pin),
        recorder_handle.clone(),
        Box::new(HostShutdown),
        power_monitor::POLL_INTERVAL,
    );
    let disk_monitor = DiskMonitor::spawn(
        config.recording_dir.clone(),
        Box::new(DiskUsage::new(config.recording_dir.clone())),
        config.disk_usage_target,
        disk_monitor::POLL_INTERVAL,
    );

    let app = server::router(
        server::AppState {
            recorder: recorder_handle.clone(),
            capture,
        },
        &config.recording_dir,
    );
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "http server listening");

    let (server_stop_tx, mut server_stop_rx) = watch::channel(false);
    let server_task = tokio::spawn(async move {
        let shutdown = async move {
            let _ = server_stop_rx.changed().await;
        };
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
            error!(error = %e, "http server error");
        }
    });

    wait_for_shutdown().await?;
    info!("shutting down");

    // Monitors first so nothing re-queues commands behind the quit, then
    // the recorder, then the server.
    power_monitor.quit().await;
    disk_monitor.quit().await;
    recorder_handle.quit().await;
    let mut indicator = recorder_task.await.context("recorder task panicked")?;
    indicator.extinguish();
    let _ = server_stop_tx.send(true);
    let _ = server_task.await;

    Ok(())
}

/// Blocks until SIGINT (Ctrl+C) or SIGTERM — the latter being what a
/// service manager sends on stop.
async fn wait_for_shutdown() -> Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to wait for shutdown signal")?;
        }
        _ = terminate.recv() => {}
    }
    Ok(())
}

fn init_logging(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_level)
        .with_context(|| format!("invalid log level: {}", config.log_level))?;
    match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
    }
    Ok(())
}
