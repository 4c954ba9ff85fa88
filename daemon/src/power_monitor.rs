//! Power-source monitoring.
//!
//! Polls the sense pin once per second and acts only on edges: external
//! power appearing starts a recording and cancels any pending host
//! shutdown; dropping to battery stops the recording and arms a delayed
//! shutdown so the recorder can flush its last segment before the system
//! powers off.

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::gpio::{InputPin, Level};
use crate::recorder::RecorderHandle;

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

const SHUTDOWN_DELAY_MINUTES: u32 = 15;

/// What the sense pin said the vehicle is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PowerSource {
    /// The car is running; the sense pin is high.
    External,
    /// The car is off; the daemon is on its own battery.
    Battery,
    /// The pin could not be read this cycle.
    Unknown,
}

/// Host power management boundary: arming and disarming the delayed
/// shutdown that follows a switch to battery power.
#[async_trait]
pub trait HostPower: Send + Sync {
    async fn schedule_shutdown(&self) -> Result<()>;
    async fn cancel_shutdown(&self) -> Result<()>;
}

/// Delegates to the system `shutdown` command via sudo.
pub struct HostShutdown;

#[async_trait]
impl HostPower for HostShutdown {
    async fn schedule_shutdown(&self) -> Result<()> {
        debug!("scheduling shutdown in {SHUTDOWN_DELAY_MINUTES} minutes");
        run_shutdown(&["-P", &format!("+{SHUTDOWN_DELAY_MINUTES}")]).await
    }

    async fn cancel_shutdown(&self) -> Result<()> {
        debug!("cancelling any scheduled shutdown");
        run_shutdown(&["-c"]).await
    }
}

async fn run_shutdown(args: &[&str]) -> Result<()> {
    let status = tokio::process::Command::new("sudo")
        .arg("shutdown")
        .args(args)
        .status()
        .await
        .context("failed to run shutdown")?;
    ensure!(status.success(), "shutdown exited with {status}");
    Ok(())
}

/// A running power monitor task and its stop signal.
pub struct PowerMonitor {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PowerMonitor {
    pub fn spawn(
        pin: Box<dyn InputPin>,
        recorder: RecorderHandle,
        host: Box<dyn HostPower>,
        poll_interval: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run(pin, recorder, host, poll_interval, stop_rx));
        Self { stop_tx, handle }
    }

    /// Signals the poll loop to stop and waits for it to finish. Consuming
    /// `self` makes a double stop unrepresentable.
    pub async fn quit(self) {
        info!("power monitor stopping");
        let _ = self.stop_tx.send(true);
        let _ = self.handle.await;
    }
}

async fn run(
    mut pin: Box<dyn InputPin>,
    recorder: RecorderHandle,
    host: Box<dyn HostPower>,
    poll_interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(poll_interval);
    let mut last = PowerSource::Unknown;

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let observed = observe(pin.as_mut());
                if observed == last {
                    continue;
                }
                match observed {
                    PowerSource::External => {
                        info!("external power detected");
                        recorder.start().await;
                        if let Err(e) = host.cancel_shutdown().await {
                            warn!(error = %e, "failed to cancel scheduled shutdown");
                        }
                    }
                    PowerSource::Battery => {
                        info!("battery power detected");
                        recorder.stop().await;
                        if let Err(e) = host.schedule_shutdown().await {
                            warn!(error = %e, "failed to schedule shutdown");
                        }
                    }
                    // A failed read still updates the last-observed state,
                    // but no defined transition fires for it.
                    PowerSource::Unknown => {}
                }
                last = observed;
            }
        }
    }
}

fn observe(pin: &mut dyn InputPin) -> PowerSource {
    match pin.read() {
        Ok(Level::High) => PowerSource::External,
        Ok(Level::Low) => PowerSource::Battery,
        Err(e) => {
            debug!(error = %e, "power sense read failed");
            PowerSource::Unknown
        }
    }
}
