//! Disk-capacity monitoring and footage rotation.
//!
//! Polls the usage of the filesystem holding the recording directory and,
//! when it crosses the configured target, deletes completed recordings
//! oldest-first until usage falls back under the target. Recordings are
//! write-once and never re-read, so plain FIFO eviction is the right
//! policy. The monitor shares the directory with the recorder without any
//! locking; it only ever touches files whose mtime predates the current
//! segment, which is the accepted race window.

use anyhow::{ensure, Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use sysinfo::Disks;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Source of the consumed-percentage figure for the recording volume.
/// Recomputed on every poll and after every deletion.
pub trait UsageProbe: Send {
    fn usage_percent(&mut self) -> Result<f64>;
}

/// Probes the mounted disk holding `path` via sysinfo.
pub struct DiskUsage {
    path: PathBuf,
}

impl DiskUsage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl UsageProbe for DiskUsage {
    fn usage_percent(&mut self) -> Result<f64> {
        let target = self
            .path
            .canonicalize()
            .with_context(|| format!("failed to resolve {}", self.path.display()))?;

        // Longest mount-point prefix wins, so nested mounts resolve to the
        // filesystem that actually holds the recordings.
        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .filter(|d| target.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .with_context(|| format!("no mounted disk contains {}", target.display()))?;

        let total = disk.total_space() as f64;
        ensure!(total > 0.0, "disk reports zero capacity");
        Ok((1.0 - disk.available_space() as f64 / total) * 100.0)
    }
}

/// A running disk monitor task and its stop signal.
pub struct DiskMonitor {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl DiskMonitor {
    pub fn spawn(
        recording_dir: PathBuf,
        probe: Box<dyn UsageProbe>,
        usage_target: f64,
        poll_interval: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run(recording_dir, probe, usage_target, poll_interval, stop_rx));
        Self { stop_tx, handle }
    }

    pub async fn quit(self) {
        info!("disk monitor stopping");
        let _ = self.stop_tx.send(true);
        let _ = self.handle.await;
    }
}

async fn run(
    recording_dir: PathBuf,
    mut probe: Box<dyn UsageProbe>,
    usage_target: f64,
    poll_interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(poll_interval);

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                match probe.usage_percent() {
                    // Query failure: no action this cycle.
                    Err(e) => warn!(error = %e, "disk usage query failed, skipping cycle"),
                    Ok(used) => {
                        debug!("disk usage {used:.2}%");
                        if used > usage_target {
                            rotate_recordings(&recording_dir, probe.as_mut(), usage_target);
                        }
                    }
                }
            }
        }
    }
}

/// One reclamation pass: delete recordings oldest-first, re-probing after
/// each deletion, until usage drops under the target or the directory is
/// empty. Any deletion or probe failure aborts the pass; the next cycle
/// re-lists and retries from the same oldest file.
fn rotate_recordings(dir: &Path, probe: &mut dyn UsageProbe, usage_target: f64) {
    let mut recordings = match list_recordings(dir) {
        Ok(recordings) => recordings,
        Err(e) => {
            error!(error = %e, "failed to list recordings");
            return;
        }
    };
    recordings.sort_by_key(|(_, modified)| *modified);

    for (path, _) in recordings {
        info!(path = %path.display(), "removing recording");
        if let Err(e) = std::fs::remove_file(&path) {
            error!(error = %e, "failed to remove recording, aborting pass");
            break;
        }
        match probe.usage_percent() {
            Err(e) => {
                error!(error = %e, "usage query failed mid-pass, aborting");
                break;
            }
            Ok(used) if used < usage_target => break,
            Ok(_) => {}
        }
    }
}

fn list_recordings(dir: &Path) -> Result<Vec<(PathBuf, SystemTime)>> {
    let mut recordings = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        recordings.push((entry.path(), entry.metadata()?.modified()?));
    }
    Ok(recordings)
}
