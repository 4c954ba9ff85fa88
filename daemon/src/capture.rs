//! The capture backend boundary.
//!
//! Raw video and still capture, container transcoding and final file
//! placement are all external operations as far as the daemon is concerned.
//! [`RaspiCapture`] shells out to the Raspberry Pi camera tools; tests plug
//! in their own backend.

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Length of one recorded video segment.
pub const SEGMENT_DURATION: Duration = Duration::from_secs(300);

const VIDEO_WIDTH: u32 = 1296;
const VIDEO_HEIGHT: u32 = 972;
const VIDEO_FPS: u32 = 30;

#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Records one fixed-duration raw video segment to `output`. Blocks the
    /// calling task for the full segment duration.
    async fn capture_video(&self, output: &Path) -> Result<()>;

    /// Captures a single still image to `output`.
    async fn capture_still(&self, output: &Path) -> Result<()>;

    /// Repackages a raw segment into the distribution container format.
    async fn transcode(&self, input: &Path, output: &Path) -> Result<()>;

    /// Moves a finished file into its final location.
    async fn publish(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Capture backend for the Raspberry Pi camera stack: `raspivid` for video,
/// `raspistill` for stills and `MP4Box` for H.264-to-MP4 repackaging.
pub struct RaspiCapture {
    segment_duration: Duration,
}

impl RaspiCapture {
    pub fn new() -> Self {
        Self {
            segment_duration: SEGMENT_DURATION,
        }
    }
}

#[async_trait]
impl CaptureBackend for RaspiCapture {
    async fn capture_video(&self, output: &Path) -> Result<()> {
        debug!(path = %output.display(), "capturing video");
        let mut cmd = Command::new("raspivid");
        cmd.arg("-o")
            .arg(output)
            .arg("-t")
            .arg(self.segment_duration.as_millis().to_string())
            .arg("-w")
            .arg(VIDEO_WIDTH.to_string())
            .arg("-h")
            .arg(VIDEO_HEIGHT.to_string())
            .arg("-fps")
            .arg(VIDEO_FPS.to_string());
        run("raspivid", cmd).await
    }

    async fn capture_still(&self, output: &Path) -> Result<()> {
        debug!(path = %output.display(), "capturing still");
        let mut cmd = Command::new("raspistill");
        cmd.arg("-o").arg(output);
        run("raspistill", cmd).await
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        debug!(input = %input.display(), output = %output.display(), "transcoding to mp4");
        let mut cmd = Command::new("MP4Box");
        cmd.arg("-add").arg(input).arg(output);
        run("MP4Box", cmd).await
    }

    async fn publish(&self, input: &Path, output: &Path) -> Result<()> {
        debug!(input = %input.display(), output = %output.display(), "publishing");
        // Rename when source and destination share a filesystem; the
        // segment workspace usually lives on tmpfs, so fall back to
        // copy-and-remove.
        if tokio::fs::rename(input, output).await.is_ok() {
            return Ok(());
        }
        tokio::fs::copy(input, output)
            .await
            .with_context(|| format!("failed to copy {} to {}", input.display(), output.display()))?;
        tokio::fs::remove_file(input)
            .await
            .with_context(|| format!("failed to remove {}", input.display()))?;
        Ok(())
    }
}

async fn run(program: &str, mut cmd: Command) -> Result<()> {
    let status = cmd
        .status()
        .await
        .with_context(|| format!("failed to run {program}"))?;
    ensure!(status.success(), "{program} exited with {status}");
    Ok(())
}
