//! The recording controller.
//!
//! One long-lived task owns the command channel, the indicator and the
//! capture backend, and runs a two-state machine:
//!
//!   - IDLE: fully blocked on `recv()` until a command arrives.
//!   - RECORDING: between segments, `try_recv()` is polled so a pending
//!     `Stop`/`Quit` is observed without ever interrupting a segment
//!     mid-capture.
//!
//! Transcoding and publishing run on a detached task per segment so that a
//! slow `MP4Box` pass never delays the next capture or a pending command.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{error, info};

use crate::capture::CaptureBackend;
use crate::command::Command;
use crate::indicator::Indicator;

/// One in-flight command slot. Senders await the hand-off, so back-pressure
/// delays producers rather than dropping commands.
const COMMAND_BUFFER: usize = 1;

const RAW_SEGMENT_NAME: &str = "segment.h264";
const MP4_SEGMENT_NAME: &str = "segment.mp4";

/// Producer side of the recorder's command channel. Clone freely; all clones
/// feed the same recorder.
#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::Sender<Command>,
}

impl RecorderHandle {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Enqueues a start command, returning once it is handed off.
    pub async fn start(&self) {
        let _ = self.tx.send(Command::Start).await;
    }

    /// Enqueues a stop command, returning once it is handed off.
    pub async fn stop(&self) {
        let _ = self.tx.send(Command::Stop).await;
    }

    /// Enqueues a quit command. Await the recorder task's join handle to
    /// observe the run loop actually exiting.
    pub async fn quit(&self) {
        let _ = self.tx.send(Command::Quit).await;
    }
}

/// How a recording session ended.
enum RecordingExit {
    /// A `Stop` arrived; return to IDLE.
    Stopped,
    /// A `Quit` arrived (or every sender is gone); terminate the run loop.
    Quit,
}

pub struct Recorder {
    rx: mpsc::Receiver<Command>,
    indicator: Indicator,
    capture: Arc<dyn CaptureBackend>,
    recording_dir: PathBuf,
}

impl Recorder {
    pub fn new(
        indicator: Indicator,
        capture: Arc<dyn CaptureBackend>,
        recording_dir: PathBuf,
    ) -> (RecorderHandle, Self) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        (
            RecorderHandle::new(tx),
            Self {
                rx,
                indicator,
                capture,
                recording_dir,
            },
        )
    }

    /// Runs until a `Quit` is received. Returns the indicator so the caller
    /// can extinguish it during final teardown.
    pub async fn run(mut self) -> Indicator {
        loop {
            let Some(cmd) = self.rx.recv().await else { break };
            match cmd {
                Command::Start => {
                    info!("recording started");
                    self.indicator.illuminate();
                    match self.record_until_stopped().await {
                        RecordingExit::Stopped => {
                            info!("recording stopped");
                            self.indicator.extinguish();
                        }
                        // Leave the indicator as-is; the process is exiting.
                        RecordingExit::Quit => break,
                    }
                }
                Command::Stop => {} // Already idle.
                Command::Quit => break,
            }
        }
        info!("recorder exiting");
        self.indicator
    }

    async fn record_until_stopped(&mut self) -> RecordingExit {
        loop {
            match self.rx.try_recv() {
                Ok(Command::Stop) => return RecordingExit::Stopped,
                Ok(Command::Quit) | Err(TryRecvError::Disconnected) => return RecordingExit::Quit,
                Ok(Command::Start) | Err(TryRecvError::Empty) => {}
            }
            self.record_segment().await;
        }
    }

    /// Captures one segment. Any failure is logged and scoped to this
    /// segment; the session carries on with the next one.
    ///
    /// Takes `&mut self` so the future only ever borrows the recorder
    /// mutably; a shared borrow held across the capture await would stop
    /// `run()` from being spawned onto the multi-thread runtime.
    async fn record_segment(&mut self) {
        let workspace = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                error!(error = %e, "failed to create segment workspace");
                return;
            }
        };

        let raw_path = workspace.path().join(RAW_SEGMENT_NAME);
        if let Err(e) = self.capture.capture_video(&raw_path).await {
            error!(error = %e, "video capture failed");
            return;
        }

        // Finish the segment off the recording loop so transcoding never
        // delays the next capture or a pending stop. The workspace moves
        // into the task and is released on every exit path.
        let capture = Arc::clone(&self.capture);
        let recording_dir = self.recording_dir.clone();
        tokio::spawn(async move {
            if let Err(e) = finish_segment(workspace, raw_path, capture, recording_dir).await {
                error!(error = %e, "failed to finish segment");
            }
        });
    }
}

/// Transcodes a raw segment and publishes it into the recording directory
/// under a name derived from the completion timestamp.
async fn finish_segment(
    workspace: TempDir,
    raw_path: PathBuf,
    capture: Arc<dyn CaptureBackend>,
    recording_dir: PathBuf,
) -> Result<()> {
    let mp4_path = workspace.path().join(MP4_SEGMENT_NAME);
    capture
        .transcode(&raw_path, &mp4_path)
        .await
        .context("transcoding segment")?;

    let name = format!("{}.mp4", Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
    capture
        .publish(&mp4_path, &recording_dir.join(name))
        .await
        .context("publishing segment")
}
