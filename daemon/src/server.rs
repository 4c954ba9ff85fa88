//! HTTP control surface.
//!
//! Translates requests into the same commands the power monitor issues, and
//! serves completed recordings read-only. Record/stop are fire-and-forget:
//! the command send runs on its own task so a busy recorder never stalls a
//! request handler. Only the synchronous still capture surfaces backend
//! failures to the caller.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::capture::CaptureBackend;
use crate::recorder::RecorderHandle;

#[derive(Clone)]
pub struct AppState {
    pub recorder: RecorderHandle,
    pub capture: Arc<dyn CaptureBackend>,
}

pub fn router(state: AppState, recording_dir: &Path) -> Router {
    Router::new()
        .route("/dashcam/record", post(start_recording))
        .route("/dashcam/stop", post(stop_recording))
        .route("/dashcam/still", get(capture_still))
        .nest_service("/dashcam/recordings", ServeDir::new(recording_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn start_recording(State(state): State<AppState>) -> StatusCode {
    tokio::spawn(async move { state.recorder.start().await });
    StatusCode::ACCEPTED
}

async fn stop_recording(State(state): State<AppState>) -> StatusCode {
    tokio::spawn(async move { state.recorder.stop().await });
    StatusCode::ACCEPTED
}

/// Captures a one-off still into a scoped temporary directory and streams
/// the image back. The directory is released on every path out.
async fn capture_still(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let workspace = tempfile::tempdir().map_err(internal_error)?;
    let image_path = workspace.path().join("still.jpg");

    state
        .capture
        .capture_still(&image_path)
        .await
        .map_err(internal_error)?;
    let bytes = tokio::fs::read(&image_path).await.map_err(internal_error)?;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes))
}

fn internal_error<E: std::fmt::Display>(err: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::Indicator;
    use crate::recorder::Recorder;
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    const STILL_BYTES: &[u8] = b"\xff\xd8 not a real jpeg";

    struct FakeCapture {
        fail_still: bool,
    }

    #[async_trait]
    impl CaptureBackend for FakeCapture {
        async fn capture_video(&self, _output: &std::path::Path) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(())
        }

        async fn capture_still(&self, output: &std::path::Path) -> Result<()> {
            if self.fail_still {
                anyhow::bail!("camera offline");
            }
            tokio::fs::write(output, STILL_BYTES).await?;
            Ok(())
        }

        async fn transcode(&self, input: &std::path::Path, output: &std::path::Path) -> Result<()> {
            tokio::fs::copy(input, output).await?;
            Ok(())
        }

        async fn publish(&self, input: &std::path::Path, output: &std::path::Path) -> Result<()> {
            tokio::fs::rename(input, output).await?;
            Ok(())
        }
    }

    fn test_router(fail_still: bool) -> (Router, mpsc::Receiver<crate::command::Command>, TempDir) {
        let (tx, rx) = mpsc::channel(16);
        let recordings = tempfile::tempdir().unwrap();
        let state = AppState {
            recorder: RecorderHandle::new(tx),
            capture: Arc::new(FakeCapture { fail_still }),
        };
        (router(state, recordings.path()), rx, recordings)
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    #[tokio::test]
    async fn record_returns_accepted_and_enqueues_start() {
        let (app, mut rx, _dir) = test_router(false);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/dashcam/record")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(rx.recv().await, Some(crate::command::Command::Start));
    }

    #[tokio::test]
    async fn stop_returns_accepted_and_enqueues_stop() {
        let (app, mut rx, _dir) = test_router(false);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/dashcam/stop")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(rx.recv().await, Some(crate::command::Command::Stop));
    }

    #[tokio::test]
    async fn still_streams_image_bytes() {
        let (app, _rx, _dir) = test_router(false);
        let response = app
            .oneshot(Request::builder().uri("/dashcam/still").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/jpeg"
        );
        assert_eq!(body_bytes(response).await, STILL_BYTES);
    }

    #[tokio::test]
    async fn still_failure_surfaces_backend_error() {
        let (app, _rx, _dir) = test_router(true);
        let response = app
            .oneshot(Request::builder().uri("/dashcam/still").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(body.contains("camera offline"));
    }

    #[tokio::test]
    async fn recordings_are_served_statically() {
        let (app, _rx, dir) = test_router(false);
        std::fs::write(dir.path().join("clip.mp4"), b"footage").unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/dashcam/recordings/clip.mp4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"footage");
    }

    // End-to-end: a request through the router drives the real state machine.
    #[tokio::test]
    async fn record_request_reaches_the_recorder() {
        #[derive(Clone, Default)]
        struct FakePin {
            level: Arc<Mutex<Option<bool>>>,
        }

        impl crate::gpio::OutputPin for FakePin {
            fn set_high(&mut self) -> Result<()> {
                *self.level.lock().unwrap() = Some(true);
                Ok(())
            }

            fn set_low(&mut self) -> Result<()> {
                *self.level.lock().unwrap() = Some(false);
                Ok(())
            }
        }

        let pin = FakePin::default();
        let capture: Arc<dyn CaptureBackend> = Arc::new(FakeCapture { fail_still: false });
        let recordings = tempfile::tempdir().unwrap();
        let (handle, recorder) = Recorder::new(
            Indicator::new(Box::new(pin.clone())),
            Arc::clone(&capture),
            recordings.path().to_path_buf(),
        );
        let task = tokio::spawn(recorder.run());
        let app = router(
            AppState {
                recorder: handle.clone(),
                capture,
            },
            recordings.path(),
        );

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/dashcam/record")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        for _ in 0..200 {
            if *pin.level.lock().unwrap() == Some(true) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(*pin.level.lock().unwrap(), Some(true));

        handle.quit().await;
        task.await.unwrap();
    }
}
