//! The master's HTTP surface: the four routes a scanner worker process
//! talks to, plus a liveness check.
//!
//! Grounded on `examples/original_source/orchestrator/internal/master/server.go`.
//! Route shape and status-code conventions follow the teacher's own axum
//! usage in `examples/adamtc007-ob-poc/rust/crates/sem_os_server/src/router.rs`
//! and `error.rs`: a typed `AppError`-style wrapper maps domain errors to
//! HTTP status, and handlers take their dependencies through `State`.
//!
//! In `--scanner-test` mode (spec.md §4.16) the scheduler and instance pool
//! are never started; `register` instead fires a single canned artifact
//! (`test_artifacts::canned_artifact`) straight at a hardcoded local target,
//! and `/artifact` just logs what it received instead of forwarding it.

mod test_artifacts;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::artifact::ArtifactKind;
use crate::error::MasterApiError;
use crate::protocol::{ArtifactNamed, ScannerInstanceControlMsg, ScannerMsgKind};

/// The hardcoded target a `--scanner-test` run hands to a freshly-registered
/// instance, mirroring the original's `SendFittingTestArtifact(..., "localhost:10001")`.
const TEST_TARGET_HOST: &str = "localhost:10001";

/// Shared state behind every master route.
pub struct MasterState {
    pub artifact_tx: mpsc::Sender<ArtifactNamed>,
    pub control_tx: mpsc::Sender<ScannerInstanceControlMsg>,
    /// Declared `inputs[0]` per scanner template, used only in
    /// `--scanner-test` mode to pick which canned artifact to send a
    /// freshly-registered instance.
    pub template_first_input: HashMap<String, ArtifactKind>,
    pub scanner_test: bool,
    pub http: reqwest::Client,
}

pub fn router(state: Arc<MasterState>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/register", post(control))
        .route("/unregister", post(control))
        .route("/finish_task", post(control))
        .route("/artifact", post(artifact))
        .with_state(state)
}

async fn status() -> &'static str {
    "running"
}

struct ApiError(MasterApiError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            MasterApiError::Bind(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
            MasterApiError::UnknownTemplate(name) => {
                (StatusCode::BAD_REQUEST, format!("no scanner template named {name}")).into_response()
            }
        }
    }
}

async fn control(
    State(state): State<Arc<MasterState>>,
    body: Result<Json<ScannerInstanceControlMsg>, axum::extract::rejection::JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(msg) = body.map_err(|e| ApiError(MasterApiError::Bind(e)))?;

    if state.scanner_test {
        if msg.scanner_msg == ScannerMsgKind::Register {
            send_test_artifact(&state, &msg.scanner_template).await;
        }
        return Ok(StatusCode::OK);
    }

    if state.control_tx.send(msg).await.is_err() {
        warn!("control channel closed, dropping control message");
    }
    Ok(StatusCode::OK)
}

async fn artifact(
    State(state): State<Arc<MasterState>>,
    body: Result<Json<ArtifactNamed>, axum::extract::rejection::JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(named) = body.map_err(|e| ApiError(MasterApiError::Bind(e)))?;

    if state.scanner_test {
        info!(title = ?named.artifact.title, value = %named.artifact.value, "received artifact");
        return Ok(StatusCode::OK);
    }

    if state.artifact_tx.capacity() == 0 {
        warn!(scanner = %named.scanner_template, "artifact channel is full");
    }
    if state.artifact_tx.send(named).await.is_err() {
        warn!("artifact channel closed, dropping artifact");
    }
    Ok(StatusCode::OK)
}

/// Posts one canned artifact straight to [`TEST_TARGET_HOST`], bypassing the
/// queue/rate-limiter/scheduler entirely (spec.md §4.16).
async fn send_test_artifact(state: &MasterState, template: &str) {
    let Some(kind) = state.template_first_input.get(template).copied() else {
        panic!("scanner test artifact requested for unknown template {template}");
    };
    let artifact = test_artifacts::canned_artifact(kind);

    let url = format!("http://{TEST_TARGET_HOST}/artifact");
    match state.http.post(&url).json(&artifact).send().await {
        Ok(resp) if resp.status().is_success() => {
            info!(template, %url, "sent test artifact");
        }
        Ok(resp) => panic!("test artifact post to {url} returned {}", resp.status()),
        Err(e) => panic!("failed to post test artifact to {url}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(scanner_test: bool) -> (Arc<MasterState>, mpsc::Receiver<ArtifactNamed>, mpsc::Receiver<ScannerInstanceControlMsg>) {
        let (artifact_tx, artifact_rx) = mpsc::channel(16);
        let (control_tx, control_rx) = mpsc::channel(16);
        let state = Arc::new(MasterState {
            artifact_tx,
            control_tx,
            template_first_input: HashMap::new(),
            scanner_test,
            http: reqwest::Client::new(),
        });
        (state, artifact_rx, control_rx)
    }

    #[tokio::test]
    async fn status_route_reports_running() {
        assert_eq!(status().await, "running");
    }

    #[tokio::test]
    async fn control_forwards_to_channel_outside_test_mode() {
        let (state, _artifact_rx, mut control_rx) = state(false);

        let msg = ScannerInstanceControlMsg {
            scanner_template: "tmpl".to_string(),
            scanner_instance: "tmpl_0".to_string(),
            scanner_msg: ScannerMsgKind::Register,
        };
        let result = control(State(state), Ok(Json(msg))).await;
        assert!(result.is_ok());
        assert!(control_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn artifact_forwards_to_channel_outside_test_mode() {
        let (state, mut artifact_rx, _control_rx) = state(false);
        let named = ArtifactNamed {
            artifact: crate::artifact::Artifact::new(ArtifactKind::Ip, "1.2.3.4", "scanner"),
            scanner_template: "tmpl".to_string(),
            scanner_instance: "tmpl_0".to_string(),
        };
        let result = artifact(State(state), Ok(Json(named))).await;
        assert!(result.is_ok());
        assert!(artifact_rx.try_recv().is_ok());
    }
}
