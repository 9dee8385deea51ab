//! Operator REST API handlers for runtime control of the cycle runner.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/operator/status` | Pause and stop flags, passes run |
//! | `POST` | `/api/operator/pause` | Stop polling for boundaries |
//! | `POST` | `/api/operator/resume` | Resume polling |
//! | `POST` | `/api/operator/stop` | Trigger clean shutdown |
//!
//! Pausing only affects this process. Another engine polling the same
//! store keeps settling.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use tracing::info;

use colony_core::OperatorStatus;
use colony_ledger::LedgerStore;

use crate::state::AppState;

/// Generic success response.
#[derive(Debug, serde::Serialize)]
pub struct OperatorResponse {
    /// Whether the operation succeeded.
    pub ok: bool,
    /// Human-readable message.
    pub message: String,
}

impl OperatorResponse {
    fn ok(message: &str) -> Json<Self> {
        Json(Self {
            ok: true,
            message: message.to_owned(),
        })
    }
}

/// Current runner control state.
pub async fn status<S: LedgerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<OperatorStatus> {
    Json(state.operator.status())
}

/// Suspend boundary polling.
pub async fn pause<S: LedgerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<OperatorResponse> {
    state.operator.pause();
    info!("Operator paused the cycle runner");
    OperatorResponse::ok("Cycle runner paused")
}

/// Resume boundary polling after a pause.
pub async fn resume<S: LedgerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<OperatorResponse> {
    state.operator.resume();
    info!("Operator resumed the cycle runner");
    OperatorResponse::ok("Cycle runner resumed")
}

/// Ask the runner to stop after its current tick.
pub async fn stop<S: LedgerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<OperatorResponse> {
    state.operator.request_stop();
    info!("Operator requested shutdown");
    OperatorResponse::ok("Stop requested")
}
