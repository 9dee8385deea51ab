//! Operator control state shared by the cycle runner and the HTTP API.
//!
//! All mutable control fields use [`std::sync::atomic`] types so they can
//! be shared between the runner task and the Axum handler tasks without
//! locks on the poll path. The last pass report sits behind an async
//! mutex; it is written once per pass.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};

use crate::settlement::PassReport;

/// Shared operator control state.
#[derive(Debug)]
pub struct OperatorState {
    /// Whether boundary polling is suspended.
    paused: AtomicBool,

    /// Wakes the runner when resumed.
    resume_notify: Notify,

    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Wakes every task waiting in [`OperatorState::stopped`].
    stop_notify: Notify,

    /// Passes run by this process, complete or not.
    passes_run: AtomicU64,

    /// Wall-clock time the runner was created.
    started_at: DateTime<Utc>,

    /// The most recent pass report.
    last_report: Mutex<Option<PassReport>>,
}

/// Point-in-time view of [`OperatorState`] for the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperatorStatus {
    /// Whether polling is suspended.
    pub paused: bool,
    /// Whether a stop has been requested.
    pub stop_requested: bool,
    /// Passes run so far.
    pub passes_run: u64,
    /// When the runner started.
    pub started_at: DateTime<Utc>,
}

impl OperatorState {
    /// Create a running, unpaused control state.
    pub fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            resume_notify: Notify::new(),
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            passes_run: AtomicU64::new(0),
            started_at: Utc::now(),
            last_report: Mutex::new(None),
        }
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// Check whether polling is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Pause boundary polling. Passes already running finish.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Resume polling and wake the runner.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.resume_notify.notify_one();
    }

    /// Wait until polling is no longer paused or a stop is requested.
    pub async fn wait_if_paused(&self) {
        while self.is_paused() && !self.is_stop_requested() {
            self.resume_notify.notified().await;
        }
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Request a clean stop after the current tick.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.resume_notify.notify_one();
        self.stop_notify.notify_waiters();
    }

    /// Resolve once a stop has been requested.
    pub async fn stopped(&self) {
        loop {
            let mut notified = std::pin::pin!(self.stop_notify.notified());
            notified.as_mut().enable();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Pass history
    // -----------------------------------------------------------------------

    /// Store the report of a pass that just ran.
    pub async fn record_pass(&self, report: PassReport) {
        self.passes_run.fetch_add(1, Ordering::AcqRel);
        *self.last_report.lock().await = Some(report);
    }

    /// The most recent pass report, if any pass ran.
    pub async fn last_report(&self) -> Option<PassReport> {
        self.last_report.lock().await.clone()
    }

    /// Snapshot for the API.
    pub fn status(&self) -> OperatorStatus {
        OperatorStatus {
            paused: self.is_paused(),
            stop_requested: self.is_stop_requested(),
            passes_run: self.passes_run.load(Ordering::Acquire),
            started_at: self.started_at,
        }
    }
}

impl Default for OperatorState {
    fn default() -> Self {
        Self::new()
    }
}
