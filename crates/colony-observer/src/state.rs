//! Shared application state for the Observer API server.

use std::sync::Arc;

use chrono::Duration;

use colony_core::{CycleClock, OperatorState};

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug)]
pub struct AppState<S> {
    /// The store the engine settles against.
    pub store: Arc<S>,
    /// Cycle clock, for the countdown endpoint.
    pub clock: CycleClock,
    /// Length of a purchased protection window.
    pub protection: Duration,
    /// Shared operator control state of the local cycle runner.
    pub operator: Arc<OperatorState>,
}

impl<S> AppState<S> {
    /// Create application state over `store`.
    pub const fn new(
        store: Arc<S>,
        clock: CycleClock,
        protection: Duration,
        operator: Arc<OperatorState>,
    ) -> Self {
        Self {
            store,
            clock,
            protection,
            operator,
        }
    }
}
