//! Pass observer that publishes hot state to Dragonfly.
//!
//! After each pass the summary and the settled cycle id are written to
//! the cache; every phenomenon change the runner sees is written too.
//! Publishing is best effort: a cache failure is logged and the engine
//! carries on, since the store stays the source of truth.

use colony_core::{PassObserver, PassReport};
use colony_db::HotStateCache;
use colony_types::PhenomenonState;
use tracing::{debug, warn};

/// Bridges the cycle runner to the hot-state cache.
pub struct CachePublisher {
    cache: Option<HotStateCache>,
}

impl CachePublisher {
    /// Publish through `cache`, or do nothing when it is `None`.
    pub const fn new(cache: Option<HotStateCache>) -> Self {
        Self { cache }
    }

    /// Whether a cache is connected.
    pub const fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }
}

impl PassObserver for CachePublisher {
    async fn on_pass(&self, report: &PassReport) {
        let Some(cache) = &self.cache else {
            return;
        };
        match cache.set_last_pass(report.cycle_id, report).await {
            Ok(()) => debug!(cycle_id = report.cycle_id, "pass summary published"),
            Err(e) => warn!(cycle_id = report.cycle_id, error = %e, "failed to publish pass summary"),
        }
    }

    async fn on_phenomenon(&self, state: &PhenomenonState) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(e) = cache.set_phenomenon(state).await {
            warn!(error = %e, "failed to publish phenomenon state");
        }
    }
}
