//! Cycle clock: maps wall-clock time onto fixed-length settlement cycles.
//!
//! The cycle identifier is `floor(unix_seconds / period)`. It is global:
//! every process derives the same identifier from the same instant, so
//! independently polling processes agree on which cycle a boundary opens.
//!
//! [`BoundaryDetector`] turns a stream of observed cycle ids into
//! settlement triggers. It never fires on the first observation after
//! start, fires at most once per boundary, and when several boundaries
//! were crossed between two polls it fires only for the latest one.

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, warn};

/// Errors that can occur when building a clock.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// The cycle period must be at least one second.
    #[error("cycle period must be positive")]
    ZeroPeriod,
}

/// Derives cycle identifiers from wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleClock {
    period_seconds: u64,
}

impl CycleClock {
    /// Create a clock with a fixed period in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::ZeroPeriod`] if `period_seconds` is zero.
    pub const fn new(period_seconds: u64) -> Result<Self, ClockError> {
        if period_seconds == 0 {
            return Err(ClockError::ZeroPeriod);
        }
        Ok(Self { period_seconds })
    }

    /// Length of one cycle in seconds.
    pub const fn period_seconds(&self) -> u64 {
        self.period_seconds
    }

    /// The cycle identifier containing `now`.
    pub fn cycle_id_at(&self, now: DateTime<Utc>) -> u64 {
        unix_seconds(now)
            .checked_div(self.period_seconds)
            .unwrap_or(0)
    }

    /// Seconds until the next boundary, in `1..=period`.
    pub fn seconds_remaining_at(&self, now: DateTime<Utc>) -> u64 {
        let into = unix_seconds(now)
            .checked_rem(self.period_seconds)
            .unwrap_or(0);
        self.period_seconds.saturating_sub(into)
    }

    /// Wall-clock instant at which `cycle_id` begins.
    pub fn cycle_start(&self, cycle_id: u64) -> DateTime<Utc> {
        let secs = cycle_id.saturating_mul(self.period_seconds);
        let secs = i64::try_from(secs).unwrap_or(i64::MAX);
        Utc.timestamp_opt(secs, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Start of the investment window judged by the close of `closed_cycle`.
    ///
    /// A boundary into cycle `N` closes cycle `N - 1`, so an investment
    /// qualifies if it happened at or after `(N - 1) * period`.
    pub fn investment_window_start(&self, closed_cycle: u64) -> DateTime<Utc> {
        self.cycle_start(closed_cycle.saturating_sub(1))
    }
}

/// Whole seconds since the Unix epoch; instants before it count as zero.
fn unix_seconds(now: DateTime<Utc>) -> u64 {
    u64::try_from(now.timestamp()).unwrap_or(0)
}

/// A settlement trigger emitted by [`BoundaryDetector::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    /// The cycle to settle.
    pub cycle_id: u64,
    /// Which attempt this is for the cycle, starting at 1.
    pub attempt: u32,
    /// Cycles crossed without settlement because polling lagged.
    pub skipped: u64,
}

#[derive(Debug, Clone, Copy)]
struct Retry {
    cycle_id: u64,
    attempts: u32,
}

/// Per-process boundary detection with bounded retry of failed passes.
#[derive(Debug, Clone)]
pub struct BoundaryDetector {
    last_seen: Option<u64>,
    retry: Option<Retry>,
    max_retries: u32,
}

impl BoundaryDetector {
    /// Create a detector that re-fires a failed cycle up to `max_retries` times.
    pub const fn new(max_retries: u32) -> Self {
        Self {
            last_seen: None,
            retry: None,
            max_retries,
        }
    }

    /// The most recent cycle this detector has observed, if any.
    pub const fn last_seen(&self) -> Option<u64> {
        self.last_seen
    }

    /// Feed the current cycle id; returns a trigger if a pass should run.
    pub fn observe(&mut self, current: u64) -> Option<Boundary> {
        let Some(last) = self.last_seen else {
            debug!(cycle_id = current, "first cycle observation, not settling");
            self.last_seen = Some(current);
            return None;
        };

        if current > last {
            let skipped = current.saturating_sub(last).saturating_sub(1);
            if skipped > 0 {
                warn!(
                    cycle_id = current,
                    skipped,
                    "missed cycle boundaries, settling latest only"
                );
            }
            if let Some(retry) = self.retry.take() {
                warn!(
                    cycle_id = retry.cycle_id,
                    attempts = retry.attempts,
                    "abandoning retries for superseded cycle"
                );
            }
            self.last_seen = Some(current);
            self.retry = Some(Retry {
                cycle_id: current,
                attempts: 1,
            });
            return Some(Boundary {
                cycle_id: current,
                attempt: 1,
                skipped,
            });
        }

        // Same cycle: re-fire only if the last attempt failed.
        let retry = self.retry.as_mut()?;
        if retry.cycle_id != current {
            return None;
        }
        if retry.attempts > self.max_retries {
            return None;
        }
        retry.attempts = retry.attempts.saturating_add(1);
        Some(Boundary {
            cycle_id: current,
            attempt: retry.attempts,
            skipped: 0,
        })
    }

    /// Record that the pass for `cycle_id` completed without transient failures.
    pub fn pass_succeeded(&mut self, cycle_id: u64) {
        if self.retry.is_some_and(|r| r.cycle_id == cycle_id) {
            self.retry = None;
        }
    }

    /// Record that the pass for `cycle_id` left work undone.
    ///
    /// Returns whether the cycle will be re-fired on a later poll.
    pub fn pass_failed(&mut self, cycle_id: u64) -> bool {
        let Some(retry) = self.retry else {
            return false;
        };
        if retry.cycle_id != cycle_id {
            return false;
        }
        if retry.attempts > self.max_retries {
            warn!(
                cycle_id,
                attempts = retry.attempts,
                "giving up on cycle after repeated failures"
            );
            self.retry = None;
            return false;
        }
        true
    }
}
