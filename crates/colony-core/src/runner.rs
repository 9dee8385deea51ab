//! Boundary polling loop.
//!
//! [`CycleRunner`] polls the wall clock at a fixed interval, hands every
//! boundary the [`BoundaryDetector`] reports to the settlement engine, and
//! drives the local hazard siren. Several runners (in this process or
//! others) may poll the same store; the engine's cycle-keyed commits make
//! their overlapping passes safe.
//!
//! A pass that leaves work undone is not retried in a tight loop: the
//! detector re-fires the cycle on a later poll, up to the configured
//! retry budget.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use colony_ledger::LedgerStore;
use colony_types::PhenomenonState;

use crate::clock::{Boundary, BoundaryDetector};
use crate::config::CycleConfig;
use crate::operator::OperatorState;
use crate::phenomenon::{clear_warning, SirenCountdown, SirenEvent};
use crate::settlement::{PassReport, SettlementEngine};

/// Hook invoked after passes and phenomenon changes.
///
/// The engine binary uses it to publish hot state to Dragonfly.
pub trait PassObserver: Send + Sync {
    /// Called after every pass, complete or not.
    fn on_pass(&self, report: &PassReport) -> impl Future<Output = ()> + Send;

    /// Called when the runner observed or wrote a new phenomenon state.
    fn on_phenomenon(&self, state: &PhenomenonState) -> impl Future<Output = ()> + Send;
}

/// An observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl PassObserver for NoOpObserver {
    async fn on_pass(&self, _report: &PassReport) {}

    async fn on_phenomenon(&self, _state: &PhenomenonState) {}
}

/// What one poll tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    /// The cycle containing the tick.
    pub cycle_id: u64,
    /// The boundary handled on this tick, if any.
    pub boundary: Option<Boundary>,
    /// The pass report, if a pass ran and started.
    pub report: Option<PassReport>,
    /// What the siren did.
    pub siren: SirenEvent,
}

/// Why [`CycleRunner::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Poll ticks executed.
    pub ticks: u64,
    /// Passes started.
    pub passes: u64,
}

/// Polls for cycle boundaries and runs settlement passes.
#[derive(Debug)]
pub struct CycleRunner<S, O> {
    engine: Arc<SettlementEngine<S>>,
    detector: BoundaryDetector,
    siren: SirenCountdown,
    poll_interval: Duration,
    operator: Arc<OperatorState>,
    observer: O,
}

impl<S: LedgerStore, O: PassObserver> CycleRunner<S, O> {
    /// Create a runner from the cycle section of the config.
    pub fn new(
        engine: Arc<SettlementEngine<S>>,
        cycle: &CycleConfig,
        operator: Arc<OperatorState>,
        observer: O,
    ) -> Self {
        Self {
            engine,
            detector: BoundaryDetector::new(cycle.max_pass_retries),
            siren: SirenCountdown::new(cycle.siren_countdown_ticks),
            poll_interval: Duration::from_millis(cycle.poll_interval_ms),
            operator,
            observer,
        }
    }

    /// Poll until the operator requests a stop.
    pub async fn run(&mut self) -> RunSummary {
        let mut summary = RunSummary {
            ticks: 0,
            passes: 0,
        };
        info!(
            period_seconds = self.engine.clock().period_seconds(),
            poll_interval_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "cycle runner starting"
        );

        loop {
            if self.operator.is_paused() {
                info!("cycle runner paused, waiting for resume...");
                self.operator.wait_if_paused().await;
                info!("cycle runner resumed");
            }
            if self.operator.is_stop_requested() {
                info!(ticks = summary.ticks, passes = summary.passes, "cycle runner stopping");
                return summary;
            }

            let outcome = self.tick(Utc::now()).await;
            summary.ticks = summary.ticks.saturating_add(1);
            if outcome.boundary.is_some() {
                summary.passes = summary.passes.saturating_add(1);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One poll: settle a boundary if one was crossed, then drive the siren.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        let cycle_id = self.engine.clock().cycle_id_at(now);
        let boundary = self.detector.observe(cycle_id);

        let report = match boundary {
            Some(boundary) => self.settle(boundary, now).await,
            None => None,
        };

        let siren = self.drive_siren().await;
        TickOutcome {
            cycle_id,
            boundary,
            report,
            siren,
        }
    }

    async fn settle(&mut self, boundary: Boundary, now: DateTime<Utc>) -> Option<PassReport> {
        info!(
            cycle_id = boundary.cycle_id,
            attempt = boundary.attempt,
            skipped = boundary.skipped,
            "cycle boundary crossed"
        );

        match self.engine.run_pass(boundary.cycle_id, now).await {
            Ok(report) => {
                if report.is_complete() {
                    self.detector.pass_succeeded(report.cycle_id);
                } else if self.detector.pass_failed(report.cycle_id) {
                    warn!(
                        cycle_id = report.cycle_id,
                        failed = report.failed,
                        "pass incomplete, will retry on next poll"
                    );
                }
                self.operator.record_pass(report.clone()).await;
                self.observer.on_pass(&report).await;
                Some(report)
            }
            Err(e) => {
                warn!(cycle_id = boundary.cycle_id, error = %e, "settlement pass abandoned");
                self.detector.pass_failed(boundary.cycle_id);
                None
            }
        }
    }

    async fn drive_siren(&mut self) -> SirenEvent {
        let store = self.engine.store();
        let state = match store.load_phenomenon().await {
            Ok(state) => state,
            Err(e) => {
                debug!(error = %e, "phenomenon unavailable for siren");
                return SirenEvent::Silent;
            }
        };

        let event = self.siren.tick(state.warning_active);
        match event {
            SirenEvent::Started(ticks) => {
                warn!(kind = ?state.kind, ticks, "hazard warning: impact imminent");
                self.observer.on_phenomenon(&state).await;
            }
            SirenEvent::Expired => match clear_warning(store.as_ref()).await {
                Ok(cleared) => {
                    info!("hazard warning cleared");
                    self.observer.on_phenomenon(&cleared).await;
                }
                Err(e) => debug!(error = %e, "failed to clear hazard warning"),
            },
            SirenEvent::Tick(_) | SirenEvent::Silent => {}
        }
        event
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use colony_ledger::MemoryLedgerStore;
    use colony_types::{Participant, PhenomenonKind, Role};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::clock::CycleClock;
    use crate::hazard::HazardRoller;
    use crate::phenomenon::{trigger_phenomenon, Activation};
    use crate::settlement::SettlementSettings;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn runner(store: Arc<MemoryLedgerStore>, siren_ticks: u32) -> CycleRunner<MemoryLedgerStore, NoOpObserver> {
        let engine = SettlementEngine::new(
            store,
            CycleClock::new(300).unwrap(),
            SettlementSettings::default(),
            HazardRoller::disabled(),
        );
        let cycle = CycleConfig {
            siren_countdown_ticks: siren_ticks,
            ..CycleConfig::default()
        };
        CycleRunner::new(
            Arc::new(engine),
            &cycle,
            Arc::new(OperatorState::new()),
            NoOpObserver,
        )
    }

    #[tokio::test]
    async fn first_tick_does_not_settle() {
        let store = Arc::new(MemoryLedgerStore::new());
        let p = Participant::new("a@colony.test", Role::User, dec!(1000));
        let id = p.id;
        store.upsert_participant(p).await.unwrap();
        let mut runner = runner(Arc::clone(&store), 10);

        let outcome = runner.tick(at(3000)).await;
        assert_eq!(outcome.cycle_id, 10);
        assert!(outcome.report.is_none());
        let outcome = runner.tick(at(3299)).await;
        assert!(outcome.report.is_none());

        let outcome = runner.tick(at(3300)).await;
        let report = outcome.report.unwrap();
        assert_eq!(report.cycle_id, 11);
        assert_eq!(report.closed, 1);

        let outcome = runner.tick(at(3301)).await;
        assert!(outcome.report.is_none());
        let stored = store.read_participant(id).await.unwrap().unwrap();
        assert_eq!(stored.balance, dec!(890));
    }

    #[tokio::test]
    async fn failed_participant_is_retried_next_poll() {
        let store = Arc::new(MemoryLedgerStore::new());
        let p = Participant::new("a@colony.test", Role::User, dec!(1000));
        let id = p.id;
        store.upsert_participant(p).await.unwrap();
        let mut runner = runner(Arc::clone(&store), 10);

        runner.tick(at(3000)).await;
        store.fail_commits_for(id).await;
        let report = runner.tick(at(3300)).await.report.unwrap();
        assert_eq!(report.failed, 1);
        assert!(!report.is_complete());

        store.heal(id).await;
        let report = runner.tick(at(3301)).await.report.unwrap();
        assert_eq!(report.cycle_id, 11);
        assert_eq!(report.closed, 1);
        assert!(report.is_complete());
        assert!(runner.tick(at(3302)).await.report.is_none());
    }

    #[tokio::test]
    async fn siren_clears_warning_after_countdown() {
        let store = Arc::new(MemoryLedgerStore::new());
        let mut runner = runner(Arc::clone(&store), 2);
        trigger_phenomenon(
            store.as_ref(),
            Activation {
                kind: PhenomenonKind::AlienAttack,
                damage_pct: dec!(10),
                cycles: 3,
            },
        )
        .await
        .unwrap();

        assert_eq!(runner.tick(at(3000)).await.siren, SirenEvent::Started(2));
        assert_eq!(runner.tick(at(3001)).await.siren, SirenEvent::Tick(1));
        assert_eq!(runner.tick(at(3002)).await.siren, SirenEvent::Expired);
        let state = store.load_phenomenon().await.unwrap();
        assert!(!state.warning_active);
        assert!(state.active);
        assert_eq!(runner.tick(at(3003)).await.siren, SirenEvent::Silent);
    }

    #[tokio::test]
    async fn stop_ends_run() {
        let store = Arc::new(MemoryLedgerStore::new());
        let mut runner = runner(store, 10);
        runner.operator.request_stop();
        let summary = runner.run().await;
        assert_eq!(summary.ticks, 0);
    }
}
