//! The settlement pass: hazard damage, phenomenon advance, financial close.
//!
//! A pass for cycle `N` runs these phases:
//!
//! 1. **Snapshot** -- read phenomenon, economy, market board and the
//!    participant list. Failure here abandons the whole pass.
//! 2. **Advance** -- commit the phenomenon advance for `N`. The advance is
//!    guarded on `N`, and the strike it records is the one every process
//!    uses for `N`. A failed commit falls back to the snapshot.
//! 3. **Settle** -- for every participant, concurrently: commit hazard
//!    damage, then commit the financial close. Both commits re-read the
//!    persisted record under the store's lock and are keyed on `N`, so a
//!    second pass (or a racing process) turns them into no-ops. Failures
//!    stay with the participant they happened to.
//!
//! Tax bases are read inside the close commit, after this participant's
//! damage for `N` is durable.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use colony_ledger::{Commit, CommitOutcome, LedgerError, LedgerStore, StoreError, TransactionBuilder};
use colony_types::{
    EconomyConfig, MarketBoard, Participant, ParticipantId, PhenomenonState, Strike,
    TransactionKind, TransactionRecord,
};

use crate::clock::CycleClock;
use crate::close::{compute_close, CloseError, CloseInput};
use crate::config::SettlementConfig;
use crate::hazard::{apply_damage, DamageVerdict, HazardError, HazardRoller};
use crate::phenomenon::{activate, advance, strike_for, PhenomenonTransition};

/// Errors raised during a settlement pass.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    /// The store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },

    /// A store call did not finish in time.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// What was being attempted.
        operation: &'static str,
        /// The bound that was exceeded.
        timeout_ms: u64,
    },

    /// The close computation failed.
    #[error("close error: {source}")]
    Close {
        /// The underlying close error.
        #[from]
        source: CloseError,
    },

    /// The damage computation failed.
    #[error("hazard error: {source}")]
    Hazard {
        /// The underlying hazard error.
        #[from]
        source: HazardError,
    },

    /// A record failed validation.
    #[error("ledger error: {source}")]
    Ledger {
        /// The underlying ledger error.
        #[from]
        source: LedgerError,
    },

    /// Applying a delta overflowed.
    #[error("arithmetic overflow applying {0}")]
    ArithmeticOverflow(&'static str),
}

impl SettlementError {
    /// Whether the failure may clear on a later attempt.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Store { source } => source.is_transient(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

/// Fan-out and timeout settings for a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementSettings {
    /// Participants settled concurrently.
    pub max_concurrent_commits: usize,
    /// Upper bound on each store call.
    pub commit_timeout: Duration,
}

impl From<&SettlementConfig> for SettlementSettings {
    fn from(config: &SettlementConfig) -> Self {
        Self {
            max_concurrent_commits: config.max_concurrent_commits.max(1),
            commit_timeout: Duration::from_millis(config.commit_timeout_ms),
        }
    }
}

impl Default for SettlementSettings {
    fn default() -> Self {
        Self::from(&SettlementConfig::default())
    }
}

/// Everything read once at the start of a pass.
#[derive(Debug, Clone)]
pub struct PassContext {
    /// The cycle being settled.
    pub cycle_id: u64,
    /// Instant the pass started; insurance windows are judged against it.
    pub now: DateTime<Utc>,
    /// Economy parameters, fixed for the pass.
    pub economy: EconomyConfig,
    /// Market prices, fixed for the pass.
    pub market: MarketBoard,
    /// Damage to apply this cycle, if a hazard is striking.
    pub strike: Option<Strike>,
    /// Investments at or after this instant avoid the penalty.
    pub investment_window_start: DateTime<Utc>,
}

/// Outcome of the damage step for one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardStep {
    /// No hazard is striking this cycle.
    Calm,
    /// Admin or insured; the verdict is recorded for the cycle.
    Exempt,
    /// The damage step or the close already ran for this cycle.
    AlreadyApplied,
    /// Balance not positive; guard advanced, nothing taken.
    Nothing,
    /// Balance reduced by this (negative) amount.
    Damaged(Decimal),
    /// The participant vanished; the close reports it as missing too.
    Missing,
    /// The commit failed; the close is deferred.
    Failed,
}

/// Outcome of the close step for one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseStep {
    /// Balance moved by this net delta.
    Closed(Decimal),
    /// The close for this cycle was already committed.
    AlreadySettled,
    /// Participant is not active.
    Inactive,
    /// The participant vanished between enumeration and commit.
    Missing,
    /// The commit failed.
    Failed,
    /// Not attempted because the damage step failed.
    Deferred,
}

/// Both steps for one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParticipantSettlement {
    /// Who was settled.
    pub participant_id: ParticipantId,
    /// The damage step.
    pub hazard: HazardStep,
    /// The close step.
    pub close: CloseStep,
}

impl ParticipantSettlement {
    /// Whether either step hit a failure worth retrying.
    pub const fn failed(&self) -> bool {
        matches!(self.hazard, HazardStep::Failed) || matches!(self.close, CloseStep::Failed)
    }
}

/// Summary of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// The cycle settled.
    pub cycle_id: u64,
    /// What happened to the phenomenon.
    pub phenomenon: PhenomenonTransition,
    /// The strike applied, if any.
    pub strike: Option<Strike>,
    /// Participants enumerated.
    pub participants: usize,
    /// Participants damaged.
    pub damaged: usize,
    /// Participants skipped by the damage step as exempt.
    pub exempt: usize,
    /// Closes committed by this pass.
    pub closed: usize,
    /// Closes already committed for this cycle.
    pub already_settled: usize,
    /// Participants skipped as inactive.
    pub inactive: usize,
    /// Participants that vanished mid-pass.
    pub missing: usize,
    /// Participants with a failed commit.
    pub failed: usize,
    /// Sum of every balance movement this pass committed.
    pub net_delta: Decimal,
    /// Wall time spent on the pass.
    pub duration_ms: u64,
}

impl PassReport {
    fn new(cycle_id: u64, phenomenon: PhenomenonTransition, strike: Option<Strike>) -> Self {
        Self {
            cycle_id,
            phenomenon,
            strike,
            participants: 0,
            damaged: 0,
            exempt: 0,
            closed: 0,
            already_settled: 0,
            inactive: 0,
            missing: 0,
            failed: 0,
            net_delta: Decimal::ZERO,
            duration_ms: 0,
        }
    }

    fn tally(&mut self, settlement: &ParticipantSettlement) {
        self.participants = self.participants.saturating_add(1);
        match settlement.hazard {
            HazardStep::Damaged(amount) => {
                self.damaged = self.damaged.saturating_add(1);
                self.net_delta = self.net_delta.checked_add(amount).unwrap_or(self.net_delta);
            }
            HazardStep::Exempt => self.exempt = self.exempt.saturating_add(1),
            _ => {}
        }
        match settlement.close {
            CloseStep::Closed(net) => {
                self.closed = self.closed.saturating_add(1);
                self.net_delta = self.net_delta.checked_add(net).unwrap_or(self.net_delta);
            }
            CloseStep::AlreadySettled => {
                self.already_settled = self.already_settled.saturating_add(1);
            }
            CloseStep::Inactive => self.inactive = self.inactive.saturating_add(1),
            CloseStep::Missing => self.missing = self.missing.saturating_add(1),
            CloseStep::Failed | CloseStep::Deferred => {}
        }
        if settlement.failed() {
            self.failed = self.failed.saturating_add(1);
        }
    }

    /// Whether every commit this pass attempted went through.
    ///
    /// An incomplete pass should be retried for the same cycle.
    pub const fn is_complete(&self) -> bool {
        self.failed == 0 && !matches!(self.phenomenon, PhenomenonTransition::Failed)
    }
}

/// Runs settlement passes against a [`LedgerStore`].
#[derive(Debug)]
pub struct SettlementEngine<S> {
    store: Arc<S>,
    clock: CycleClock,
    settings: SettlementSettings,
    roller: HazardRoller,
}

impl<S: LedgerStore> SettlementEngine<S> {
    /// Create an engine over `store`.
    pub const fn new(
        store: Arc<S>,
        clock: CycleClock,
        settings: SettlementSettings,
        roller: HazardRoller,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
            roller,
        }
    }

    /// The backing store.
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The cycle clock.
    pub const fn clock(&self) -> &CycleClock {
        &self.clock
    }

    /// Run `fut` under the commit timeout.
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, SettlementError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.settings.commit_timeout, fut).await {
            Ok(result) => result.map_err(SettlementError::from),
            Err(elapsed) => {
                debug!(operation, %elapsed, "store call timed out");
                Err(SettlementError::Timeout {
                    operation,
                    timeout_ms: u64::try_from(self.settings.commit_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                })
            }
        }
    }

    /// Read the per-pass inputs and commit the phenomenon advance.
    ///
    /// # Errors
    ///
    /// Returns [`SettlementError`] if any snapshot read fails. A failed
    /// phenomenon commit is not an error; it shows up as
    /// [`PhenomenonTransition::Failed`].
    pub async fn prepare(
        &self,
        cycle_id: u64,
        now: DateTime<Utc>,
    ) -> Result<(PassContext, PhenomenonTransition), SettlementError> {
        let phenomenon = self
            .bounded("load phenomenon", self.store.load_phenomenon())
            .await?;
        let economy = self.bounded("load economy", self.store.load_economy()).await?;
        let market = self.bounded("load market", self.store.load_market()).await?;

        let (transition, strike) = self.advance_phenomenon(cycle_id, &phenomenon).await;

        let context = PassContext {
            cycle_id,
            now,
            economy,
            market,
            strike,
            investment_window_start: self.clock.investment_window_start(cycle_id),
        };
        Ok((context, transition))
    }

    async fn advance_phenomenon(
        &self,
        cycle_id: u64,
        snapshot: &PhenomenonState,
    ) -> (PhenomenonTransition, Option<Strike>) {
        let roller = &self.roller;
        let mut transition = PhenomenonTransition::AlreadyAdvanced;
        let result = self
            .bounded(
                "phenomenon commit",
                self.store.commit_phenomenon(|state| {
                    let mut step = advance(state, cycle_id);
                    if step.wrote() && !state.active {
                        if let Some(rolled) = roller.roll(cycle_id) {
                            if activate(state, &rolled).is_ok() {
                                step = PhenomenonTransition::Triggered {
                                    kind: rolled.kind,
                                    damage_pct: rolled.damage_pct,
                                    cycles: rolled.cycles,
                                };
                            }
                        }
                    }
                    transition = step;
                    step.wrote()
                }),
            )
            .await;

        match result {
            Ok(commit) => {
                let state = commit.into_state();
                (transition, strike_for(&state, cycle_id))
            }
            Err(e) => {
                warn!(cycle_id, error = %e, "phenomenon commit failed, using snapshot");
                (PhenomenonTransition::Failed, strike_for(snapshot, cycle_id))
            }
        }
    }

    /// Settle every registered participant for `cycle_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SettlementError`] only if the pass could not start. Per
    /// participant failures are counted in the report.
    pub async fn run_pass(
        &self,
        cycle_id: u64,
        now: DateTime<Utc>,
    ) -> Result<PassReport, SettlementError> {
        let started = Instant::now();
        let (context, transition) = self.prepare(cycle_id, now).await?;
        let participants = self
            .bounded("list participants", self.store.participants())
            .await?;

        info!(
            cycle_id,
            participants = participants.len(),
            strike = ?context.strike,
            phenomenon = ?transition,
            "settlement pass starting"
        );

        let settlements: Vec<ParticipantSettlement> = stream::iter(participants.iter())
            .map(|participant| self.settle_participant(&context, participant))
            .buffer_unordered(self.settings.max_concurrent_commits.max(1))
            .collect()
            .await;

        let mut report = PassReport::new(cycle_id, transition, context.strike);
        for settlement in &settlements {
            report.tally(settlement);
        }
        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            cycle_id,
            damaged = report.damaged,
            closed = report.closed,
            already_settled = report.already_settled,
            missing = report.missing,
            failed = report.failed,
            net_delta = %report.net_delta,
            duration_ms = report.duration_ms,
            "settlement pass finished"
        );
        Ok(report)
    }

    /// Damage then close one participant.
    pub async fn settle_participant(
        &self,
        context: &PassContext,
        participant: &Participant,
    ) -> ParticipantSettlement {
        let id = participant.id;
        let hazard = match context.strike {
            Some(strike) => self.damage_participant(context, id, strike).await,
            None => HazardStep::Calm,
        };

        let close = match hazard {
            HazardStep::Missing => CloseStep::Missing,
            HazardStep::Failed => CloseStep::Deferred,
            _ if !participant.active => CloseStep::Inactive,
            _ => self.close_participant(context, id).await,
        };

        ParticipantSettlement {
            participant_id: id,
            hazard,
            close,
        }
    }

    /// Commit hazard damage for one participant.
    pub async fn damage_participant(
        &self,
        context: &PassContext,
        id: ParticipantId,
        strike: Strike,
    ) -> HazardStep {
        let now = context.now;
        let mut step = HazardStep::Failed;
        let mut failure: Option<HazardError> = None;

        let outcome = self
            .bounded(
                "hazard commit",
                self.store.commit_participant(id, |participant| {
                    match apply_damage(participant, &strike, now) {
                        Ok(DamageVerdict::Damaged(record)) => {
                            step = HazardStep::Damaged(record.amount);
                            Commit::Write(vec![record])
                        }
                        Ok(DamageVerdict::Nothing) => {
                            step = HazardStep::Nothing;
                            Commit::Write(Vec::new())
                        }
                        Ok(DamageVerdict::Exempt) => {
                            step = HazardStep::Exempt;
                            Commit::Write(Vec::new())
                        }
                        Ok(DamageVerdict::AlreadyApplied) => {
                            step = HazardStep::AlreadyApplied;
                            Commit::Skip
                        }
                        Err(e) => {
                            failure = Some(e);
                            Commit::Skip
                        }
                    }
                }),
            )
            .await;

        match outcome {
            Ok(CommitOutcome::Missing) => {
                debug!(participant_id = %id, cycle_id = context.cycle_id, "participant vanished before damage");
                HazardStep::Missing
            }
            Ok(_) => {
                if let Some(e) = failure {
                    warn!(participant_id = %id, cycle_id = context.cycle_id, error = %e, "hazard damage failed");
                    return HazardStep::Failed;
                }
                step
            }
            Err(e) => {
                warn!(participant_id = %id, cycle_id = context.cycle_id, error = %e, "hazard commit failed");
                HazardStep::Failed
            }
        }
    }

    /// Commit the financial close for one participant.
    ///
    /// Idempotent per cycle: a participant already settled for
    /// `context.cycle_id` is left untouched.
    pub async fn close_participant(&self, context: &PassContext, id: ParticipantId) -> CloseStep {
        let mut step = CloseStep::Failed;
        let mut failure: Option<SettlementError> = None;

        let outcome = self
            .bounded(
                "close commit",
                self.store.commit_participant(id, |participant| {
                    if participant.has_settled(context.cycle_id) {
                        step = CloseStep::AlreadySettled;
                        return Commit::Skip;
                    }
                    if !participant.active {
                        step = CloseStep::Inactive;
                        return Commit::Skip;
                    }
                    match apply_close(participant, context) {
                        Ok((record, net)) => {
                            step = CloseStep::Closed(net);
                            Commit::Write(vec![record])
                        }
                        Err(e) => {
                            failure = Some(e);
                            Commit::Skip
                        }
                    }
                }),
            )
            .await;

        match outcome {
            Ok(CommitOutcome::Missing) => {
                debug!(participant_id = %id, cycle_id = context.cycle_id, "participant vanished before close");
                CloseStep::Missing
            }
            Ok(_) => {
                if let Some(e) = failure {
                    warn!(participant_id = %id, cycle_id = context.cycle_id, error = %e, "financial close failed");
                    return CloseStep::Failed;
                }
                if let CloseStep::Closed(net) = step {
                    debug!(participant_id = %id, cycle_id = context.cycle_id, net = %net, "participant closed");
                }
                step
            }
            Err(e) => {
                warn!(participant_id = %id, cycle_id = context.cycle_id, error = %e, "close commit failed");
                CloseStep::Failed
            }
        }
    }
}

/// Compute the close from the persisted record and apply it in place.
fn apply_close(
    participant: &mut Participant,
    context: &PassContext,
) -> Result<(TransactionRecord, Decimal), SettlementError> {
    let breakdown = compute_close(&CloseInput {
        participant,
        economy: &context.economy,
        market: &context.market,
        investment_window_start: context.investment_window_start,
    })?;

    let record = TransactionBuilder::new(participant.id, TransactionKind::Dividends)
        .amount(breakdown.net)
        .detail(breakdown.detail())
        .cycle(context.cycle_id)
        .at(context.now)
        .build()?;

    participant.balance = participant
        .balance
        .checked_add(breakdown.net)
        .ok_or(SettlementError::ArithmeticOverflow("balance"))?;
    participant.cycles_completed = participant
        .cycles_completed
        .checked_add(1)
        .ok_or(SettlementError::ArithmeticOverflow("cycles_completed"))?;
    participant.last_settled_cycle = Some(context.cycle_id);
    Ok((record, breakdown.net))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use colony_ledger::MemoryLedgerStore;
    use colony_types::Role;
    use rust_decimal_macros::dec;

    use super::*;

    fn engine(store: Arc<MemoryLedgerStore>) -> SettlementEngine<MemoryLedgerStore> {
        SettlementEngine::new(
            store,
            CycleClock::new(300).unwrap(),
            SettlementSettings::default(),
            HazardRoller::disabled(),
        )
    }

    #[tokio::test]
    async fn close_twice_applies_once() {
        let store = Arc::new(MemoryLedgerStore::new());
        let p = Participant::new("a@colony.test", Role::User, dec!(1000));
        let id = p.id;
        store.upsert_participant(p).await.unwrap();
        let engine = engine(Arc::clone(&store));

        let (context, _) = engine.prepare(10, Utc::now()).await.unwrap();
        assert_eq!(
            engine.close_participant(&context, id).await,
            CloseStep::Closed(dec!(-110))
        );
        assert_eq!(
            engine.close_participant(&context, id).await,
            CloseStep::AlreadySettled
        );

        let stored = store.read_participant(id).await.unwrap().unwrap();
        assert_eq!(stored.balance, dec!(890));
        assert_eq!(stored.cycles_completed, 1);
        assert_eq!(store.transactions_for(id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn inactive_participant_is_not_closed() {
        let store = Arc::new(MemoryLedgerStore::new());
        let mut p = Participant::new("a@colony.test", Role::User, dec!(1000));
        p.active = false;
        store.upsert_participant(p).await.unwrap();

        let report = engine(Arc::clone(&store)).run_pass(10, Utc::now()).await.unwrap();
        assert_eq!(report.inactive, 1);
        assert_eq!(report.closed, 0);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn vanished_participant_is_missing() {
        let store = Arc::new(MemoryLedgerStore::new());
        let engine = engine(Arc::clone(&store));
        let (context, _) = engine.prepare(10, Utc::now()).await.unwrap();
        assert_eq!(
            engine.close_participant(&context, ParticipantId::new()).await,
            CloseStep::Missing
        );
    }

    #[tokio::test]
    async fn offline_store_abandons_pass() {
        let store = Arc::new(MemoryLedgerStore::new());
        store.set_offline(true).await;
        let result = engine(Arc::clone(&store)).run_pass(10, Utc::now()).await;
        assert!(result.is_err_and(|e| e.is_transient()));
    }

    #[test]
    fn vanished_participant_counts_once() {
        let mut report = PassReport::new(10, PhenomenonTransition::AlreadyAdvanced, None);
        report.tally(&ParticipantSettlement {
            participant_id: ParticipantId::new(),
            hazard: HazardStep::Missing,
            close: CloseStep::Missing,
        });
        assert_eq!(report.participants, 1);
        assert_eq!(report.missing, 1);
        assert_eq!(report.failed, 0);
        assert!(report.is_complete());
    }

    #[test]
    fn settings_never_zero_width() {
        let settings = SettlementSettings::from(&SettlementConfig {
            max_concurrent_commits: 0,
            commit_timeout_ms: 10,
        });
        assert_eq!(settings.max_concurrent_commits, 1);
        assert_eq!(settings.commit_timeout, Duration::from_millis(10));
    }
}
