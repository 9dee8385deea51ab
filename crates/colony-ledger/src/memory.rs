//! In-process [`LedgerStore`] backed by a single async mutex.
//!
//! Every operation takes the same lock, so commits are serialized and
//! atomic. Used by tests and by the engine when `storage: memory` is
//! configured. Supports fault injection for exercising the engine's
//! failure isolation.

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::Mutex;

use colony_types::{
    EconomyConfig, MarketBoard, Participant, ParticipantId, PhenomenonState, TransactionRecord,
};

use crate::ledger::Ledger;
use crate::store::{Commit, CommitOutcome, LedgerStore, PhenomenonCommit, StoreError};

#[derive(Debug, Default)]
struct Inner {
    participants: BTreeMap<ParticipantId, Participant>,
    phenomenon: PhenomenonState,
    economy: EconomyConfig,
    market: MarketBoard,
    ledger: Ledger,
    failing: BTreeSet<ParticipantId>,
    vanishing: BTreeSet<ParticipantId>,
    offline: bool,
}

impl Inner {
    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline {
            Err(StoreError::Unavailable("memory store offline".to_owned()))
        } else {
            Ok(())
        }
    }
}

/// Thread-safe in-memory ledger store.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    inner: Mutex<Inner>,
}

impl MemoryLedgerStore {
    /// Create an empty store with default economy parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with economy parameters and market prices.
    pub fn with_economy(economy: EconomyConfig, market: MarketBoard) -> Self {
        Self {
            inner: Mutex::new(Inner {
                economy,
                market,
                ..Inner::default()
            }),
        }
    }

    /// Make every commit for `id` fail with [`StoreError::Unavailable`].
    pub async fn fail_commits_for(&self, id: ParticipantId) {
        self.inner.lock().await.failing.insert(id);
    }

    /// Delete `id` just before its next commit, as if it were removed
    /// after the participant list was read.
    pub async fn vanish_on_commit(&self, id: ParticipantId) {
        self.inner.lock().await.vanishing.insert(id);
    }

    /// Stop failing commits for `id`.
    pub async fn heal(&self, id: ParticipantId) {
        self.inner.lock().await.failing.remove(&id);
    }

    /// Make every operation fail with [`StoreError::Unavailable`].
    pub async fn set_offline(&self, offline: bool) {
        self.inner.lock().await.offline = offline;
    }

    /// Snapshot of the full transaction history.
    pub async fn ledger(&self) -> Ledger {
        self.inner.lock().await.ledger.clone()
    }
}

impl LedgerStore for MemoryLedgerStore {
    async fn participants(&self) -> Result<Vec<Participant>, StoreError> {
        let inner = self.inner.lock().await;
        inner.check_online()?;
        Ok(inner.participants.values().cloned().collect())
    }

    async fn read_participant(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError> {
        let inner = self.inner.lock().await;
        inner.check_online()?;
        Ok(inner.participants.get(&id).cloned())
    }

    async fn upsert_participant(&self, participant: Participant) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check_online()?;
        inner.participants.insert(participant.id, participant);
        Ok(())
    }

    async fn remove_participant(&self, id: ParticipantId) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check_online()?;
        Ok(inner.participants.remove(&id).is_some())
    }

    async fn commit_participant<F>(
        &self,
        id: ParticipantId,
        mutator: F,
    ) -> Result<CommitOutcome, StoreError>
    where
        F: FnOnce(&mut Participant) -> Commit + Send,
    {
        let mut inner = self.inner.lock().await;
        inner.check_online()?;
        if inner.failing.contains(&id) {
            return Err(StoreError::Unavailable(format!(
                "injected commit failure for {id}"
            )));
        }

        if inner.vanishing.remove(&id) {
            inner.participants.remove(&id);
        }
        let Some(current) = inner.participants.get(&id).cloned() else {
            return Ok(CommitOutcome::Missing);
        };

        // Mutate a copy so a skipped commit leaves no trace.
        let mut working = current.clone();
        match mutator(&mut working) {
            Commit::Skip => Ok(CommitOutcome::Skipped(current)),
            Commit::Write(records) => {
                for record in records {
                    inner.ledger.append(record);
                }
                inner.participants.insert(id, working.clone());
                Ok(CommitOutcome::Applied(working))
            }
        }
    }

    async fn load_phenomenon(&self) -> Result<PhenomenonState, StoreError> {
        let inner = self.inner.lock().await;
        inner.check_online()?;
        Ok(inner.phenomenon.clone())
    }

    async fn commit_phenomenon<F>(&self, mutator: F) -> Result<PhenomenonCommit, StoreError>
    where
        F: FnOnce(&mut PhenomenonState) -> bool + Send,
    {
        let mut inner = self.inner.lock().await;
        inner.check_online()?;
        let mut working = inner.phenomenon.clone();
        if mutator(&mut working) {
            inner.phenomenon = working.clone();
            Ok(PhenomenonCommit::Applied(working))
        } else {
            Ok(PhenomenonCommit::Unchanged(inner.phenomenon.clone()))
        }
    }

    async fn load_economy(&self) -> Result<EconomyConfig, StoreError> {
        let inner = self.inner.lock().await;
        inner.check_online()?;
        Ok(inner.economy.clone())
    }

    async fn save_economy(&self, economy: EconomyConfig) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check_online()?;
        inner.economy = economy;
        Ok(())
    }

    async fn load_market(&self) -> Result<MarketBoard, StoreError> {
        let inner = self.inner.lock().await;
        inner.check_online()?;
        Ok(inner.market.clone())
    }

    async fn save_market(&self, market: MarketBoard) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check_online()?;
        inner.market = market;
        Ok(())
    }

    async fn append_transaction(&self, record: TransactionRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check_online()?;
        inner.ledger.append(record);
        Ok(())
    }

    async fn transactions_for(
        &self,
        id: ParticipantId,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let inner = self.inner.lock().await;
        inner.check_online()?;
        Ok(inner.ledger.recent(id, limit).into_iter().cloned().collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use colony_types::{Role, TransactionKind};

    use super::*;
    use crate::TransactionBuilder;

    fn seeded(balance: Decimal) -> Participant {
        Participant::new("a@colony.test", Role::User, balance)
    }

    #[tokio::test]
    async fn write_persists_balance_and_records() {
        let store = MemoryLedgerStore::new();
        let p = seeded(dec!(100));
        let id = p.id;
        store.upsert_participant(p).await.unwrap();

        let outcome = store
            .commit_participant(id, |p| {
                p.balance = dec!(50);
                let record = TransactionBuilder::new(p.id, TransactionKind::InsurancePurchase)
                    .amount(dec!(-50))
                    .detail("Poliza".to_owned())
                    .build()
                    .unwrap();
                Commit::Write(vec![record])
            })
            .await
            .unwrap();

        assert!(matches!(outcome, CommitOutcome::Applied(ref p) if p.balance == dec!(50)));
        assert_eq!(store.transactions_for(id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn skip_discards_mutation() {
        let store = MemoryLedgerStore::new();
        let p = seeded(dec!(100));
        let id = p.id;
        store.upsert_participant(p).await.unwrap();

        let outcome = store
            .commit_participant(id, |p| {
                p.balance = Decimal::ZERO;
                Commit::Skip
            })
            .await
            .unwrap();

        assert!(matches!(outcome, CommitOutcome::Skipped(ref p) if p.balance == dec!(100)));
        let stored = store.read_participant(id).await.unwrap().unwrap();
        assert_eq!(stored.balance, dec!(100));
    }

    #[tokio::test]
    async fn missing_participant() {
        let store = MemoryLedgerStore::new();
        let outcome = store
            .commit_participant(ParticipantId::new(), |_| Commit::Skip)
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Missing);
    }

    #[tokio::test]
    async fn vanishing_participant_is_missing_at_commit() {
        let store = MemoryLedgerStore::new();
        let p = seeded(dec!(100));
        let id = p.id;
        store.upsert_participant(p).await.unwrap();
        store.vanish_on_commit(id).await;

        assert_eq!(store.participants().await.unwrap().len(), 1);
        let outcome = store
            .commit_participant(id, |_| Commit::Write(Vec::new()))
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Missing);
        assert!(store.read_participant(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn injected_failure_is_transient() {
        let store = MemoryLedgerStore::new();
        let p = seeded(dec!(100));
        let id = p.id;
        store.upsert_participant(p).await.unwrap();
        store.fail_commits_for(id).await;

        let err = store.commit_participant(id, |_| Commit::Skip).await.unwrap_err();
        assert!(err.is_transient());

        store.heal(id).await;
        assert!(store.commit_participant(id, |_| Commit::Skip).await.is_ok());
    }

    #[tokio::test]
    async fn offline_store_rejects_reads() {
        let store = MemoryLedgerStore::new();
        store.set_offline(true).await;
        assert!(matches!(
            store.load_phenomenon().await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn phenomenon_commit_respects_decline() {
        let store = MemoryLedgerStore::new();
        let state = store
            .commit_phenomenon(|s| {
                s.active = true;
                false
            })
            .await
            .unwrap()
            .into_state();
        assert!(!state.active);

        let state = store
            .commit_phenomenon(|s| {
                s.active = true;
                true
            })
            .await
            .unwrap();
        assert!(matches!(state, PhenomenonCommit::Applied(ref s) if s.active));
    }
}
