//! The storage contract the settlement engine runs against.
//!
//! Every balance change goes through [`LedgerStore::commit_participant`]:
//! the store locks the participant, hands the current persisted record to
//! a mutator, and writes the mutated record together with the records the
//! mutator returned as one atomic unit. Two processes racing on the same
//! participant therefore see each other's writes, and a mutator that finds
//! its cycle already applied can decline with [`Commit::Skip`].

use std::future::Future;

use colony_types::{EconomyConfig, MarketBoard, Participant, ParticipantId, PhenomenonState, TransactionRecord};

/// What a participant mutator wants the store to persist.
#[derive(Debug)]
pub enum Commit {
    /// Persist the mutated participant and append these records.
    Write(Vec<TransactionRecord>),
    /// Discard any mutation; nothing is written.
    Skip,
}

/// The result of a [`LedgerStore::commit_participant`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The mutation was written. Carries the new persisted state.
    Applied(Participant),
    /// The mutator declined. Carries the unchanged persisted state.
    Skipped(Participant),
    /// No participant with that id exists.
    Missing,
}

/// The result of a [`LedgerStore::commit_phenomenon`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhenomenonCommit {
    /// The mutation was written.
    Applied(PhenomenonState),
    /// The mutator declined; the stored state is unchanged.
    Unchanged(PhenomenonState),
}

impl PhenomenonCommit {
    /// The stored state after the commit.
    pub fn into_state(self) -> PhenomenonState {
        match self {
            Self::Applied(state) | Self::Unchanged(state) => state,
        }
    }
}

/// Errors raised by a [`LedgerStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing storage cannot be reached or timed out.
    #[error("ledger store unavailable: {0}")]
    Unavailable(String),

    /// A concurrent writer won the race; the operation may be retried.
    #[error("commit conflict: {0}")]
    Conflict(String),

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored row violates the data model.
    #[error("corrupt record {id}: {reason}")]
    Corrupt {
        /// Identifier of the offending row.
        id: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl StoreError {
    /// Whether retrying the same operation later may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Conflict(_))
    }
}

/// Persistent state of the colony economy.
///
/// Implemented by the in-memory store used in tests and single-process
/// runs, and by the `PostgreSQL` store in `colony-db`.
pub trait LedgerStore: Send + Sync {
    /// Every registered participant, including inactive ones.
    fn participants(&self) -> impl Future<Output = Result<Vec<Participant>, StoreError>> + Send;

    /// Read one participant's persisted state.
    fn read_participant(
        &self,
        id: ParticipantId,
    ) -> impl Future<Output = Result<Option<Participant>, StoreError>> + Send;

    /// Insert or replace a participant record.
    fn upsert_participant(
        &self,
        participant: Participant,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove a participant. Returns whether it existed.
    fn remove_participant(
        &self,
        id: ParticipantId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Atomically read, mutate and write one participant.
    ///
    /// The mutator sees the latest persisted state under an exclusive lock.
    /// On [`Commit::Write`] the participant and the returned records are
    /// persisted together; on [`Commit::Skip`] nothing is written.
    fn commit_participant<F>(
        &self,
        id: ParticipantId,
        mutator: F,
    ) -> impl Future<Output = Result<CommitOutcome, StoreError>> + Send
    where
        F: FnOnce(&mut Participant) -> Commit + Send;

    /// Read the global phenomenon state.
    fn load_phenomenon(&self) -> impl Future<Output = Result<PhenomenonState, StoreError>> + Send;

    /// Atomically read, mutate and write the phenomenon state.
    ///
    /// The mutator returns `true` to persist its change.
    fn commit_phenomenon<F>(
        &self,
        mutator: F,
    ) -> impl Future<Output = Result<PhenomenonCommit, StoreError>> + Send
    where
        F: FnOnce(&mut PhenomenonState) -> bool + Send;

    /// Read the current economy parameters.
    fn load_economy(&self) -> impl Future<Output = Result<EconomyConfig, StoreError>> + Send;

    /// Replace the economy parameters.
    fn save_economy(
        &self,
        economy: EconomyConfig,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Read the market price board.
    fn load_market(&self) -> impl Future<Output = Result<MarketBoard, StoreError>> + Send;

    /// Replace the market price board.
    fn save_market(
        &self,
        market: MarketBoard,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Append a record that does not change a balance by itself.
    fn append_transaction(
        &self,
        record: TransactionRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// The most recent `limit` records for a participant, newest first.
    fn transactions_for(
        &self,
        id: ParticipantId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<TransactionRecord>, StoreError>> + Send;
}
