//! Participant actions outside the settlement cycle: manual work and
//! investment.
//!
//! Work credits a fixed reward. Investment only stamps the participant so
//! the next close waives the no-investment penalty.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use colony_ledger::{Commit, CommitOutcome, LedgerError, LedgerStore, StoreError, TransactionBuilder};
use colony_types::{Participant, ParticipantId, TransactionKind};

/// Errors from participant actions.
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    /// No such participant.
    #[error("participant not found: {0}")]
    UnknownParticipant(ParticipantId),

    /// The store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },

    /// The work record failed validation.
    #[error("ledger error: {source}")]
    Ledger {
        /// The underlying ledger error.
        #[from]
        source: LedgerError,
    },

    /// Crediting the reward overflowed.
    #[error("arithmetic overflow applying reward")]
    ArithmeticOverflow,
}

/// Manual jobs offered by the production centre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkJob {
    /// Lunar dust extraction.
    Mining,
    /// Turbine maintenance.
    Maintenance,
    /// Cell recharge.
    Recharge,
}

impl WorkJob {
    /// Balance credited for one unit of this job.
    pub const fn reward(self) -> Decimal {
        match self {
            Self::Mining => Decimal::from_parts(5, 0, 0, false, 0),
            Self::Maintenance => Decimal::from_parts(15, 0, 0, false, 0),
            Self::Recharge => Decimal::from_parts(10, 0, 0, false, 0),
        }
    }

    /// Name used in the record detail.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Mining => "Mineria",
            Self::Maintenance => "Mantenimiento",
            Self::Recharge => "Recarga",
        }
    }
}

/// Credit the reward for `job` to `id`.
///
/// # Errors
///
/// Returns [`ActivityError::UnknownParticipant`] or the store's failure.
pub async fn record_work<S: LedgerStore>(
    store: &S,
    id: ParticipantId,
    job: WorkJob,
    now: DateTime<Utc>,
) -> Result<Participant, ActivityError> {
    let reward = job.reward();
    let mut failure: Option<ActivityError> = None;
    let outcome = store
        .commit_participant(id, |participant| {
            let record = TransactionBuilder::new(participant.id, TransactionKind::Work)
                .amount(reward)
                .detail(format!("{}: +{}Bs", job.label(), reward))
                .at(now)
                .build();
            let balance = participant.balance.checked_add(reward);
            match (record, balance) {
                (Ok(record), Some(balance)) => {
                    participant.balance = balance;
                    Commit::Write(vec![record])
                }
                (Err(e), _) => {
                    failure = Some(e.into());
                    Commit::Skip
                }
                (_, None) => {
                    failure = Some(ActivityError::ArithmeticOverflow);
                    Commit::Skip
                }
            }
        })
        .await?;

    if let Some(e) = failure {
        return Err(e);
    }
    match outcome {
        CommitOutcome::Applied(participant) => {
            debug!(participant_id = %id, job = ?job, reward = %reward, "work recorded");
            Ok(participant)
        }
        CommitOutcome::Skipped(_) | CommitOutcome::Missing => {
            Err(ActivityError::UnknownParticipant(id))
        }
    }
}

/// Mark `id` as having invested at `at`.
///
/// # Errors
///
/// Returns [`ActivityError::UnknownParticipant`] or the store's failure.
pub async fn record_investment<S: LedgerStore>(
    store: &S,
    id: ParticipantId,
    at: DateTime<Utc>,
) -> Result<Participant, ActivityError> {
    let outcome = store
        .commit_participant(id, |participant| {
            if participant.last_investment_at.is_some_and(|prev| prev >= at) {
                return Commit::Skip;
            }
            participant.last_investment_at = Some(at);
            Commit::Write(Vec::new())
        })
        .await?;

    match outcome {
        CommitOutcome::Applied(participant) | CommitOutcome::Skipped(participant) => {
            debug!(participant_id = %id, at = %at, "investment recorded");
            Ok(participant)
        }
        CommitOutcome::Missing => Err(ActivityError::UnknownParticipant(id)),
    }
}
