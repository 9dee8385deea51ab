//! Insurance purchase: trade balance for a hazard protection window.
//!
//! The purchase is one atomic commit on the participant. It is independent
//! of the settlement cycle; the damage step reads `protected_until` inside
//! its own commit, so a purchase either lands before the damage commit for
//! a cycle or after it, never halfway.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use colony_ledger::{Commit, CommitOutcome, LedgerError, LedgerStore, StoreError, TransactionBuilder};
use colony_types::{Participant, ParticipantId, TransactionKind};

/// Errors from an insurance purchase.
#[derive(Debug, thiserror::Error)]
pub enum InsuranceError {
    /// The balance does not cover the price. Nothing was changed.
    #[error("insufficient funds: balance {balance} is below price {price}")]
    InsufficientFunds {
        /// Balance at the time of the attempt.
        balance: Decimal,
        /// Policy price at the time of the attempt.
        price: Decimal,
    },

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

    /// The purchase record failed validation.
    #[error("ledger error: {source}")]
    Ledger {
        /// The underlying ledger error.
        #[from]
        source: LedgerError,
    },

    /// Debiting the price overflowed.
    #[error("arithmetic overflow applying insurance")]
    ArithmeticOverflow,
}

/// The result of a successful purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsuranceReceipt {
    /// Price debited.
    pub price: Decimal,
    /// End of the new protection window.
    pub protected_until: DateTime<Utc>,
    /// The participant after the purchase.
    pub participant: Participant,
}

/// Buy `protection` worth of hazard exemption for `id` at the stored price.
///
/// # Errors
///
/// Returns [`InsuranceError::InsufficientFunds`] when the balance is below
/// the price, leaving balance and window untouched.
pub async fn purchase_insurance<S: LedgerStore>(
    store: &S,
    id: ParticipantId,
    now: DateTime<Utc>,
    protection: Duration,
) -> Result<InsuranceReceipt, InsuranceError> {
    let price = store.load_economy().await?.insurance_price;
    let protected_until = now
        .checked_add_signed(protection)
        .ok_or(InsuranceError::ArithmeticOverflow)?;

    let mut failure: Option<InsuranceError> = None;
    let outcome = store
        .commit_participant(id, |participant| {
            match debit_policy(participant, price, protected_until, now) {
                Ok(records) => Commit::Write(records),
                Err(e) => {
                    failure = Some(e);
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
            info!(
                participant_id = %id,
                price = %price,
                protected_until = %protected_until,
                "insurance purchased"
            );
            Ok(InsuranceReceipt {
                price,
                protected_until,
                participant,
            })
        }
        CommitOutcome::Skipped(_) | CommitOutcome::Missing => {
            Err(InsuranceError::UnknownParticipant(id))
        }
    }
}

fn debit_policy(
    participant: &mut Participant,
    price: Decimal,
    protected_until: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Vec<colony_types::TransactionRecord>, InsuranceError> {
    if participant.balance < price {
        return Err(InsuranceError::InsufficientFunds {
            balance: participant.balance,
            price,
        });
    }

    let mut records = Vec::new();
    if !price.is_zero() {
        let amount = Decimal::ZERO
            .checked_sub(price)
            .ok_or(InsuranceError::ArithmeticOverflow)?;
        records.push(
            TransactionBuilder::new(participant.id, TransactionKind::InsurancePurchase)
                .amount(amount)
                .detail(format!("Poliza: -{}Bs", price.normalize()))
                .at(now)
                .build()?,
        );
        participant.balance = participant
            .balance
            .checked_add(amount)
            .ok_or(InsuranceError::ArithmeticOverflow)?;
    }
    participant.protected_until = Some(protected_until);
    Ok(records)
}
