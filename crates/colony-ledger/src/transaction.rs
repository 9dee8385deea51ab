//! Transaction builders and validation for the append-only history.
//!
//! Provides a [`TransactionBuilder`] that enforces the sign convention of
//! each [`TransactionKind`]: taxes and damage are debits, dividends are
//! credits. Builders validate inputs before producing a
//! [`TransactionRecord`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use colony_types::{
    AmountSign, ParticipantId, TransactionId, TransactionKind, TransactionRecord,
    TransactionStatus,
};

use crate::LedgerError;

/// Builder for constructing validated [`TransactionRecord`] values.
///
/// # Examples
///
/// ```
/// use colony_ledger::TransactionBuilder;
/// use colony_types::{ParticipantId, TransactionKind};
/// use rust_decimal::Decimal;
///
/// let record = TransactionBuilder::new(ParticipantId::new(), TransactionKind::LifeCost)
///     .amount(Decimal::new(-10, 0))
///     .detail("Vida: -10Bs".to_owned())
///     .cycle(42)
///     .build();
///
/// assert!(record.is_ok());
/// ```
#[derive(Debug)]
pub struct TransactionBuilder {
    participant_id: ParticipantId,
    kind: TransactionKind,
    amount: Option<Decimal>,
    detail: Option<String>,
    cycle_id: Option<u64>,
    created_at: Option<DateTime<Utc>>,
}

impl TransactionBuilder {
    /// Start building a record of `kind` for `participant_id`.
    pub const fn new(participant_id: ParticipantId, kind: TransactionKind) -> Self {
        Self {
            participant_id,
            kind,
            amount: None,
            detail: None,
            cycle_id: None,
            created_at: None,
        }
    }

    /// Set the signed amount applied to the balance.
    #[must_use]
    pub const fn amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Set the human-readable detail line.
    #[must_use]
    pub fn detail(mut self, detail: String) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Tag the record with the settlement cycle it belongs to.
    #[must_use]
    pub const fn cycle(mut self, cycle_id: u64) -> Self {
        self.cycle_id = Some(cycle_id);
        self
    }

    /// Override the creation timestamp (defaults to now).
    #[must_use]
    pub const fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Validate inputs and produce a [`TransactionRecord`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::MissingField`] if amount or detail is unset,
    /// [`LedgerError::ZeroAmount`] if the amount is zero for a kind that
    /// forbids it, and [`LedgerError::WrongSign`] if the amount's sign
    /// contradicts the kind.
    pub fn build(self) -> Result<TransactionRecord, LedgerError> {
        let amount = self.amount.ok_or(LedgerError::MissingField("amount"))?;
        let detail = self.detail.ok_or(LedgerError::MissingField("detail"))?;

        if amount.is_zero() {
            if !self.kind.allows_zero() {
                return Err(LedgerError::ZeroAmount { kind: self.kind });
            }
        } else {
            let sign_ok = match self.kind.sign() {
                AmountSign::Debit => amount.is_sign_negative(),
                AmountSign::Credit => amount.is_sign_positive(),
                AmountSign::Either => true,
            };
            if !sign_ok {
                return Err(LedgerError::WrongSign {
                    kind: self.kind,
                    amount,
                });
            }
        }

        Ok(TransactionRecord {
            id: TransactionId::new(),
            participant_id: self.participant_id,
            kind: self.kind,
            amount,
            detail,
            cycle_id: self.cycle_id,
            status: TransactionStatus::Approved,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        })
    }
}
