//! Balance reconciliation against the transaction history.
//!
//! A participant's balance must always equal its opening balance plus
//! the sum of every record committed for it. Commits write the balance
//! and the record atomically, so a drift means storage corruption or a
//! write that bypassed the store.

use rust_decimal::Decimal;

use colony_types::TransactionRecord;

use crate::LedgerError;

/// The result of reconciling one participant's balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The balance matches the history.
    Balanced,
    /// The balance does not match the history.
    Drift {
        /// Opening balance plus the sum of all records.
        expected: Decimal,
        /// The balance actually stored.
        actual: Decimal,
    },
}

impl Reconciliation {
    /// Whether the balance matched.
    pub const fn is_balanced(&self) -> bool {
        matches!(self, Self::Balanced)
    }
}

/// Reconcile `current` against `opening` plus the amounts in `records`.
///
/// # Errors
///
/// Returns [`LedgerError::Overflow`] if summing the history overflows.
pub fn reconcile<'a, I>(
    opening: Decimal,
    current: Decimal,
    records: I,
) -> Result<Reconciliation, LedgerError>
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    let mut expected = opening;
    for record in records {
        expected = expected
            .checked_add(record.amount)
            .ok_or(LedgerError::Overflow)?;
    }

    if expected == current {
        Ok(Reconciliation::Balanced)
    } else {
        tracing::warn!(
            expected = %expected,
            actual = %current,
            "balance drift detected"
        );
        Ok(Reconciliation::Drift {
            expected,
            actual: current,
        })
    }
}
