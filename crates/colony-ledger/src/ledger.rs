//! The transaction history: an append-only log of balance movements.
//!
//! The [`Ledger`] holds every [`TransactionRecord`] ever committed for the
//! colony, in commit order. Records are never modified or deleted; per
//! participant queries walk the log.

use rust_decimal::Decimal;

use colony_types::{ParticipantId, TransactionKind, TransactionRecord};

use crate::reconcile::{reconcile, Reconciliation};
use crate::LedgerError;

/// Append-only history of all committed transactions.
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    /// All records, in commit order.
    records: Vec<TransactionRecord>,
}

impl Ledger {
    /// Create a new empty ledger.
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Return the number of records in the ledger.
    pub const fn len(&self) -> usize {
        self.records.len()
    }

    /// Return whether the ledger has no records.
    pub const fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a pre-built record (for example one loaded from storage).
    pub fn append(&mut self, record: TransactionRecord) {
        self.records.push(record);
    }

    /// All records for a participant, oldest first.
    pub fn history(&self, participant: ParticipantId) -> Vec<&TransactionRecord> {
        self.records
            .iter()
            .filter(|r| r.participant_id == participant)
            .collect()
    }

    /// The most recent `limit` records for a participant, newest first.
    pub fn recent(&self, participant: ParticipantId, limit: usize) -> Vec<&TransactionRecord> {
        self.records
            .iter()
            .rev()
            .filter(|r| r.participant_id == participant)
            .take(limit)
            .collect()
    }

    /// Records of one kind for a participant, oldest first.
    pub fn by_kind(
        &self,
        participant: ParticipantId,
        kind: TransactionKind,
    ) -> Vec<&TransactionRecord> {
        self.records
            .iter()
            .filter(|r| r.participant_id == participant && r.kind == kind)
            .collect()
    }

    /// Check that `current` equals `opening` plus this participant's history.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Overflow`] if the sum overflows.
    pub fn reconcile_participant(
        &self,
        participant: ParticipantId,
        opening: Decimal,
        current: Decimal,
    ) -> Result<Reconciliation, LedgerError> {
        reconcile(opening, current, self.history(participant))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::TransactionBuilder;

    fn debit(id: ParticipantId, kind: TransactionKind, amount: Decimal, cycle: u64) -> TransactionRecord {
        TransactionBuilder::new(id, kind)
            .amount(amount)
            .detail(format!("{kind:?} {amount}"))
            .cycle(cycle)
            .build()
            .unwrap()
    }

    #[test]
    fn history_is_per_participant() {
        let a = ParticipantId::new();
        let b = ParticipantId::new();
        let mut ledger = Ledger::new();
        ledger.append(debit(a, TransactionKind::LifeCost, dec!(-10), 1));
        ledger.append(debit(b, TransactionKind::LifeCost, dec!(-10), 1));
        ledger.append(debit(a, TransactionKind::HazardDamage, dec!(-90), 2));

        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.history(a).len(), 2);
        assert_eq!(ledger.history(b).len(), 1);
        assert_eq!(ledger.by_kind(a, TransactionKind::HazardDamage).len(), 1);
    }

    #[test]
    fn recent_is_newest_first() {
        let a = ParticipantId::new();
        let mut ledger = Ledger::new();
        for cycle in 1..=5 {
            ledger.append(debit(a, TransactionKind::LifeCost, dec!(-10), cycle));
        }
        let recent = ledger.recent(a, 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent.first().and_then(|r| r.cycle_id), Some(5));
        assert_eq!(recent.get(1).and_then(|r| r.cycle_id), Some(4));
    }

    #[test]
    fn reconcile_against_history() {
        let a = ParticipantId::new();
        let b = ParticipantId::new();
        let mut ledger = Ledger::new();
        ledger.append(debit(a, TransactionKind::HazardDamage, dec!(-100), 1));
        ledger.append(debit(a, TransactionKind::Dividends, dec!(-110), 1));
        ledger.append(debit(b, TransactionKind::Dividends, dec!(-110), 1));

        assert_eq!(
            ledger.reconcile_participant(a, dec!(1000), dec!(790)).ok(),
            Some(Reconciliation::Balanced)
        );
        assert!(matches!(
            ledger.reconcile_participant(a, dec!(1000), dec!(800)),
            Ok(Reconciliation::Drift { .. })
        ));
    }
}
