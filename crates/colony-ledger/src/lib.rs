//! Transaction history and storage contract for the colony economy.
//!
//! Every balance movement in the colony produces a
//! [`TransactionRecord`](colony_types::TransactionRecord). Records are
//! append-only and carry a sign that matches their kind: taxes, damage
//! and insurance are debits; dividends and work are credits; the
//! aggregated cycle close may take either sign.
//!
//! # Architecture
//!
//! - [`transaction`] -- The [`TransactionBuilder`] for validated record construction.
//! - [`ledger`] -- The [`Ledger`] struct: append-only history with per-participant queries.
//! - [`reconcile`] -- Balance-versus-history verification.
//! - [`store`] -- The [`LedgerStore`] contract with atomic per-participant commits.
//! - [`memory`] -- [`MemoryLedgerStore`], the in-process implementation.
//!
//! The ledger never panics; it returns errors.

pub mod ledger;
pub mod memory;
pub mod reconcile;
pub mod store;
pub mod transaction;

// Re-export primary types at crate root.
pub use ledger::Ledger;
pub use memory::MemoryLedgerStore;
pub use reconcile::{reconcile, Reconciliation};
pub use store::{Commit, CommitOutcome, LedgerStore, PhenomenonCommit, StoreError};
pub use transaction::TransactionBuilder;

use rust_decimal::Decimal;

use colony_types::TransactionKind;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when building or summing records.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Amount must be non-zero for this kind.
    #[error("{kind:?} record amount must be non-zero")]
    ZeroAmount {
        /// The kind being recorded.
        kind: TransactionKind,
    },

    /// Amount's sign contradicts the kind.
    #[error("{kind:?} record has wrong sign: {amount}")]
    WrongSign {
        /// The kind being recorded.
        kind: TransactionKind,
        /// The rejected amount.
        amount: Decimal,
    },

    /// A required field was not set on the builder.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A decimal sum overflowed.
    #[error("arithmetic overflow while summing records")]
    Overflow,
}
