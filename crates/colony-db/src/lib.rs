//! Data layer for the colony economy (`PostgreSQL` + `Dragonfly`).
//!
//! `PostgreSQL` is the system of record: participants, the append-only
//! transaction history, and the phenomenon and economy singletons.
//! [`PgLedgerStore`] implements the [`colony_ledger::LedgerStore`]
//! contract on top of it with row-level locks. `Dragonfly` holds a
//! read-mostly copy of the state dashboards poll between passes.
//!
//! ```text
//! Settlement pass
//!     |
//!     +-- commit_participant --> PostgreSQL (BEGIN; SELECT ... FOR UPDATE; UPDATE; INSERT; COMMIT)
//!     |
//!     +-- after the pass ------> Dragonfly (colony:cycle, colony:phenomenon, colony:pass:last)
//! ```
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool and configuration
//! - [`pg_store`] -- [`PgLedgerStore`], the durable [`colony_ledger::LedgerStore`]
//! - [`dragonfly`] -- `Dragonfly` hot state cache
//! - [`error`] -- Shared error types

pub mod dragonfly;
pub mod error;
pub mod pg_store;
pub mod postgres;

// Re-export primary types for convenience.
pub use dragonfly::HotStateCache;
pub use error::DbError;
pub use pg_store::PgLedgerStore;
pub use postgres::{PostgresConfig, PostgresPool};
