//! Observer API server for the colony economy.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **Read endpoints** for the cycle countdown, the phenomenon, participant
//!   records, protection windows and transaction history
//! - **Participant actions**: insurance purchase, manual work, investment
//! - **Admin endpoint** to activate a phenomenon
//! - **Operator endpoints** for pausing, resuming and stopping the cycle
//!   runner, and for reading the last pass report
//!
//! # Architecture
//!
//! Handlers are generic over the [`LedgerStore`](colony_ledger::LedgerStore)
//! the engine runs on and share it through [`AppState`]. Every write goes
//! through the same atomic participant commit the settlement engine uses,
//! so API actions and settlement passes never interleave halfway.

pub mod error;
pub mod handlers;
pub mod operator;
pub mod router;
pub mod server;
pub mod state;

// Re-export primary types for convenience.
pub use error::ObserverError;
pub use router::build_router;
pub use server::{start_server, ServerConfig, ServerError};
pub use state::AppState;
