//! Shared type definitions for the colony economy settlement engine.
//!
//! This crate is the single source of truth for the data model used
//! across the workspace. Types flow downstream to `TypeScript` via
//! `ts-rs` for the colony dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for participants and records
//! - [`enums`] -- Roles, phenomenon kinds, transaction kinds
//! - [`structs`] -- Participant, phenomenon, transaction record, economy

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{AmountSign, PhenomenonKind, Role, TransactionKind, TransactionStatus};
pub use ids::{ParticipantId, TransactionId};
pub use structs::{
    EconomyConfig, MarketBoard, Participant, PhenomenonState, ProductionLicense, Strike,
    TransactionRecord,
};
