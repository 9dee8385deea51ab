//! Cycle clock, hazard state machine and settlement engine for the colony
//! economy.
//!
//! Once per fixed wall-clock cycle the engine applies the global hazard to
//! every non-exempt participant, advances the hazard state machine, and
//! runs the financial close for every active participant. Every write is
//! an atomic, cycle-keyed commit through a
//! [`LedgerStore`](colony_ledger::LedgerStore), so any number of
//! processes may race on the same boundary and each participant is still
//! settled at most once per cycle.
//!
//! # Modules
//!
//! - [`clock`] -- Cycle ids and boundary detection
//! - [`config`] -- `colony-config.yaml` loading
//! - [`phenomenon`] -- Hazard state machine and warning siren
//! - [`hazard`] -- Damage step and automatic activation roll
//! - [`close`] -- The five financial-close components
//! - [`settlement`] -- The settlement pass
//! - [`insurance`] -- Protection window purchase
//! - [`activity`] -- Manual work and investment markers
//! - [`operator`] -- Pause, resume and stop controls
//! - [`runner`] -- The boundary polling loop

pub mod activity;
pub mod clock;
pub mod close;
pub mod config;
pub mod hazard;
pub mod insurance;
pub mod operator;
pub mod phenomenon;
pub mod runner;
pub mod settlement;

pub use clock::{Boundary, BoundaryDetector, ClockError, CycleClock};
pub use config::{ColonyConfig, ConfigError, StorageBackend};
pub use operator::{OperatorState, OperatorStatus};
pub use phenomenon::{Activation, PhenomenonError, PhenomenonTransition};
pub use runner::{CycleRunner, NoOpObserver, PassObserver};
pub use settlement::{PassReport, SettlementEngine, SettlementError, SettlementSettings};
