//! Enumeration types for the colony economy.
//!
//! Wire names use `SCREAMING_SNAKE_CASE` so records written by the
//! settlement engine read the same way in the dashboard and in the
//! transaction history.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// The capability class of a participant.
///
/// Role is checked once at the entry of the hazard-damage step:
/// administrators are permanently hazard-exempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum Role {
    /// A regular colonist subject to taxes, dividends and hazards.
    User,
    /// An operator of the colony. Never takes hazard damage.
    Admin,
}

impl Role {
    /// Whether this role is exempt from hazard damage regardless of insurance.
    pub const fn is_hazard_exempt(self) -> bool {
        matches!(self, Self::Admin)
    }
}

// ---------------------------------------------------------------------------
// Phenomena
// ---------------------------------------------------------------------------

/// The kind of global hazard currently striking the colony.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum PhenomenonKind {
    /// Charged particle storm.
    SolarStorm,
    /// Hostile raid on the colony.
    AlienAttack,
    /// Debris shower.
    MeteorShower,
}

impl PhenomenonKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 3] = [Self::SolarStorm, Self::AlienAttack, Self::MeteorShower];
}

impl core::fmt::Display for PhenomenonKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::SolarStorm => "SOLAR_STORM",
            Self::AlienAttack => "ALIEN_ATTACK",
            Self::MeteorShower => "METEOR_SHOWER",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// The category of a transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum TransactionKind {
    /// Fixed cost of living charged every close.
    LifeCost,
    /// Income from held production licenses.
    ProductionDividend,
    /// Tax on balance when no production yields income.
    InactivityTax,
    /// Income from held market assets.
    EquityDividend,
    /// Tax on balance when no investment was made in the cycle window.
    NoInvestmentPenalty,
    /// Balance lost to an active phenomenon.
    HazardDamage,
    /// Debit for a hazard protection window.
    InsurancePurchase,
    /// Peer-to-peer movement of balance.
    Transfer,
    /// Aggregated financial close for one cycle.
    Dividends,
    /// Reward for manual production work.
    Work,
}

/// The direction a [`TransactionKind`] moves a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountSign {
    /// Amount must be strictly negative.
    Debit,
    /// Amount must be strictly positive.
    Credit,
    /// Amount may take either sign.
    Either,
}

impl TransactionKind {
    /// The sign convention records of this kind must follow.
    pub const fn sign(self) -> AmountSign {
        match self {
            Self::LifeCost
            | Self::InactivityTax
            | Self::NoInvestmentPenalty
            | Self::HazardDamage
            | Self::InsurancePurchase => AmountSign::Debit,
            Self::ProductionDividend | Self::EquityDividend | Self::Work => AmountSign::Credit,
            Self::Transfer | Self::Dividends => AmountSign::Either,
        }
    }

    /// Whether a zero amount is a legal record of this kind.
    ///
    /// A financial close can net to exactly zero and is still recorded so
    /// the cycle it settled remains auditable.
    pub const fn allows_zero(self) -> bool {
        matches!(self, Self::Dividends)
    }
}

/// Approval state of a transaction record.
///
/// Every record is written already approved; no pending or rejected state
/// exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum TransactionStatus {
    /// The record is final.
    #[default]
    Approved,
}
