//! Core entity structs for the colony economy.
//!
//! Covers the participant record, the phenomenon singleton, the
//! append-only transaction record, and the economy parameters read by a
//! settlement pass.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{PhenomenonKind, Role, TransactionKind, TransactionStatus};
use crate::ids::{ParticipantId, TransactionId};

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// A colonist whose balance is settled every cycle.
///
/// The record is owned by the ledger store. The settlement engine only ever
/// mutates it inside an atomic commit and never holds it across passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Participant {
    /// Unique participant identifier.
    pub id: ParticipantId,
    /// Display identity supplied by the external identity provider.
    pub email: String,
    /// Capability class. Administrators are hazard-exempt.
    pub role: Role,
    /// Current balance. May go negative.
    #[ts(as = "String")]
    pub balance: Decimal,
    /// Whether financial close applies to this participant.
    pub active: bool,
    /// Number of financial closes applied so far.
    pub cycles_completed: u64,
    /// Most recent cycle id whose financial close was applied.
    pub last_settled_cycle: Option<u64>,
    /// Most recent cycle id whose hazard damage was applied.
    pub last_hazard_cycle: Option<u64>,
    /// Timestamp of the most recent qualifying investment action.
    pub last_investment_at: Option<DateTime<Utc>>,
    /// Hazard exemption holds while `now < protected_until`.
    pub protected_until: Option<DateTime<Utc>>,
    /// Production license category to quantity owned.
    pub production_holdings: BTreeMap<String, u32>,
    /// Market asset category to quantity owned.
    pub equity_holdings: BTreeMap<String, u32>,
}

impl Participant {
    /// Create a fresh, active participant with no holdings.
    pub fn new(email: &str, role: Role, balance: Decimal) -> Self {
        Self {
            id: ParticipantId::new(),
            email: email.to_owned(),
            role,
            balance,
            active: true,
            cycles_completed: 0,
            last_settled_cycle: None,
            last_hazard_cycle: None,
            last_investment_at: None,
            protected_until: None,
            production_holdings: BTreeMap::new(),
            equity_holdings: BTreeMap::new(),
        }
    }

    /// Whether an insurance window covers `now`.
    pub fn is_protected_at(&self, now: DateTime<Utc>) -> bool {
        self.protected_until.is_some_and(|until| now < until)
    }

    /// Whether hazard damage must skip this participant at `now`.
    pub fn is_hazard_exempt_at(&self, now: DateTime<Utc>) -> bool {
        self.role.is_hazard_exempt() || self.is_protected_at(now)
    }

    /// Whole seconds of protection left at `now` (0 when unprotected).
    pub fn protection_seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        self.protected_until
            .map_or(0, |until| until.signed_duration_since(now).num_seconds().max(0))
    }

    /// Whether the financial close for `cycle_id` (or a later one) was applied.
    pub fn has_settled(&self, cycle_id: u64) -> bool {
        self.last_settled_cycle.is_some_and(|last| last >= cycle_id)
    }

    /// Whether hazard damage for `cycle_id` (or a later one) was applied.
    pub fn has_taken_damage(&self, cycle_id: u64) -> bool {
        self.last_hazard_cycle.is_some_and(|last| last >= cycle_id)
    }
}

// ---------------------------------------------------------------------------
// Phenomenon
// ---------------------------------------------------------------------------

/// The hazard parameters applied to participants for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Strike {
    /// Cycle the damage belongs to.
    pub cycle_id: u64,
    /// Which phenomenon struck.
    pub kind: PhenomenonKind,
    /// Percentage of balance removed.
    #[ts(as = "String")]
    pub damage_pct: Decimal,
}

/// The global hazard singleton.
///
/// Created inactive. Activated externally, then decremented once per cycle
/// by the settlement engine until it expires. The cycle-keyed
/// `last_advanced_cycle` guard makes the decrement idempotent across
/// racing processes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PhenomenonState {
    /// Whether a hazard is currently striking.
    pub active: bool,
    /// The hazard kind while active.
    pub kind: Option<PhenomenonKind>,
    /// Percentage of balance removed per cycle while active.
    #[ts(as = "String")]
    pub damage_pct: Decimal,
    /// Cycles left before expiry.
    pub cycles_remaining: u32,
    /// Imminent-impact warning in progress.
    pub warning_active: bool,
    /// Most recent cycle id this state was advanced for.
    pub last_advanced_cycle: Option<u64>,
    /// Damage applied during the most recent advance, if any.
    pub last_strike: Option<Strike>,
}

// ---------------------------------------------------------------------------
// Transaction record
// ---------------------------------------------------------------------------

/// An immutable entry in a participant's transaction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TransactionRecord {
    /// Unique record identifier.
    pub id: TransactionId,
    /// The participant whose balance moved.
    pub participant_id: ParticipantId,
    /// Category of the movement.
    pub kind: TransactionKind,
    /// Signed amount applied to the balance.
    #[ts(as = "String")]
    pub amount: Decimal,
    /// Human-readable detail line.
    pub detail: String,
    /// Settlement cycle this record belongs to, if any.
    pub cycle_id: Option<u64>,
    /// Approval state (always approved).
    pub status: TransactionStatus,
    /// Wall-clock time the record was created.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Economy parameters
// ---------------------------------------------------------------------------

/// Price and yield of one production license category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ProductionLicense {
    /// Purchase price of one license.
    #[ts(as = "String")]
    pub unit_price: Decimal,
    /// Percentage of `unit_price` paid out per license per cycle.
    #[ts(as = "String")]
    pub yield_pct: Decimal,
}

/// Global economic parameters, immutable for the duration of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EconomyConfig {
    /// Fixed cost charged every close.
    #[serde(default = "default_life_cost")]
    #[ts(as = "String")]
    pub life_cost: Decimal,
    /// Percentage of balance taxed when production yields nothing.
    #[serde(default = "default_tax_pct")]
    #[ts(as = "String")]
    pub inactivity_tax_pct: Decimal,
    /// Percentage of balance taxed without a recent investment.
    #[serde(default = "default_tax_pct")]
    #[ts(as = "String")]
    pub no_investment_tax_pct: Decimal,
    /// Price of one protection window.
    #[serde(default = "default_insurance_price")]
    #[ts(as = "String")]
    pub insurance_price: Decimal,
    /// Percentage of market price paid per held asset per cycle.
    #[serde(default = "default_equity_dividend_pct")]
    #[ts(as = "String")]
    pub equity_dividend_pct: Decimal,
    /// Production license table.
    #[serde(default)]
    pub production_catalog: BTreeMap<String, ProductionLicense>,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            life_cost: default_life_cost(),
            inactivity_tax_pct: default_tax_pct(),
            no_investment_tax_pct: default_tax_pct(),
            insurance_price: default_insurance_price(),
            equity_dividend_pct: default_equity_dividend_pct(),
            production_catalog: BTreeMap::new(),
        }
    }
}

/// Current market prices for equity categories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MarketBoard {
    /// Category to sale price.
    #[ts(as = "BTreeMap<String, String>")]
    pub prices: BTreeMap<String, Decimal>,
}

impl MarketBoard {
    /// Build a board from `(category, price)` pairs.
    pub fn from_prices<I>(prices: I) -> Self
    where
        I: IntoIterator<Item = (String, Decimal)>,
    {
        Self {
            prices: prices.into_iter().collect(),
        }
    }

    /// Market price of `category`, if listed.
    pub fn price(&self, category: &str) -> Option<Decimal> {
        self.prices.get(category).copied()
    }
}

const fn default_life_cost() -> Decimal {
    Decimal::from_parts(10, 0, 0, false, 0)
}

const fn default_tax_pct() -> Decimal {
    Decimal::from_parts(5, 0, 0, false, 0)
}

const fn default_insurance_price() -> Decimal {
    Decimal::from_parts(50, 0, 0, false, 0)
}

const fn default_equity_dividend_pct() -> Decimal {
    Decimal::from_parts(2, 0, 0, false, 0)
}
