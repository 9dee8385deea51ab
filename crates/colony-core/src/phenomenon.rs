//! The global hazard state machine.
//!
//! ```text
//! INACTIVE --activate--> ACTIVE(kind, damage, n) --advance--> ACTIVE(n-1)
//!                                                  \--advance, n-1 == 0--> INACTIVE
//! ```
//!
//! Advancing is keyed on the cycle id: a state already advanced for cycle
//! `N` refuses a second advance for `N`, so racing processes apply the
//! decrement once. The strike used for cycle `N` is recorded alongside the
//! guard so that a process losing the race still damages participants
//! with the same parameters as the winner.
//!
//! The warning flag is orthogonal. [`SirenCountdown`] clears it after a
//! fixed number of local poll ticks, independent of cycle boundaries.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use colony_ledger::{LedgerStore, StoreError};
use colony_types::{PhenomenonKind, PhenomenonState, Strike};

/// Errors from phenomenon operations.
#[derive(Debug, thiserror::Error)]
pub enum PhenomenonError {
    /// Damage must be in `(0, 100]`.
    #[error("damage percentage {0} outside (0, 100]")]
    InvalidDamage(Decimal),

    /// An activation must last at least one cycle.
    #[error("phenomenon must last at least one cycle")]
    ZeroDuration,

    /// The store rejected the commit.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },
}

/// Parameters for turning the sky hostile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activation {
    /// The hazard kind.
    pub kind: PhenomenonKind,
    /// Percentage of balance removed per cycle.
    pub damage_pct: Decimal,
    /// Cycles the hazard lasts.
    pub cycles: u32,
}

impl Activation {
    /// Check the parameters are usable.
    ///
    /// # Errors
    ///
    /// Returns [`PhenomenonError::InvalidDamage`] or
    /// [`PhenomenonError::ZeroDuration`].
    pub fn validate(&self) -> Result<(), PhenomenonError> {
        if self.damage_pct <= Decimal::ZERO || self.damage_pct > Decimal::ONE_HUNDRED {
            return Err(PhenomenonError::InvalidDamage(self.damage_pct));
        }
        if self.cycles == 0 {
            return Err(PhenomenonError::ZeroDuration);
        }
        Ok(())
    }
}

/// Move `state` to `ACTIVE` with the warning raised.
///
/// The advance guard is left untouched, so activation never disturbs the
/// idempotence of the current cycle.
///
/// # Errors
///
/// Returns a validation error if `activation` is unusable.
pub fn activate(state: &mut PhenomenonState, activation: &Activation) -> Result<(), PhenomenonError> {
    activation.validate()?;
    state.active = true;
    state.kind = Some(activation.kind);
    state.damage_pct = activation.damage_pct;
    state.cycles_remaining = activation.cycles;
    state.warning_active = true;
    Ok(())
}

/// The strike participants take for `cycle_id`, if any.
///
/// Once the state has been advanced for `cycle_id` the recorded strike is
/// authoritative. A state advanced past `cycle_id` yields nothing: the
/// caller is a stale pass.
pub fn strike_for(state: &PhenomenonState, cycle_id: u64) -> Option<Strike> {
    match state.last_advanced_cycle {
        Some(last) if last == cycle_id => state.last_strike.filter(|s| s.cycle_id == cycle_id),
        Some(last) if last > cycle_id => None,
        _ => live_strike(state, cycle_id),
    }
}

fn live_strike(state: &PhenomenonState, cycle_id: u64) -> Option<Strike> {
    if !state.active || state.damage_pct <= Decimal::ZERO {
        return None;
    }
    state.kind.map(|kind| Strike {
        cycle_id,
        kind,
        damage_pct: state.damage_pct,
    })
}

/// What one pass did to the phenomenon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum PhenomenonTransition {
    /// Another pass already advanced this cycle.
    AlreadyAdvanced,
    /// Nothing active; only the guard moved.
    Idle,
    /// Still active with this many cycles left.
    Decremented {
        /// Cycles left after the decrement.
        remaining: u32,
    },
    /// The hazard ran out and the sky cleared.
    Expired {
        /// The kind that expired.
        kind: Option<PhenomenonKind>,
    },
    /// An idle sky turned hostile at the end of the pass.
    Triggered {
        /// The new hazard.
        kind: PhenomenonKind,
        /// Damage it will deal per cycle.
        damage_pct: Decimal,
        /// Cycles it will last.
        cycles: u32,
    },
    /// The phenomenon commit failed; the stored state is unchanged.
    Failed,
}

impl PhenomenonTransition {
    /// Whether the stored state changed.
    pub const fn wrote(self) -> bool {
        !matches!(self, Self::AlreadyAdvanced | Self::Failed)
    }
}

/// Advance `state` for `cycle_id`: record the strike, decrement, expire.
pub fn advance(state: &mut PhenomenonState, cycle_id: u64) -> PhenomenonTransition {
    if state.last_advanced_cycle.is_some_and(|last| last >= cycle_id) {
        return PhenomenonTransition::AlreadyAdvanced;
    }

    state.last_strike = live_strike(state, cycle_id);
    state.last_advanced_cycle = Some(cycle_id);

    if !state.active {
        return PhenomenonTransition::Idle;
    }

    state.cycles_remaining = state.cycles_remaining.saturating_sub(1);
    if state.cycles_remaining == 0 {
        let kind = state.kind.take();
        state.active = false;
        state.damage_pct = Decimal::ZERO;
        state.warning_active = false;
        return PhenomenonTransition::Expired { kind };
    }

    PhenomenonTransition::Decremented {
        remaining: state.cycles_remaining,
    }
}

/// Activate a phenomenon in the store on behalf of an operator.
///
/// # Errors
///
/// Returns a validation error or the store's failure.
pub async fn trigger_phenomenon<S: LedgerStore>(
    store: &S,
    activation: Activation,
) -> Result<PhenomenonState, PhenomenonError> {
    activation.validate()?;
    let state = store
        .commit_phenomenon(move |state| activate(state, &activation).is_ok())
        .await?
        .into_state();
    info!(
        kind = %activation.kind,
        damage_pct = %activation.damage_pct,
        cycles = activation.cycles,
        "phenomenon activated"
    );
    Ok(state)
}

/// Clear the warning flag in the store, leaving everything else alone.
///
/// # Errors
///
/// Returns the store's failure.
pub async fn clear_warning<S: LedgerStore>(store: &S) -> Result<PhenomenonState, StoreError> {
    let state = store
        .commit_phenomenon(|state| {
            if state.warning_active {
                state.warning_active = false;
                true
            } else {
                false
            }
        })
        .await?
        .into_state();
    Ok(state)
}

/// What the siren did on one poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SirenEvent {
    /// No warning in progress.
    Silent,
    /// A new warning started; this many ticks remain.
    Started(u32),
    /// Countdown continues; this many ticks remain.
    Tick(u32),
    /// The countdown reached zero. The warning should be cleared.
    Expired,
}

/// Local countdown driving the imminent-impact warning.
#[derive(Debug, Clone)]
pub struct SirenCountdown {
    ticks: u32,
    remaining: Option<u32>,
}

impl SirenCountdown {
    /// A siren that sounds for `ticks` poll ticks.
    pub const fn new(ticks: u32) -> Self {
        Self {
            ticks,
            remaining: None,
        }
    }

    /// Ticks left in the current countdown, if one is running.
    pub const fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    /// Advance one poll tick given the stored warning flag.
    pub fn tick(&mut self, warning_active: bool) -> SirenEvent {
        if !warning_active {
            self.remaining = None;
            return SirenEvent::Silent;
        }
        match self.remaining {
            None => {
                self.remaining = Some(self.ticks);
                if self.ticks == 0 {
                    SirenEvent::Expired
                } else {
                    SirenEvent::Started(self.ticks)
                }
            }
            Some(left) => {
                let left = left.saturating_sub(1);
                self.remaining = Some(left);
                if left == 0 {
                    SirenEvent::Expired
                } else {
                    SirenEvent::Tick(left)
                }
            }
        }
    }
}
