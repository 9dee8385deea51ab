//! Hazard damage and automatic hazard activation.
//!
//! Damage removes `balance * damage_pct / 100` from every participant that
//! is not exempt. Exemption comes from the participant's role and insurance
//! window. Each participant records the last cycle the damage step ran for,
//! exempt or not, so a second pass for the same cycle leaves it alone even
//! if its insurance has lapsed in between. A participant already closed for
//! the cycle is never damaged for it.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use colony_ledger::{LedgerError, TransactionBuilder};
use colony_types::{Participant, PhenomenonKind, Strike, TransactionKind, TransactionRecord};

use crate::close::percent_of;
use crate::config::HazardConfig;
use crate::phenomenon::Activation;

/// Errors from the damage step.
#[derive(Debug, thiserror::Error)]
pub enum HazardError {
    /// The damage computation overflowed.
    #[error("arithmetic overflow computing hazard damage")]
    ArithmeticOverflow,

    /// The damage record failed validation.
    #[error("ledger error: {source}")]
    Ledger {
        /// The underlying ledger error.
        #[from]
        source: LedgerError,
    },
}

/// What the damage step decided for one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DamageVerdict {
    /// Admin role or a live insurance window. The guard is advanced.
    Exempt,
    /// The damage step or the close already ran for this cycle (or a later one).
    AlreadyApplied,
    /// Nothing to take: the balance is not positive.
    Nothing,
    /// Balance reduced; the record to append.
    Damaged(TransactionRecord),
}

/// Apply `strike` to `participant` as of `now`.
///
/// On [`DamageVerdict::Damaged`], [`DamageVerdict::Nothing`] and
/// [`DamageVerdict::Exempt`] the participant has been mutated (guard, and
/// balance when damaged) and must be written.
///
/// # Errors
///
/// Returns [`HazardError`] on overflow or an invalid record.
pub fn apply_damage(
    participant: &mut Participant,
    strike: &Strike,
    now: DateTime<Utc>,
) -> Result<DamageVerdict, HazardError> {
    if participant.has_taken_damage(strike.cycle_id)
        || participant.has_settled(strike.cycle_id)
    {
        return Ok(DamageVerdict::AlreadyApplied);
    }
    if participant.is_hazard_exempt_at(now) {
        participant.last_hazard_cycle = Some(strike.cycle_id);
        return Ok(DamageVerdict::Exempt);
    }

    let base = participant.balance.max(Decimal::ZERO);
    let damage = percent_of(base, strike.damage_pct).ok_or(HazardError::ArithmeticOverflow)?;
    participant.last_hazard_cycle = Some(strike.cycle_id);
    if damage.is_zero() {
        return Ok(DamageVerdict::Nothing);
    }

    let amount = Decimal::ZERO
        .checked_sub(damage)
        .ok_or(HazardError::ArithmeticOverflow)?;
    let record = TransactionBuilder::new(participant.id, TransactionKind::HazardDamage)
        .amount(amount)
        .detail(format!("{}: -{}%", strike.kind, strike.damage_pct.normalize()))
        .cycle(strike.cycle_id)
        .at(now)
        .build()?;
    participant.balance = participant
        .balance
        .checked_add(amount)
        .ok_or(HazardError::ArithmeticOverflow)?;
    Ok(DamageVerdict::Damaged(record))
}

/// Deterministic activation roll for idle skies.
///
/// The roll for a cycle depends only on the seed and the cycle id, so every
/// process racing on the same boundary draws the same outcome.
#[derive(Debug, Clone)]
pub struct HazardRoller {
    config: HazardConfig,
}

impl HazardRoller {
    /// Build a roller from the hazard section of the config.
    pub const fn new(config: HazardConfig) -> Self {
        Self { config }
    }

    /// A roller that never fires.
    pub fn disabled() -> Self {
        Self::new(HazardConfig {
            auto_trigger_per_mille: 0,
            ..HazardConfig::default()
        })
    }

    /// Whether rolls can ever fire.
    pub const fn is_enabled(&self) -> bool {
        self.config.auto_trigger_per_mille > 0
    }

    /// The activation rolled for `cycle_id`, if the dice say so.
    pub fn roll(&self, cycle_id: u64) -> Option<Activation> {
        if !self.is_enabled() {
            return None;
        }
        let mut rng = StdRng::seed_from_u64(self.config.seed ^ cycle_id);
        let draw: u32 = rng.random_range(0..1000);
        if draw >= self.config.auto_trigger_per_mille {
            return None;
        }

        let kind = *PhenomenonKind::ALL.choose(&mut rng)?;
        let low = self.config.min_damage_pct.min(self.config.max_damage_pct);
        let damage: u32 = rng.random_range(low..=self.config.max_damage_pct);
        let low = self.config.min_cycles.min(self.config.max_cycles);
        let cycles: u32 = rng.random_range(low..=self.config.max_cycles);
        Some(Activation {
            kind,
            damage_pct: Decimal::from(damage),
            cycles,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use rust_decimal_macros::dec;

    use colony_types::Role;

    use super::*;

    fn strike(cycle_id: u64) -> Strike {
        Strike {
            cycle_id,
            kind: PhenomenonKind::MeteorShower,
            damage_pct: dec!(10),
        }
    }

    fn damaged(verdict: DamageVerdict) -> Option<TransactionRecord> {
        match verdict {
            DamageVerdict::Damaged(record) => Some(record),
            _ => None,
        }
    }

    #[test]
    fn damage_takes_percentage() {
        let mut p = Participant::new("a@colony.test", Role::User, dec!(1000));
        let record = damaged(apply_damage(&mut p, &strike(4), Utc::now()).unwrap()).unwrap();
        assert_eq!(p.balance, dec!(900));
        assert_eq!(record.amount, dec!(-100));
        assert_eq!(record.kind, TransactionKind::HazardDamage);
        assert_eq!(record.detail, "METEOR_SHOWER: -10%");
        assert_eq!(record.cycle_id, Some(4));
        assert_eq!(p.last_hazard_cycle, Some(4));
    }

    #[test]
    fn damage_once_per_cycle() {
        let mut p = Participant::new("a@colony.test", Role::User, dec!(1000));
        apply_damage(&mut p, &strike(4), Utc::now()).unwrap();
        let verdict = apply_damage(&mut p, &strike(4), Utc::now()).unwrap();
        assert_eq!(verdict, DamageVerdict::AlreadyApplied);
        assert_eq!(p.balance, dec!(900));
    }

    #[test]
    fn admin_is_exempt() {
        let mut p = Participant::new("root@colony.test", Role::Admin, dec!(1000));
        assert_eq!(
            apply_damage(&mut p, &strike(4), Utc::now()).unwrap(),
            DamageVerdict::Exempt
        );
        assert_eq!(p.balance, dec!(1000));
    }

    #[test]
    fn insured_is_exempt_until_window_ends() {
        let now = Utc::now();
        let mut p = Participant::new("a@colony.test", Role::User, dec!(1000));
        p.protected_until = Some(now + Duration::seconds(1));
        assert_eq!(
            apply_damage(&mut p, &strike(4), now).unwrap(),
            DamageVerdict::Exempt
        );
        assert_eq!(p.last_hazard_cycle, Some(4));
        p.protected_until = Some(now);
        assert!(damaged(apply_damage(&mut p, &strike(5), now).unwrap()).is_some());
    }

    #[test]
    fn exemption_sticks_for_its_cycle() {
        let now = Utc::now();
        let mut p = Participant::new("a@colony.test", Role::User, dec!(1000));
        p.protected_until = Some(now + Duration::seconds(5));
        assert_eq!(
            apply_damage(&mut p, &strike(4), now).unwrap(),
            DamageVerdict::Exempt
        );
        let later = now + Duration::seconds(10);
        assert_eq!(
            apply_damage(&mut p, &strike(4), later).unwrap(),
            DamageVerdict::AlreadyApplied
        );
        assert_eq!(p.balance, dec!(1000));
    }

    #[test]
    fn closed_cycle_is_never_damaged() {
        let mut p = Participant::new("a@colony.test", Role::User, dec!(890));
        p.last_settled_cycle = Some(4);
        assert_eq!(
            apply_damage(&mut p, &strike(4), Utc::now()).unwrap(),
            DamageVerdict::AlreadyApplied
        );
        assert_eq!(p.balance, dec!(890));
        assert_eq!(p.last_hazard_cycle, None);
    }

    #[test]
    fn broke_participant_takes_nothing() {
        let mut p = Participant::new("a@colony.test", Role::User, dec!(-5));
        assert_eq!(
            apply_damage(&mut p, &strike(4), Utc::now()).unwrap(),
            DamageVerdict::Nothing
        );
        assert_eq!(p.balance, dec!(-5));
        assert_eq!(p.last_hazard_cycle, Some(4));
    }

    #[test]
    fn disabled_roller_never_fires() {
        let roller = HazardRoller::disabled();
        assert!((0..500).all(|cycle| roller.roll(cycle).is_none()));
    }

    #[test]
    fn certain_roller_is_deterministic_and_in_range() {
        let roller = HazardRoller::new(HazardConfig {
            auto_trigger_per_mille: 1000,
            ..HazardConfig::default()
        });
        for cycle in 0..50 {
            let first = roller.roll(cycle).unwrap();
            assert_eq!(roller.roll(cycle), Some(first));
            assert!(first.validate().is_ok());
            assert!(first.damage_pct >= dec!(5) && first.damage_pct <= dec!(20));
            assert!((1..=3).contains(&first.cycles));
        }
    }
}
