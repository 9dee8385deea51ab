//! The financial close: five independent components summed into one delta.
//!
//! Each component is a pure function of the pre-close participant, the
//! economy and the market board. Components never see each other's
//! output; every percentage is taken of the same pre-close balance.
//! They run in a fixed order and each contributes one detail line:
//!
//! 1. life cost (always)
//! 2. production dividend, or the inactivity tax when production yields nothing
//! 3. equity dividend (when positive)
//! 4. no-investment penalty (when no investment landed in the window)
//!
//! The fifth step sums the deltas.
//!
//! Percentage taxes are taken of `max(balance, 0)`, not of the raw balance,
//! so a negative balance pays only the life cost instead of earning a credit.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use colony_types::{EconomyConfig, MarketBoard, Participant, TransactionKind};

/// Errors from computing a close.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CloseError {
    /// A decimal operation overflowed.
    #[error("arithmetic overflow in {component}")]
    ArithmeticOverflow {
        /// Which component overflowed.
        component: &'static str,
    },
}

/// Everything a component may read.
#[derive(Debug, Clone, Copy)]
pub struct CloseInput<'a> {
    /// The participant as persisted before the close.
    pub participant: &'a Participant,
    /// Economy parameters for this pass.
    pub economy: &'a EconomyConfig,
    /// Market prices for this pass.
    pub market: &'a MarketBoard,
    /// Investments at or after this instant avoid the penalty.
    pub investment_window_start: DateTime<Utc>,
}

/// One line of a close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    /// The kind of movement this line represents.
    pub kind: TransactionKind,
    /// Signed contribution to the net delta.
    pub delta: Decimal,
    /// Human-readable detail line.
    pub label: String,
}

/// A pure close component.
pub type ComponentFn = fn(&CloseInput<'_>) -> Result<Option<Component>, CloseError>;

/// The components, in detail order.
pub const COMPONENTS: [ComponentFn; 4] = [
    life_cost,
    production_or_inactivity,
    equity_dividend,
    no_investment_penalty,
];

/// The result of running every component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseBreakdown {
    /// Lines that fired, in order.
    pub components: Vec<Component>,
    /// Sum of all deltas.
    pub net: Decimal,
}

impl CloseBreakdown {
    /// The aggregated detail text, lines joined by `" | "`.
    pub fn detail(&self) -> String {
        self.components
            .iter()
            .map(|c| c.label.as_str())
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Whether a component of `kind` fired.
    pub fn has(&self, kind: TransactionKind) -> bool {
        self.components.iter().any(|c| c.kind == kind)
    }
}

/// Run all components and sum them.
///
/// # Errors
///
/// Returns [`CloseError::ArithmeticOverflow`] if any step overflows.
pub fn compute_close(input: &CloseInput<'_>) -> Result<CloseBreakdown, CloseError> {
    let mut components = Vec::with_capacity(COMPONENTS.len());
    let mut net = Decimal::ZERO;
    for component in COMPONENTS {
        if let Some(line) = component(input)? {
            net = net
                .checked_add(line.delta)
                .ok_or(CloseError::ArithmeticOverflow { component: "net" })?;
            components.push(line);
        }
    }
    Ok(CloseBreakdown { components, net })
}

/// Fixed cost of living.
pub fn life_cost(input: &CloseInput<'_>) -> Result<Option<Component>, CloseError> {
    let cost = input.economy.life_cost;
    Ok(Some(Component {
        kind: TransactionKind::LifeCost,
        delta: negated(cost, "life_cost")?,
        label: format!("Vida: -{}Bs", cost.normalize()),
    }))
}

/// Production dividend if licenses yield anything, otherwise the inactivity tax.
pub fn production_or_inactivity(input: &CloseInput<'_>) -> Result<Option<Component>, CloseError> {
    let overflow = CloseError::ArithmeticOverflow {
        component: "production",
    };
    let mut yield_total = Decimal::ZERO;
    for (category, quantity) in &input.participant.production_holdings {
        let Some(license) = input.economy.production_catalog.get(category) else {
            continue;
        };
        let line = percent_of(license.unit_price, license.yield_pct)
            .and_then(|per_unit| per_unit.checked_mul(Decimal::from(*quantity)))
            .ok_or_else(|| overflow.clone())?;
        yield_total = yield_total.checked_add(line).ok_or_else(|| overflow.clone())?;
    }

    if yield_total > Decimal::ZERO {
        return Ok(Some(Component {
            kind: TransactionKind::ProductionDividend,
            delta: yield_total,
            label: format!("Prod: +{}Bs", money(yield_total)),
        }));
    }

    let tax = percent_of(taxable(input.participant), input.economy.inactivity_tax_pct).ok_or(
        CloseError::ArithmeticOverflow {
            component: "inactivity",
        },
    )?;
    Ok(Some(Component {
        kind: TransactionKind::InactivityTax,
        delta: negated(tax, "inactivity")?,
        label: format!("Inact: -{}Bs", money(tax)),
    }))
}

/// Dividend on held market assets, when positive.
pub fn equity_dividend(input: &CloseInput<'_>) -> Result<Option<Component>, CloseError> {
    let overflow = CloseError::ArithmeticOverflow { component: "equity" };
    let mut total = Decimal::ZERO;
    for (category, quantity) in &input.participant.equity_holdings {
        let Some(price) = input.market.price(category) else {
            continue;
        };
        let line = percent_of(price, input.economy.equity_dividend_pct)
            .and_then(|per_unit| per_unit.checked_mul(Decimal::from(*quantity)))
            .ok_or_else(|| overflow.clone())?;
        total = total.checked_add(line).ok_or_else(|| overflow.clone())?;
    }

    if total > Decimal::ZERO {
        Ok(Some(Component {
            kind: TransactionKind::EquityDividend,
            delta: total,
            label: format!("Divs: +{}Bs", money(total)),
        }))
    } else {
        Ok(None)
    }
}

/// Penalty when no investment landed in the window of the closed cycle.
pub fn no_investment_penalty(input: &CloseInput<'_>) -> Result<Option<Component>, CloseError> {
    let invested = input
        .participant
        .last_investment_at
        .is_some_and(|at| at >= input.investment_window_start);
    if invested {
        return Ok(None);
    }

    let tax = percent_of(taxable(input.participant), input.economy.no_investment_tax_pct).ok_or(
        CloseError::ArithmeticOverflow {
            component: "no_investment",
        },
    )?;
    Ok(Some(Component {
        kind: TransactionKind::NoInvestmentPenalty,
        delta: negated(tax, "no_investment")?,
        label: format!("No Inv: -{}Bs", money(tax)),
    }))
}

/// `base * pct / 100`, or `None` on overflow.
pub fn percent_of(base: Decimal, pct: Decimal) -> Option<Decimal> {
    base.checked_mul(pct)?.checked_div(Decimal::ONE_HUNDRED)
}

fn negated(amount: Decimal, component: &'static str) -> Result<Decimal, CloseError> {
    Decimal::ZERO
        .checked_sub(amount)
        .ok_or(CloseError::ArithmeticOverflow { component })
}

/// Percentage taxes are levied on the positive part of the balance only.
fn taxable(participant: &Participant) -> Decimal {
    participant.balance.max(Decimal::ZERO)
}

/// Two-decimal rendering for detail lines.
fn money(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}
