//! Budget snapshots and spend decisions.
//!
//! A [`BudgetSnapshot`] is derived from configuration and the committed ledger
//! every time it is needed; it is never stored. [`decide`] turns a snapshot and
//! a requested amount into a [`Decision`] without side effects.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    EngineError, ExternalLimitTracker, ResultEngine, SpendingMode, Usd, YieldSource, policy,
    yield_source,
};

/// Everything the engine knows about the budget at one instant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BudgetSnapshot {
    pub as_of: DateTime<Utc>,
    pub mode: SpendingMode,
    pub accrued_yield_usd: Usd,
    pub cumulative_withdrawn_usd: Usd,
    pub spendable_ceiling_usd: Usd,
    /// Share of accrued yield kept aside by the mode.
    pub reserved_usd: Usd,
    pub external_limit_amount_usd: Usd,
    pub spent_this_period_usd: Usd,
    pub external_limit_remaining_usd: Usd,
    pub period_start: DateTime<Utc>,
    pub next_reset_at: DateTime<Utc>,
    pub daily_yield_usd: Usd,
}

impl BudgetSnapshot {
    /// Derive a snapshot. The tracker is only read: a window that has expired
    /// at `now` is reported as already rolled over.
    #[must_use]
    pub fn compute(
        sources: &[YieldSource],
        mode: SpendingMode,
        cumulative_withdrawn: Usd,
        tracker: &ExternalLimitTracker,
        now: DateTime<Utc>,
    ) -> Self {
        let accrued = yield_source::compute_accrued(sources, now);
        let window = tracker.window_at(now);

        Self {
            as_of: now,
            mode,
            accrued_yield_usd: accrued,
            cumulative_withdrawn_usd: cumulative_withdrawn,
            spendable_ceiling_usd: policy::ceiling(accrued, mode, cumulative_withdrawn),
            reserved_usd: accrued.scale(mode.reserve_fraction()),
            external_limit_amount_usd: tracker.limit_amount(),
            spent_this_period_usd: window.spent_this_period,
            external_limit_remaining_usd: tracker.remaining_at(now),
            period_start: window.period_start,
            next_reset_at: window.end(),
            daily_yield_usd: yield_source::daily_yield(sources),
        }
    }

    /// Largest amount that can be approved right now.
    #[must_use]
    pub fn max_available(&self) -> Usd {
        self.spendable_ceiling_usd
            .min(self.external_limit_remaining_usd)
    }

    /// Constraint that caps [`max_available`](Self::max_available). Ties go to
    /// the yield ceiling, since a reset alone would not lift it.
    #[must_use]
    pub fn binding(&self) -> Binding {
        if self.spendable_ceiling_usd <= self.external_limit_remaining_usd {
            Binding::YieldCeiling
        } else {
            Binding::ExternalLimit
        }
    }

    /// How fast the spendable ceiling grows per day.
    #[must_use]
    pub fn daily_spendable_usd(&self) -> Usd {
        self.daily_yield_usd.scale(self.mode.spend_fraction())
    }

    /// Accrued yield not yet withdrawn.
    #[must_use]
    pub fn net_yield_usd(&self) -> Usd {
        self.accrued_yield_usd
            .saturating_sub(self.cumulative_withdrawn_usd)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecisionStatus {
    Approved,
    Denied,
}

/// Which limit caps the available amount.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    YieldCeiling,
    ExternalLimit,
}

/// When a denied amount could fit.
///
/// `Days` assumes the APY stays constant and nothing compounds; it is an
/// estimate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Eta {
    Days(Decimal),
    NextPeriodReset { at: DateTime<Utc> },
    /// The sources accrue nothing, so the ceiling never grows.
    Never,
    /// Larger than the whole per-period allowance.
    AboveAllowance,
}

/// Outcome of evaluating a spend request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub status: DecisionStatus,
    pub requested_usd: Usd,
    pub max_available_usd: Usd,
    /// Zero when approved.
    pub shortfall_usd: Usd,
    pub binding: Binding,
    /// Set only when denied.
    pub eta: Option<Eta>,
    /// The request lands within the rounding epsilon of `max_available`:
    /// approved with at most epsilon left over, or denied by at most epsilon.
    pub within_rounding: bool,
    pub snapshot: BudgetSnapshot,
}

impl Decision {
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.status == DecisionStatus::Approved
    }

    /// What would be left of `max_available` after an approved spend.
    #[must_use]
    pub fn remaining_after(&self) -> Usd {
        self.max_available_usd.saturating_sub(self.requested_usd)
    }
}

/// Approve or deny `amount` against `snapshot`.
///
/// Approval is strict: anything above `max_available` is denied, even by less
/// than `epsilon`. Amounts finer than one base unit cannot be sent and are
/// rejected.
pub fn decide(snapshot: BudgetSnapshot, amount: Usd, epsilon: Usd) -> ResultEngine<Decision> {
    if !amount.is_positive() {
        return Err(EngineError::InvalidAmount(
            "spend amount must be > 0".to_string(),
        ));
    }
    if !amount.fits_base_units() {
        return Err(EngineError::InvalidAmount(format!(
            "at most {} decimals",
            Usd::BASE_UNIT_DIGITS
        )));
    }

    let max_available = snapshot.max_available();
    let binding = snapshot.binding();

    if amount <= max_available {
        return Ok(Decision {
            status: DecisionStatus::Approved,
            requested_usd: amount,
            max_available_usd: max_available,
            shortfall_usd: Usd::ZERO,
            binding,
            eta: None,
            within_rounding: max_available - amount <= epsilon,
            snapshot,
        });
    }

    let shortfall = amount - max_available;
    let eta = if amount > snapshot.external_limit_amount_usd {
        Eta::AboveAllowance
    } else {
        match binding {
            Binding::YieldCeiling => {
                let rate = snapshot.daily_spendable_usd();
                if rate.is_positive() {
                    // A vanishing rate can overflow the quotient.
                    shortfall
                        .amount()
                        .checked_div(rate.amount())
                        .map_or(Eta::Never, Eta::Days)
                } else {
                    Eta::Never
                }
            }
            Binding::ExternalLimit => Eta::NextPeriodReset {
                at: snapshot.next_reset_at,
            },
        }
    };

    Ok(Decision {
        status: DecisionStatus::Denied,
        requested_usd: amount,
        max_available_usd: max_available,
        shortfall_usd: shortfall,
        binding,
        eta: Some(eta),
        within_rounding: shortfall <= epsilon,
        snapshot,
    })
}
