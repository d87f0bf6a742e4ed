//! Interest-bearing positions and the accrual calculator.
//!
//! Accrual is simple (non-compounding) and pro-rata over a 365-day year:
//!
//! $accrued = principal \cdot \frac{apy}{100} \cdot \frac{elapsed}{year}$
//!
//! Every function here is pure: given the same sources and the same `as_of`
//! the result is always the same.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::{EngineError, ResultEngine, Usd};

pub const DAYS_PER_YEAR: i64 = 365;
pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;
pub const SECONDS_PER_YEAR: i64 = DAYS_PER_YEAR * SECONDS_PER_DAY;

/// Largest principal a single source may hold.
pub const MAX_PRINCIPAL_USD: Usd = Usd::new(dec!(1000000000000));
/// Largest APY a source may declare.
pub const MAX_APY_PERCENT: Decimal = dec!(1000);

const DEFAULT_KIND: &str = "simulated";

/// One interest-bearing position.
///
/// The principal is only ever read: spending draws on accrued yield, never on
/// the principal itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldSource {
    pub name: String,
    /// Protocol tag, e.g. `aave_v3`.
    pub kind: String,
    pub principal_usd: Usd,
    pub apy_percent: Decimal,
    pub accrual_start: DateTime<Utc>,
    pub protocol_address: Option<String>,
}

impl YieldSource {
    pub fn new(
        name: &str,
        principal_usd: Usd,
        apy_percent: Decimal,
        accrual_start: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        let name = normalize_source_name(name)?;
        check_bounds(&name, principal_usd, apy_percent)?;

        Ok(Self {
            name,
            kind: DEFAULT_KIND.to_string(),
            principal_usd,
            apy_percent,
            accrual_start,
            protocol_address: None,
        })
    }

    #[must_use]
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    #[must_use]
    pub fn protocol_address(mut self, address: impl Into<String>) -> Self {
        self.protocol_address = Some(address.into());
        self
    }

    /// Yield over a full year at the current APY.
    #[must_use]
    pub fn annual_yield(&self) -> Usd {
        self.principal_usd.scale(self.apy_percent / Decimal::ONE_HUNDRED)
    }

    #[must_use]
    pub fn daily_yield(&self) -> Usd {
        Usd::new(self.annual_yield().amount() / Decimal::from(DAYS_PER_YEAR))
    }

    /// Yield accrued between `accrual_start` and `as_of`, zero if `as_of` is
    /// earlier.
    #[must_use]
    pub fn accrued(&self, as_of: DateTime<Utc>) -> Usd {
        let elapsed = (as_of - self.accrual_start).num_seconds().max(0);
        if elapsed == 0 {
            return Usd::ZERO;
        }

        let principal = self.principal_usd.amount();
        let elapsed = Decimal::from(elapsed);
        let denominator = Decimal::ONE_HUNDRED * Decimal::from(SECONDS_PER_YEAR);

        // Multiply before dividing to keep every significant digit, unless
        // that would overflow.
        let accrued = principal
            .checked_mul(self.apy_percent)
            .and_then(|value| value.checked_mul(elapsed))
            .and_then(|value| value.checked_div(denominator))
            .unwrap_or_else(|| {
                (principal / denominator)
                    .saturating_mul(self.apy_percent)
                    .saturating_mul(elapsed)
            });
        Usd::new(accrued)
    }
}

/// Total yield accrued by `sources` at `as_of`.
#[must_use]
pub fn compute_accrued(sources: &[YieldSource], as_of: DateTime<Utc>) -> Usd {
    sources
        .iter()
        .map(|source| source.accrued(as_of))
        .fold(Usd::ZERO, Usd::saturating_add)
}

/// Total yield the sources produce per day at their current APY.
#[must_use]
pub fn daily_yield(sources: &[YieldSource]) -> Usd {
    sources
        .iter()
        .map(YieldSource::daily_yield)
        .fold(Usd::ZERO, Usd::saturating_add)
}

/// Reject principals and APYs outside what the engine can compute with.
pub(crate) fn check_bounds(
    name: &str,
    principal_usd: Usd,
    apy_percent: Decimal,
) -> ResultEngine<()> {
    if principal_usd.is_negative() || principal_usd > MAX_PRINCIPAL_USD {
        return Err(EngineError::InvalidConfig(format!(
            "yield source '{name}': principal must be between 0 and {MAX_PRINCIPAL_USD}"
        )));
    }
    if apy_percent < Decimal::ZERO || apy_percent > MAX_APY_PERCENT {
        return Err(EngineError::InvalidConfig(format!(
            "yield source '{name}': apy must be between 0 and {MAX_APY_PERCENT}%"
        )));
    }
    Ok(())
}

/// Trim and NFKC-normalize a source name, rejecting empty names.
pub(crate) fn normalize_source_name(value: &str) -> ResultEngine<String> {
    let normalized: String = value.nfkc().collect();
    let trimmed = normalized.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidConfig(
            "yield source name must not be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
