//! Spending modes and the spendable ceiling.

use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::{EngineError, Usd};

/// How much of the accrued yield may be spent. The rest is reserved and keeps
/// compounding in the position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpendingMode {
    Conservative,
    #[default]
    Balanced,
    Growth,
}

impl SpendingMode {
    pub const ALL: [SpendingMode; 3] = [
        SpendingMode::Conservative,
        SpendingMode::Balanced,
        SpendingMode::Growth,
    ];

    /// Fraction of accrued yield that is spendable.
    #[must_use]
    pub fn spend_fraction(self) -> Decimal {
        match self {
            SpendingMode::Conservative => dec!(0.5),
            SpendingMode::Balanced => dec!(0.8),
            SpendingMode::Growth => dec!(0.3),
        }
    }

    /// Fraction of accrued yield that is kept aside.
    #[must_use]
    pub fn reserve_fraction(self) -> Decimal {
        Decimal::ONE - self.spend_fraction()
    }

    /// Spend fraction as a whole percentage (`80` for balanced).
    #[must_use]
    pub fn spend_percent(self) -> Decimal {
        self.spend_fraction() * Decimal::ONE_HUNDRED
    }

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            SpendingMode::Conservative => "conservative",
            SpendingMode::Balanced => "balanced",
            SpendingMode::Growth => "growth",
        }
    }
}

impl fmt::Display for SpendingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SpendingMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s.nfkc().collect::<String>().trim().to_lowercase();
        SpendingMode::ALL
            .into_iter()
            .find(|mode| mode.code() == normalized)
            .ok_or_else(|| EngineError::InvalidMode(s.trim().to_string()))
    }
}

impl TryFrom<&str> for SpendingMode {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Spendable ceiling: the mode's share of accrued yield minus everything
/// already withdrawn, never below zero.
#[must_use]
pub fn ceiling(accrued_yield: Usd, mode: SpendingMode, cumulative_withdrawn: Usd) -> Usd {
    accrued_yield
        .scale(mode.spend_fraction())
        .saturating_sub(cumulative_withdrawn)
}
