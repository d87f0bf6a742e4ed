use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Sub, SubAssign},
    str::FromStr,
};

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::{EngineError, ResultEngine};

/// A USD-denominated stablecoin amount.
///
/// Arithmetic is exact decimal arithmetic (no floating-point drift). Values
/// are persisted as an `i64` number of **base units** with
/// [`Usd::BASE_UNIT_DIGITS`] fraction digits, matching USDC on-chain
/// precision.
///
/// # Examples
///
/// ```rust
/// use engine::Usd;
///
/// let amount: Usd = "12.34".parse().unwrap();
/// assert_eq!(amount.to_base_units().unwrap(), 12_340_000);
/// assert_eq!(amount.to_string(), "$12.34");
/// ```
///
/// Parsing from user input (accepts `.` or `,` as decimal separator and an
/// optional `$`; rejects more than 6 decimals):
///
/// ```rust
/// use engine::Usd;
///
/// assert_eq!("$10".parse::<Usd>().unwrap(), Usd::from_base_units(10_000_000));
/// assert_eq!("10,5".parse::<Usd>().unwrap(), Usd::from_base_units(10_500_000));
/// assert!("1.0000001".parse::<Usd>().is_err());
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Usd(Decimal);

impl Usd {
    pub const ZERO: Usd = Usd(Decimal::ZERO);

    /// Fraction digits of one base unit (USDC uses 6).
    pub const BASE_UNIT_DIGITS: u32 = 6;

    /// Wraps a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Returns the raw decimal amount.
    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    /// Builds an amount from base units (`1_000_000` = `$1`).
    #[must_use]
    pub fn from_base_units(units: i64) -> Self {
        Self(Decimal::new(units, Self::BASE_UNIT_DIGITS))
    }

    /// Converts to base units, truncating anything finer than one base unit.
    pub fn to_base_units(self) -> ResultEngine<i64> {
        let truncated = self
            .0
            .round_dp_with_strategy(Self::BASE_UNIT_DIGITS, RoundingStrategy::ToZero);
        truncated
            .checked_mul(Decimal::from(10_i64.pow(Self::BASE_UNIT_DIGITS)))
            .and_then(|units| units.to_i64())
            .ok_or_else(|| EngineError::InvalidAmount("amount too large".to_string()))
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    #[must_use]
    pub fn is_negative(self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Whether the amount can be expressed in whole base units.
    #[must_use]
    pub fn fits_base_units(self) -> bool {
        self.0.normalize().scale() <= Self::BASE_UNIT_DIGITS
    }

    /// Multiplies the amount by a plain factor (e.g. a spend fraction),
    /// saturating instead of overflowing.
    #[must_use]
    pub fn scale(self, factor: Decimal) -> Usd {
        Usd(self.0.saturating_mul(factor))
    }

    #[must_use]
    pub fn saturating_add(self, rhs: Usd) -> Usd {
        Usd(self.0.saturating_add(rhs.0))
    }

    /// `self - rhs`, clamped at zero.
    #[must_use]
    pub fn saturating_sub(self, rhs: Usd) -> Usd {
        Usd((self.0 - rhs.0).max(Decimal::ZERO))
    }

    /// Checked addition (returns `None` on overflow).
    #[must_use]
    pub fn checked_add(self, rhs: Usd) -> Option<Usd> {
        self.0.checked_add(rhs.0).map(Usd)
    }

    /// Rounds to cents, half away from zero.
    #[must_use]
    pub fn round_cents(self) -> Usd {
        Usd(self
            .0
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Drops everything below a cent. Never larger than `self` for
    /// non-negative amounts.
    #[must_use]
    pub fn truncate_cents(self) -> Usd {
        Usd(self.0.round_dp_with_strategy(2, RoundingStrategy::ToZero))
    }

    /// Drops everything below one base unit.
    #[must_use]
    pub fn truncate_base_units(self) -> Usd {
        Usd(self
            .0
            .round_dp_with_strategy(Self::BASE_UNIT_DIGITS, RoundingStrategy::ToZero))
    }
}

impl fmt::Display for Usd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rounded = self.round_cents().0;
        let sign = if rounded < Decimal::ZERO { "-" } else { "" };
        let plain = format!("{:.2}", rounded.abs());
        let (whole, cents) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (idx, digit) in whole.chars().enumerate() {
            if idx > 0 && (whole.len() - idx) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(digit);
        }

        write!(f, "{sign}${grouped}.{cents}")
    }
}

impl From<Decimal> for Usd {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<Usd> for Decimal {
    fn from(value: Usd) -> Self {
        value.0
    }
}

impl Add for Usd {
    type Output = Usd;

    fn add(self, rhs: Usd) -> Self::Output {
        Usd(self.0 + rhs.0)
    }
}

impl AddAssign for Usd {
    fn add_assign(&mut self, rhs: Usd) {
        self.0 += rhs.0;
    }
}

impl Sub for Usd {
    type Output = Usd;

    fn sub(self, rhs: Usd) -> Self::Output {
        Usd(self.0 - rhs.0)
    }
}

impl SubAssign for Usd {
    fn sub_assign(&mut self, rhs: Usd) {
        self.0 -= rhs.0;
    }
}

impl Sum for Usd {
    fn sum<I: Iterator<Item = Usd>>(iter: I) -> Self {
        iter.fold(Usd::ZERO, Add::add)
    }
}

impl FromStr for Usd {
    type Err = EngineError;

    /// Parses a decimal string into an amount.
    ///
    /// Accepts `.` or `,` as decimal separator, an optional leading `+`/`-`
    /// and an optional `$`.
    ///
    /// Validation rules:
    /// - max 6 fractional digits (one USDC base unit)
    /// - rejects empty/invalid strings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let empty = || EngineError::InvalidAmount("empty amount".to_string());
        let invalid = || EngineError::InvalidAmount("invalid amount".to_string());

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(empty());
        }

        let (negative, rest) = if let Some(stripped) = trimmed.strip_prefix('-') {
            (true, stripped)
        } else if let Some(stripped) = trimmed.strip_prefix('+') {
            (false, stripped)
        } else {
            (false, trimmed)
        };

        let rest = rest.trim();
        let rest = rest.strip_prefix('$').unwrap_or(rest).trim();
        if rest.is_empty() {
            return Err(empty());
        }

        let rest = rest.replace(',', ".");
        let mut parts = rest.split('.');
        let whole = parts.next().ok_or_else(invalid)?;
        let frac = parts.next();

        if parts.next().is_some() {
            return Err(invalid());
        }

        if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let normalized = match frac {
            None | Some("") => whole.to_string(),
            Some(frac) => {
                if !frac.chars().all(|c| c.is_ascii_digit()) {
                    return Err(invalid());
                }
                if frac.len() > Self::BASE_UNIT_DIGITS as usize {
                    return Err(EngineError::InvalidAmount("too many decimals".to_string()));
                }
                format!("{whole}.{frac}")
            }
        };

        let value = Decimal::from_str(&normalized)
            .map_err(|_| EngineError::InvalidAmount("amount too large".to_string()))?;

        Ok(Usd(if negative { -value } else { value }))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn display_formats_usd() {
        assert_eq!(Usd::ZERO.to_string(), "$0.00");
        assert_eq!(Usd::new(dec!(0.005)).to_string(), "$0.01");
        assert_eq!(Usd::new(dec!(7.4986)).to_string(), "$7.50");
        assert_eq!(Usd::new(dec!(1234.5)).to_string(), "$1,234.50");
        assert_eq!(Usd::new(dec!(10000)).to_string(), "$10,000.00");
        assert_eq!(Usd::new(dec!(-944)).to_string(), "-$944.00");
    }

    #[test]
    fn parse_accepts_dot_comma_and_dollar() {
        assert_eq!("10".parse::<Usd>().unwrap(), Usd::new(dec!(10)));
        assert_eq!("10.5".parse::<Usd>().unwrap(), Usd::new(dec!(10.5)));
        assert_eq!("10,50".parse::<Usd>().unwrap(), Usd::new(dec!(10.5)));
        assert_eq!("$56".parse::<Usd>().unwrap(), Usd::new(dec!(56)));
        assert_eq!("-0.01".parse::<Usd>().unwrap(), Usd::new(dec!(-0.01)));
        assert_eq!("  2.30 ".parse::<Usd>().unwrap(), Usd::new(dec!(2.3)));
        assert_eq!("0.000001".parse::<Usd>().unwrap(), Usd::from_base_units(1));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<Usd>().is_err());
        assert!("$".parse::<Usd>().is_err());
        assert!("abc".parse::<Usd>().is_err());
        assert!("1.2.3".parse::<Usd>().is_err());
        assert!(".5".parse::<Usd>().is_err());
        assert!("1e3".parse::<Usd>().is_err());
        assert_eq!(
            "0.0000001".parse::<Usd>().unwrap_err(),
            EngineError::InvalidAmount("too many decimals".to_string())
        );
    }

    #[test]
    fn base_units_truncate_sub_unit_dust() {
        assert_eq!(Usd::new(dec!(1.2345679)).to_base_units().unwrap(), 1_234_567);
        assert_eq!(Usd::from_base_units(56_000_000), Usd::new(dec!(56)));
    }

    #[test]
    fn saturating_sub_clamps_at_zero() {
        let a = Usd::new(dec!(5));
        let b = Usd::new(dec!(7));
        assert_eq!(a.saturating_sub(b), Usd::ZERO);
        assert_eq!(b.saturating_sub(a), Usd::new(dec!(2)));
    }

    #[test]
    fn truncation_never_rounds_up() {
        let available = Usd::new(dec!(5.99890410958904));
        assert_eq!(available.truncate_cents(), Usd::new(dec!(5.99)));
        assert_eq!(available.truncate_base_units(), Usd::new(dec!(5.998904)));
        assert!(available.truncate_cents() <= available);
    }

    #[test]
    fn base_unit_precision() {
        assert!(Usd::new(dec!(1.000001)).fits_base_units());
        assert!(Usd::new(dec!(1.5000000)).fits_base_units());
        assert!(!Usd::new(dec!(1.0000001)).fits_base_units());
    }

    #[test]
    fn scale_saturates() {
        let huge = Usd::new(Decimal::MAX);
        assert_eq!(huge.scale(dec!(2)), Usd::new(Decimal::MAX));
        assert_eq!(huge.saturating_add(huge), Usd::new(Decimal::MAX));
    }
}
