//! Local mirror of the smart wallet's periodic spending allowance.
//!
//! The allowance is enforced on-chain as well; the tracker exists so that the
//! engine never proposes a transfer the wallet would reject.
//!
//! Windows are contiguous: window `k` covers
//! `[period_start + k * period_length, period_start + (k + 1) * period_length)`.
//! When `now` leaves the current window the start jumps straight to the window
//! containing `now` and the period spend resets.

use chrono::{DateTime, TimeDelta, Utc};

use crate::{EngineError, ResultEngine, Usd};

/// Current allowance window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeriodWindow {
    pub period_length: TimeDelta,
    pub period_start: DateTime<Utc>,
    pub spent_this_period: Usd,
}

impl PeriodWindow {
    /// Start of the following window.
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.period_start + self.period_length
    }

    /// The window that contains `now`. A `now` earlier than the window start
    /// keeps the current window.
    #[must_use]
    pub fn rolled_to(self, now: DateTime<Utc>) -> PeriodWindow {
        let elapsed = now - self.period_start;
        if elapsed < self.period_length {
            return self;
        }

        let periods = elapsed.num_seconds() / self.period_length.num_seconds();
        let skipped = i32::try_from(periods)
            .ok()
            .and_then(|periods| self.period_length.checked_mul(periods));
        let period_start = match skipped {
            Some(skipped) => self.period_start + skipped,
            // More periods than fit in an i32: the window is simply "now".
            None => now,
        };

        PeriodWindow {
            period_length: self.period_length,
            period_start,
            spent_this_period: Usd::ZERO,
        }
    }
}

/// Tracks spend against the external allowance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalLimitTracker {
    limit_amount: Usd,
    window: PeriodWindow,
}

impl ExternalLimitTracker {
    pub fn new(
        limit_amount: Usd,
        period_length: TimeDelta,
        period_start: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        Self::restore(limit_amount, period_length, period_start, Usd::ZERO)
    }

    /// Rebuild a tracker from persisted state.
    pub fn restore(
        limit_amount: Usd,
        period_length: TimeDelta,
        period_start: DateTime<Utc>,
        spent_this_period: Usd,
    ) -> ResultEngine<Self> {
        if limit_amount.is_negative() {
            return Err(EngineError::InvalidConfig(
                "external limit amount must be >= 0".to_string(),
            ));
        }
        if period_length.num_seconds() <= 0 {
            return Err(EngineError::InvalidConfig(
                "external limit period must be at least one second".to_string(),
            ));
        }
        if spent_this_period.is_negative() {
            return Err(EngineError::InvalidAmount(
                "spent this period must be >= 0".to_string(),
            ));
        }

        Ok(Self {
            limit_amount,
            window: PeriodWindow {
                period_length,
                period_start,
                spent_this_period,
            },
        })
    }

    #[must_use]
    pub fn limit_amount(&self) -> Usd {
        self.limit_amount
    }

    #[must_use]
    pub fn window(&self) -> PeriodWindow {
        self.window
    }

    /// The window as it would be at `now`, without touching the tracker.
    #[must_use]
    pub fn window_at(&self, now: DateTime<Utc>) -> PeriodWindow {
        self.window.rolled_to(now)
    }

    /// Remaining allowance at `now`, without touching the tracker.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Usd {
        self.limit_amount
            .saturating_sub(self.window_at(now).spent_this_period)
    }

    /// When the window containing `now` ends.
    #[must_use]
    pub fn next_reset_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.window_at(now).end()
    }

    /// Move to the window containing `now`. Returns `true` if the window
    /// changed.
    pub fn roll_forward(&mut self, now: DateTime<Utc>) -> bool {
        let rolled = self.window.rolled_to(now);
        let changed = rolled != self.window;
        self.window = rolled;
        changed
    }

    /// Remaining allowance at `now`, rolling the window forward first.
    pub fn remaining(&mut self, now: DateTime<Utc>) -> Usd {
        self.roll_forward(now);
        self.limit_amount.saturating_sub(self.window.spent_this_period)
    }

    /// Count `amount` against the current window.
    ///
    /// Fails with [`EngineError::LimitExceeded`] when `amount` is above what is
    /// left; the tracker is not modified in that case (apart from rolling the
    /// window forward).
    pub fn record_spend(&mut self, amount: Usd, now: DateTime<Utc>) -> ResultEngine<()> {
        if !amount.is_positive() {
            return Err(EngineError::InvalidAmount(
                "spend amount must be > 0".to_string(),
            ));
        }
        let remaining = self.remaining(now);
        if amount > remaining {
            return Err(EngineError::LimitExceeded {
                requested: amount,
                remaining,
            });
        }
        self.window.spent_this_period += amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    use super::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 5, 0, 0, 0).unwrap()
    }

    fn weekly(limit: Usd) -> ExternalLimitTracker {
        ExternalLimitTracker::new(limit, Duration::days(7), start()).unwrap()
    }

    #[test]
    fn spend_within_window_accumulates() {
        let mut tracker = weekly(Usd::new(dec!(56)));
        tracker
            .record_spend(Usd::new(dec!(20)), start() + Duration::days(1))
            .unwrap();
        tracker
            .record_spend(Usd::new(dec!(36)), start() + Duration::days(2))
            .unwrap();
        assert_eq!(tracker.remaining(start() + Duration::days(3)), Usd::ZERO);
    }

    #[test]
    fn over_commit_is_rejected_without_change() {
        let mut tracker = weekly(Usd::new(dec!(10)));
        tracker.record_spend(Usd::new(dec!(10)), start()).unwrap();

        let err = tracker
            .record_spend(Usd::new(dec!(0.01)), start() + Duration::hours(1))
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::LimitExceeded {
                requested: Usd::new(dec!(0.01)),
                remaining: Usd::ZERO,
            }
        );
        assert_eq!(tracker.window().spent_this_period, Usd::new(dec!(10)));
    }

    #[test]
    fn rolls_over_after_one_period() {
        let mut tracker = weekly(Usd::new(dec!(10)));
        tracker.record_spend(Usd::new(dec!(10)), start()).unwrap();

        let now = start() + Duration::days(7);
        assert_eq!(tracker.remaining(now), Usd::new(dec!(10)));
        assert_eq!(tracker.window().period_start, now);
    }

    #[test]
    fn three_periods_later_limit_is_full_not_tripled() {
        let mut tracker = weekly(Usd::new(dec!(56)));
        tracker.record_spend(Usd::new(dec!(40)), start()).unwrap();

        let now = start() + Duration::days(21) + Duration::hours(5);
        assert_eq!(tracker.remaining_at(now), Usd::new(dec!(56)));
        assert_eq!(tracker.remaining(now), Usd::new(dec!(56)));
        assert_eq!(
            tracker.window().period_start,
            start() + Duration::days(21)
        );
        assert_eq!(
            tracker.next_reset_at(now),
            start() + Duration::days(28)
        );
    }

    #[test]
    fn long_gaps_skip_in_one_step() {
        let tracker = weekly(Usd::new(dec!(56)));
        let now = start() + Duration::days(7 * 520 + 3);
        let window = tracker.window_at(now);
        assert_eq!(window.period_start, start() + Duration::days(7 * 520));
        assert!(window.period_start <= now && now < window.end());
    }

    #[test]
    fn read_only_views_do_not_mutate() {
        let mut tracker = weekly(Usd::new(dec!(56)));
        tracker.record_spend(Usd::new(dec!(6)), start()).unwrap();
        let before = tracker.clone();

        let _ = tracker.remaining_at(start() + Duration::days(30));
        let _ = tracker.window_at(start() + Duration::days(30));
        assert_eq!(tracker, before);
    }

    #[test]
    fn clock_skew_keeps_current_window() {
        let mut tracker = weekly(Usd::new(dec!(56)));
        tracker.record_spend(Usd::new(dec!(6)), start()).unwrap();

        let earlier = start() - Duration::days(2);
        assert_eq!(tracker.remaining(earlier), Usd::new(dec!(50)));
        assert_eq!(tracker.window().period_start, start());
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert!(ExternalLimitTracker::new(Usd::new(dec!(-1)), Duration::days(7), start()).is_err());
        assert!(ExternalLimitTracker::new(Usd::new(dec!(1)), Duration::zero(), start()).is_err());
    }
}
