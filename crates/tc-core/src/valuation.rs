//! Time valuation: converting session times into hours and wages.
//!
//! Every function here is pure. Hours and money are both carried as
//! [`Decimal`] and rounded half-up to two places at the point they are
//! produced, so the same inputs always yield the same cents.
//!
//! # Overnight policy
//!
//! Session hours are measured between the time-of-day of check-in and
//! check-out. A check-out whose time-of-day precedes the check-in is treated
//! as happening on the following calendar day, which adds 24 hours instead of
//! producing a negative duration. The result therefore always lies in
//! `[0, 24]`.

use chrono::{NaiveDateTime, NaiveTime};
use rust_decimal::{Decimal, RoundingStrategy};

const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// Rounds to `dp` decimal places, halves away from zero, and fixes the scale at `dp`.
pub fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    rounded
}

/// Rounds an hour value to the fixed two-decimal output precision.
pub fn round_hours(value: Decimal) -> Decimal {
    round_half_up(value, 2)
}

/// Rounds a currency amount to cents.
pub fn round_cents(value: Decimal) -> Decimal {
    round_half_up(value, 2)
}

/// Hours between two times of day, wrapping past midnight.
pub fn hours_between(check_in: NaiveTime, check_out: NaiveTime) -> Decimal {
    let mut elapsed_ms = (check_out - check_in).num_milliseconds();
    if elapsed_ms < 0 {
        elapsed_ms += MS_PER_DAY;
    }
    round_hours(Decimal::from(elapsed_ms) / Decimal::from(MS_PER_HOUR))
}

/// Hours for a session, applying the overnight policy to its timestamps.
pub fn session_hours(check_in_at: NaiveDateTime, check_out_at: NaiveDateTime) -> Decimal {
    hours_between(check_in_at.time(), check_out_at.time())
}

/// Wage for `hours` at `hourly_rate`, rounded to cents.
///
/// `None` when the product does not fit in a [`Decimal`].
pub fn wage(hours: Decimal, hourly_rate: Decimal) -> Option<Decimal> {
    hours.checked_mul(hourly_rate).map(round_cents)
}

/// Splits `total` hours at `threshold` into `(regular, overtime)`.
///
/// `regular + overtime == total` holds exactly for every input.
pub fn split_at_threshold(total: Decimal, threshold: Decimal) -> (Decimal, Decimal) {
    let regular = total.min(threshold).max(Decimal::ZERO);
    (regular, total - regular)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_same_day_shift() {
        assert_eq!(hours_between(time(8, 0), time(17, 30)), dec!(9.50));
    }

    #[test]
    fn test_overnight_shift_wraps_around_midnight() {
        assert_eq!(hours_between(time(22, 0), time(6, 0)), dec!(8.00));
    }

    #[test]
    fn test_identical_times_are_zero_hours() {
        assert_eq!(hours_between(time(9, 0), time(9, 0)), Decimal::ZERO);
    }

    #[test]
    fn test_hours_round_half_up_to_two_places() {
        // 1 minute = 0.01666.. hours
        assert_eq!(hours_between(time(9, 0), time(9, 1)), dec!(0.02));
        // 45 seconds = 0.0125 hours
        let start = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let end = NaiveTime::from_hms_opt(9, 0, 45).unwrap();
        assert_eq!(hours_between(start, end), dec!(0.01));
        // 54 seconds = 0.015 hours, a midpoint rounding up
        let end = NaiveTime::from_hms_opt(9, 0, 54).unwrap();
        assert_eq!(hours_between(start, end), dec!(0.02));
    }

    #[test]
    fn test_hours_always_within_a_day() {
        for in_hour in 0..24 {
            for out_hour in 0..24 {
                for minute in [0, 17, 59] {
                    let hours = hours_between(time(in_hour, minute), time(out_hour, 0));
                    assert!(hours >= Decimal::ZERO && hours <= dec!(24), "{hours}");
                }
            }
        }
    }

    #[test]
    fn test_session_hours_uses_time_of_day() {
        let check_in = chrono::NaiveDate::from_ymd_opt(2025, 1, 29)
            .unwrap()
            .and_hms_opt(22, 0, 0)
            .unwrap();
        let check_out = check_in + chrono::Duration::hours(8);
        assert_eq!(session_hours(check_in, check_out), dec!(8.00));
    }

    #[test]
    fn test_wage_rounds_to_cents() {
        assert_eq!(wage(dec!(9.5), dec!(20)), Some(dec!(190.00)));
        assert_eq!(wage(dec!(7.33), dec!(15.15)), Some(dec!(111.05)));
        assert_eq!(wage(dec!(0.01), dec!(0.5)), Some(dec!(0.01)));
    }

    #[test]
    fn test_wage_overflow_is_none() {
        assert_eq!(wage(dec!(4), Decimal::MAX / dec!(2)), None);
        assert_eq!(wage(Decimal::ZERO, Decimal::MAX), Some(dec!(0.00)));
    }

    #[test]
    fn test_rounding_fixes_two_decimal_scale() {
        assert_eq!(round_hours(dec!(9.5)).to_string(), "9.50");
        assert_eq!(round_cents(Decimal::ZERO).to_string(), "0.00");
        assert_eq!(round_cents(dec!(-0.005)), dec!(-0.01));
    }

    #[test]
    fn test_wage_is_deterministic() {
        let first = wage(dec!(8.25), dec!(17.35)).unwrap();
        let second = wage(dec!(8.25), dec!(17.35)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn test_split_preserves_total() {
        assert_eq!(split_at_threshold(dec!(45), dec!(40)), (dec!(40), dec!(5)));
        assert_eq!(split_at_threshold(dec!(12.5), dec!(40)), (dec!(12.5), dec!(0)));
        let (regular, overtime) = split_at_threshold(dec!(40.01), dec!(40));
        assert_eq!(regular + overtime, dec!(40.01));
    }
}
