//! Decimal money helpers shared by the offer, coupon, cart and refund code.
//!
//! Amounts stay at full precision through every intermediate step and are
//! rounded half-up only where a value leaves a calculation.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimal places kept on every monetary output.
pub const MONEY_SCALE: u32 = 2;

/// Rounds a monetary amount to two decimal places, half-up.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds a percentage to a whole number, half-up.
pub fn round_percent(percent: Decimal) -> Decimal {
    percent.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds a share of a whole to four decimal places, half-up.
pub fn round_ratio(ratio: Decimal) -> Decimal {
    ratio.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

/// `amount × percent / 100`, unrounded.
pub fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    amount * percent / Decimal::ONE_HUNDRED
}

/// `part / whole × 100`, or zero when `whole` is not positive.
pub fn ratio_percent(part: Decimal, whole: Decimal) -> Decimal {
    if whole <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    part / whole * Decimal::ONE_HUNDRED
}

pub fn non_negative(amount: Decimal) -> Decimal {
    amount.max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_money_half_up() {
        assert_eq!(round_money(dec!(76.925)), dec!(76.93));
        assert_eq!(round_money(dec!(76.924)), dec!(76.92));
        assert_eq!(round_money(dec!(0.005)), dec!(0.01));
    }

    #[test]
    fn test_round_percent() {
        assert_eq!(round_percent(dec!(12.5)), dec!(13));
        assert_eq!(round_percent(dec!(12.49)), dec!(12));
    }

    #[test]
    fn test_round_ratio() {
        assert_eq!(round_ratio(dec!(1000) / dec!(1300)), dec!(0.7692));
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(dec!(800), dec!(10)), dec!(80));
        assert_eq!(percent_of(dec!(19.99), dec!(0)), Decimal::ZERO);
    }

    #[test]
    fn test_ratio_percent_zero_whole() {
        assert_eq!(ratio_percent(dec!(10), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(ratio_percent(dec!(200), dec!(1000)), dec!(20));
    }

    #[test]
    fn test_non_negative() {
        assert_eq!(non_negative(dec!(-3.50)), Decimal::ZERO);
        assert_eq!(non_negative(dec!(3.50)), dec!(3.50));
    }
}
