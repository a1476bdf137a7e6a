use core::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer};

/// Currency amount with a fixed number of decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(Decimal);

impl Money {
    pub const TARGET_DECIMALS: u32 = 4;
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Rounds to four decimal places, ties to even.
    pub fn new(value: Decimal) -> Self {
        Self(value.round_dp_with_strategy(Self::TARGET_DECIMALS, RoundingStrategy::MidpointNearestEven))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// `None` when the sum does not fit the underlying decimal.
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    pub fn saturating_add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }

    /// Subtraction that never goes below zero.
    pub fn saturating_sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0)).max(Money::ZERO)
    }

    pub fn from_decimal_str(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        Decimal::from_str(s).ok().map(Money::new)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money::new(value)
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Money;
    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

impl FromStr for Money {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::from_decimal_str(s).ok_or_else(|| format!("Invalid Money format: {}", s))
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Money::from_decimal_str(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("Invalid Money format: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::Money;

    fn m(s: &str) -> Money {
        s.parse().unwrap()
    }

    #[test]
    fn bankers_round_half_even() {
        assert_eq!(format!("{}", m("1.23445")), "1.2344");
        assert_eq!(format!("{}", m("1.23455")), "1.2346");
        assert_eq!(format!("{}", m("-1.23445")), "-1.2344");
        assert_eq!(format!("{}", m("-1.23455")), "-1.2346");
    }

    #[test]
    fn display_pads_to_four_places() {
        assert_eq!(Money::ZERO.to_string(), "0.0000");
        assert_eq!(m("9.99").to_string(), "9.9900");
        assert_eq!(m("10").to_string(), "10.0000");
    }

    #[test]
    fn rejects_garbage() {
        assert!(Money::from_decimal_str("").is_none());
        assert!(Money::from_decimal_str("  ").is_none());
        assert!(Money::from_decimal_str("1.2.3").is_none());
        assert!(Money::from_decimal_str("abc").is_none());
    }

    #[test]
    fn saturating_sub_floors_at_zero() {
        assert_eq!(m("0.01").saturating_sub(m("0.02")), Money::ZERO);
        assert_eq!(m("1.00").saturating_sub(m("0.25")), m("0.75"));
    }

    #[test]
    fn checked_ops_report_overflow() {
        let max = Money::new(Decimal::MAX);
        assert_eq!(max.checked_add(m("1")), None);
        assert_eq!((-max).checked_sub(m("1")), None);
        assert_eq!(m("1.50").checked_add(m("0.25")), Some(m("1.75")));
        assert_eq!(m("1.50").checked_sub(m("0.25")), Some(m("1.25")));
        assert_eq!(max.saturating_add(m("1")), max);
    }
}
