//! Fixed-point money representation.
//!
//! Amounts are stored as integer minor units (two fraction digits), never
//! floating point. Arithmetic is checked; overflow surfaces as a domain
//! invariant violation instead of wrapping.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

const MINOR_PER_MAJOR: i64 = 100;

/// A monetary amount in minor units (e.g. 55000 == 550.00).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Construct from minor units (e.g. `from_minor(20000)` == 200.00).
    pub fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Construct from whole major units (e.g. `from_major(150)` == 150.00).
    pub fn from_major(major: i64) -> DomainResult<Self> {
        major
            .checked_mul(MINOR_PER_MAJOR)
            .map(Self)
            .ok_or_else(|| DomainError::invariant("amount overflow"))
    }

    pub fn minor(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::invariant("amount overflow"))
    }

    pub fn checked_sub(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::invariant("amount overflow"))
    }

    /// Multiply by a line quantity.
    pub fn checked_mul_qty(self, quantity: i64) -> DomainResult<Money> {
        self.0
            .checked_mul(quantity)
            .map(Money)
            .ok_or_else(|| DomainError::invariant("amount overflow"))
    }
}

impl core::fmt::Display for Money {
    /// Exactly two fraction digits with thousands grouping (e.g. `1,234.50`).
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let abs = self.0.unsigned_abs();
        let major = abs / MINOR_PER_MAJOR as u64;
        let frac = abs % MINOR_PER_MAJOR as u64;

        let digits = major.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }

        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{sign}{grouped}.{frac:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn display_has_two_fraction_digits_and_grouping() {
        assert_eq!(Money::from_minor(0).to_string(), "0.00");
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
        assert_eq!(Money::from_minor(55000).to_string(), "550.00");
        assert_eq!(Money::from_minor(123_450).to_string(), "1,234.50");
        assert_eq!(Money::from_minor(1_234_567_89).to_string(), "1,234,567.89");
        assert_eq!(Money::from_minor(-20000).to_string(), "-200.00");
    }

    #[test]
    fn from_major_scales_to_minor_units() {
        assert_eq!(Money::from_major(150).unwrap(), Money::from_minor(15000));
        assert!(Money::from_major(i64::MAX).is_err());
    }

    #[test]
    fn checked_arithmetic_rejects_overflow() {
        let max = Money::from_minor(i64::MAX);
        assert!(max.checked_add(Money::from_minor(1)).is_err());
        assert!(max.checked_mul_qty(2).is_err());
        assert_eq!(
            Money::from_minor(200).checked_mul_qty(3).unwrap(),
            Money::from_minor(600)
        );
    }

    proptest! {
        #[test]
        fn add_matches_minor_unit_addition(a in -1_000_000_000i64..1_000_000_000, b in -1_000_000_000i64..1_000_000_000) {
            let sum = Money::from_minor(a).checked_add(Money::from_minor(b)).unwrap();
            prop_assert_eq!(sum.minor(), a + b);
        }

        #[test]
        fn display_always_has_two_fraction_digits(minor in any::<i64>()) {
            let s = Money::from_minor(minor).to_string();
            let (_, frac) = s.rsplit_once('.').unwrap();
            prop_assert_eq!(frac.len(), 2);
        }
    }
}
