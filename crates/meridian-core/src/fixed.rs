//! Fixed-point arithmetic for prices and quantities.
//!
//! Prices are integers in minor units (hundredths), which keeps the
//! matching path free of IEEE 754 rounding and makes arithmetic
//! deterministic across platforms.

use core::ops::{Add, Sub};

/// Nanosecond timestamp (epoch-relative).
pub type Timestamp = u64;

/// Fixed-point price in minor units.
///
/// Example: $150.00 → `Price(15000)` with two decimal places.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Price(pub u64);

impl Price {
    /// Minor units per major unit (two decimal places).
    pub const SCALE: u64 = 100;

    /// Number of decimal places.
    pub const DECIMAL_PLACES: u32 = 2;

    /// Zero price. Doubles as the "no price" sentinel for market orders
    /// and empty book sides.
    pub const ZERO: Self = Self(0);

    /// Maximum representable price.
    pub const MAX: Self = Self(u64::MAX);

    /// Create a price from whole major units.
    #[inline(always)]
    pub const fn from_major(units: u64) -> Self {
        Self(units.saturating_mul(Self::SCALE))
    }

    /// Get raw value in minor units.
    #[inline(always)]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Create from raw minor units (no conversion).
    #[inline(always)]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Check if price is zero.
    #[inline(always)]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Saturating addition.
    #[inline(always)]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction.
    #[inline(always)]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl Add for Price {
    type Output = Self;

    #[inline(always)]
    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Sub for Price {
    type Output = Self;

    #[inline(always)]
    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

/// Quantity in base units (shares, contracts).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Quantity(pub u64);

impl Quantity {
    /// Zero quantity.
    pub const ZERO: Self = Self(0);

    /// Maximum quantity.
    pub const MAX: Self = Self(u64::MAX);

    /// Check if quantity is zero.
    #[inline(always)]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Get raw value.
    #[inline(always)]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Create from raw value.
    #[inline(always)]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Saturating addition.
    #[inline(always)]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction.
    #[inline(always)]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Checked subtraction.
    #[inline(always)]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Minimum of two quantities.
    #[inline(always)]
    pub const fn min(self, other: Self) -> Self {
        if self.0 < other.0 {
            self
        } else {
            other
        }
    }
}

impl Add for Quantity {
    type Output = Self;

    #[inline(always)]
    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Sub for Quantity {
    type Output = Self;

    #[inline(always)]
    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_major_units() {
        let p = Price::from_major(150);
        assert_eq!(p.as_raw(), 15000);
        assert!(!p.is_zero());
    }

    #[test]
    fn test_price_ordering() {
        assert!(Price(15000) < Price(15001));
        assert_eq!(Price(15000) + Price(50), Price(15050));
        assert_eq!(Price(15050) - Price(50), Price(15000));
    }

    #[test]
    fn test_quantity_ops() {
        let q1 = Quantity(100);
        let q2 = Quantity(50);

        assert_eq!((q1 + q2).0, 150);
        assert_eq!((q1 - q2).0, 50);
        assert_eq!(q1.min(q2), q2);
    }

    #[test]
    fn test_saturating_ops() {
        let q = Quantity(10);
        assert_eq!(q.saturating_sub(Quantity(20)), Quantity::ZERO);
        assert_eq!(Quantity::MAX.saturating_add(Quantity(1)), Quantity::MAX);
    }

    #[test]
    fn test_checked_sub() {
        assert_eq!(Quantity(10).checked_sub(Quantity(4)), Some(Quantity(6)));
        assert_eq!(Quantity(4).checked_sub(Quantity(10)), None);
    }
}
