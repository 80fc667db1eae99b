//! # Money and Quantity
//!
//! Integer value types for every amount and stock level in the system.
//!
//! ## Why Integers?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Float balances drift:                                                  │
//! │    -50000.0 + 20000.0 + 29999.999999 = -0.000001  → "still owes"  ❌    │
//! │                                                                         │
//! │  OUR SOLUTION                                                           │
//! │    Money    = i64 tiyin  (100 tiyin = 1 so'm)                           │
//! │    Quantity = i64 milli-units (1000 = 1 pcs / 1 kg / 1 l)               │
//! │                                                                         │
//! │    Balance checks like `balance >= 0` are exact.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kassa_core::money::{Money, Quantity};
//!
//! let price = Money::from_som(12_500);
//! let weight = Quantity::from_milli(1_500); // 1.5 kg
//!
//! assert_eq!(price.line_total(weight), Money::from_som(18_750));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

/// Minor units per so'm.
pub const TIYIN_PER_SOM: i64 = 100;

/// Milli-units per whole unit of stock.
pub const MILLI_PER_UNIT: i64 = 1_000;

// =============================================================================
// Money
// =============================================================================

/// A monetary value in tiyin (the smallest currency unit).
///
/// Signed: client balances go negative when the client owes the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a value from tiyin.
    #[inline]
    pub const fn from_tiyin(tiyin: i64) -> Self {
        Money(tiyin)
    }

    /// Creates a value from whole so'm.
    ///
    /// ```rust
    /// use kassa_core::money::Money;
    ///
    /// assert_eq!(Money::from_som(50_000).tiyin(), 5_000_000);
    /// ```
    #[inline]
    pub const fn from_som(som: i64) -> Self {
        Money(som * TIYIN_PER_SOM)
    }

    /// Returns the raw value in tiyin.
    #[inline]
    pub const fn tiyin(&self) -> i64 {
        self.0
    }

    /// Whole so'm portion (truncated toward zero).
    #[inline]
    pub const fn som(&self) -> i64 {
        self.0 / TIYIN_PER_SOM
    }

    /// Tiyin portion, always 0-99.
    #[inline]
    pub const fn tiyin_part(&self) -> i64 {
        (self.0 % TIYIN_PER_SOM).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns the larger of `self` and zero.
    #[inline]
    pub const fn clamp_non_negative(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            *self
        }
    }

    /// Unit price × quantity, rounded half away from zero to the tiyin.
    ///
    /// ## Weighed Goods
    /// ```text
    /// price 12 500.00 so'm/kg × 1.237 kg
    ///   = 1 250 000 tiyin × 1237 milli / 1000
    ///   = 1 546 250 tiyin  → 15 462.50 so'm
    /// ```
    ///
    /// Saturates at the `i64` bounds; use [`Money::checked_line_total`]
    /// where an out-of-range result must be rejected.
    pub fn line_total(&self, qty: Quantity) -> Money {
        self.checked_line_total(qty).unwrap_or_else(|| {
            if (self.0 < 0) != (qty.milli() < 0) {
                Money(i64::MIN)
            } else {
                Money(i64::MAX)
            }
        })
    }

    /// Unit price × quantity, `None` when the product does not fit in `i64`.
    pub fn checked_line_total(&self, qty: Quantity) -> Option<Money> {
        let raw = self.0 as i128 * qty.milli() as i128;
        i64::try_from(div_round(raw, MILLI_PER_UNIT as i128))
            .ok()
            .map(Money)
    }

    #[inline]
    pub const fn checked_add(self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    #[inline]
    pub const fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    #[inline]
    pub const fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }

    /// Percentage of this amount where the rate is in basis points
    /// (100 bps = 1%). Rounds half away from zero.
    ///
    /// ```rust
    /// use kassa_core::money::{Money, BonusRate};
    ///
    /// let paid = Money::from_som(100_000);
    /// assert_eq!(paid.percent(BonusRate::from_bps(100)), Money::from_som(1_000));
    /// ```
    pub fn percent(&self, rate: BonusRate) -> Money {
        let raw = self.0 as i128 * rate.bps() as i128;
        let scaled = div_round(raw, 10_000).clamp(i64::MIN as i128, i64::MAX as i128);
        Money(scaled as i64)
    }
}

/// Integer division rounding half away from zero.
fn div_round(value: i128, divisor: i128) -> i128 {
    let half = divisor / 2;
    if value >= 0 {
        (value + half) / divisor
    } else {
        (value - half) / divisor
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02} so'm", sign, self.som().abs(), self.tiyin_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, n: i64) -> Self {
        Money(self.0 * n)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Money::saturating_add)
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// A stock quantity in thousandths of a unit.
///
/// Positive for stock levels and cart lines; signed when used as a
/// movement delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    #[inline]
    pub const fn from_milli(milli: i64) -> Self {
        Quantity(milli)
    }

    /// Whole units (pieces, kilograms, litres).
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Quantity(units * MILLI_PER_UNIT)
    }

    #[inline]
    pub const fn milli(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Quantity(0)
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let whole = (self.0 / MILLI_PER_UNIT).abs();
        let frac = (self.0 % MILLI_PER_UNIT).abs();
        if frac == 0 {
            write!(f, "{}{}", sign, whole)
        } else {
            let digits = format!("{:03}", frac);
            write!(f, "{}{}.{}", sign, whole, digits.trim_end_matches('0'))
        }
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Quantity::zero()
    }
}

impl Add for Quantity {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Quantity(self.0 + other.0)
    }
}

impl AddAssign for Quantity {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Quantity {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Quantity(self.0 - other.0)
    }
}

impl Neg for Quantity {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Quantity(-self.0)
    }
}

// =============================================================================
// Bonus Rate
// =============================================================================

/// Cashback percentage in basis points (100 bps = 1.0%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BonusRate(u32);

impl BonusRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        BonusRate(bps)
    }

    /// From a display percentage (`1.0` → 100 bps).
    pub fn from_percentage(pct: f64) -> Self {
        BonusRate((pct * 100.0).round().max(0.0) as u32)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Display only.
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl Default for BonusRate {
    fn default() -> Self {
        BonusRate(100)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_som() {
        let m = Money::from_som(1_099);
        assert_eq!(m.tiyin(), 109_900);
        assert_eq!(m.som(), 1_099);
        assert_eq!(m.tiyin_part(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_tiyin(1_099).to_string(), "10.99 so'm");
        assert_eq!(Money::from_som(-50_000).to_string(), "-50000.00 so'm");
        assert_eq!(Quantity::from_units(3).to_string(), "3");
        assert_eq!(Quantity::from_milli(1_250).to_string(), "1.25");
        assert_eq!(Quantity::from_milli(-500).to_string(), "-0.5");
    }

    #[test]
    fn test_line_total_whole_units() {
        let price = Money::from_som(5_000);
        assert_eq!(price.line_total(Quantity::from_units(3)), Money::from_som(15_000));
    }

    #[test]
    fn test_line_total_weighed_rounds_half_up() {
        // 0.01 so'm × 0.5 → 0.5 tiyin → 1 tiyin
        let price = Money::from_tiyin(1);
        assert_eq!(price.line_total(Quantity::from_milli(500)).tiyin(), 1);
        // 0.01 so'm × 0.4 → 0.4 tiyin → 0
        assert_eq!(price.line_total(Quantity::from_milli(400)).tiyin(), 0);
    }

    #[test]
    fn test_line_total_never_wraps() {
        let price = Money::from_tiyin(i64::MAX / 2 + 1);
        assert_eq!(price.checked_line_total(Quantity::from_units(2)), None);
        assert_eq!(price.line_total(Quantity::from_units(2)), Money::from_tiyin(i64::MAX));
        assert_eq!(
            Money::from_tiyin(6_148_914_691_236_517_206).checked_line_total(Quantity::from_units(3)),
            None
        );
        assert_eq!(
            (-price).line_total(Quantity::from_units(2)),
            Money::from_tiyin(i64::MIN)
        );
    }

    #[test]
    fn test_checked_and_saturating_add() {
        let max = Money::from_tiyin(i64::MAX);
        assert_eq!(max.checked_add(Money::from_tiyin(1)), None);
        assert_eq!(max.saturating_add(Money::from_tiyin(1)), max);
        assert_eq!(
            Money::from_som(2).checked_add(Money::from_som(3)),
            Some(Money::from_som(5))
        );
    }

    #[test]
    fn test_percent() {
        let paid = Money::from_som(100_000);
        assert_eq!(paid.percent(BonusRate::from_bps(100)).som(), 1_000);
        assert_eq!(paid.percent(BonusRate::from_bps(250)).som(), 2_500);
        assert_eq!(Money::from_tiyin(50).percent(BonusRate::from_bps(100)).tiyin(), 1);
    }

    #[test]
    fn test_bonus_rate_from_percentage() {
        assert_eq!(BonusRate::from_percentage(1.0).bps(), 100);
        assert_eq!(BonusRate::from_percentage(2.5).bps(), 250);
        assert_eq!(BonusRate::from_percentage(-1.0).bps(), 0);
        assert_eq!(BonusRate::default().bps(), 100);
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_som(30_000);
        let b = Money::from_som(20_000);
        assert_eq!(a - b, Money::from_som(10_000));
        assert_eq!(-a, Money::from_som(-30_000));
        let total: Money = vec![a, b].into_iter().sum();
        assert_eq!(total, Money::from_som(50_000));
        assert_eq!(Money::from_som(-5).clamp_non_negative(), Money::zero());
    }
}
