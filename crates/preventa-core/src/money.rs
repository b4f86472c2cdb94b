//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Decimal Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A driver closing a route compares declared cash against recorded       │
//! │  payments with a ±0.01 tolerance. Float drift alone can push a          │
//! │  balanced route over that band.                                         │
//! │                                                                         │
//! │  OUR SOLUTION: rust_decimal::Decimal                                    │
//! │    0.1 + 0.2 = 0.3 exactly                                              │
//! │    Markups like cost × 1.20 stay exact until explicitly rounded         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use preventa_core::money::Money;
//!
//! let price = Money::new(1099, 2);                   // 10.99
//! let line = price.multiply_quantity(3).unwrap();    // 32.97
//! let total = line + Money::new(500, 2);             // 37.97
//! assert_eq!(total.to_string(), "37.97");
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use crate::error::ValidationError;

/// Number of decimal places used when an amount is rounded for storage.
pub const CURRENCY_SCALE: u32 = 2;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary amount with exact decimal precision.
///
/// ## Design Decisions
/// - **Decimal (signed)**: differences and refunds can be negative
/// - **Transparent serde**: travels as the decimal itself, so the backend
///   and the Local Store see plain amounts
/// - **No implicit rounding**: arithmetic keeps full precision; call
///   [`Money::round_to_cents`] where a stored amount must be normalized
///
/// ## Where Money Flows
/// ```text
/// Product.cost_price ──► resolve_price ──► OrderLine.unit_price
///                                               │
///                                               ▼
///                  OrderLine.subtotal ──► Order.total ──► expected (rendición)
///
/// StopPayment.amount ──► cash / other totals ──► total_collected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Creates money from a mantissa and a scale: `Money::new(1099, 2)` is 10.99.
    #[inline]
    pub fn new(num: i64, scale: u32) -> Self {
        Money(Decimal::new(num, scale))
    }

    /// Wraps an existing decimal.
    #[inline]
    pub const fn from_decimal(value: Decimal) -> Self {
        Money(value)
    }

    /// Creates money from a whole number of currency units.
    #[inline]
    pub fn from_units(units: i64) -> Self {
        Money(Decimal::from(units))
    }

    /// Returns the inner decimal value.
    #[inline]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    /// Checks if the value is zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checks if the value is strictly greater than zero.
    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Checks if the value is strictly less than zero.
    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Returns the absolute value.
    ///
    /// ## Example
    /// ```rust
    /// use preventa_core::money::Money;
    ///
    /// let shortage = Money::new(-550, 2);
    /// assert_eq!(shortage.abs(), Money::new(550, 2));
    /// ```
    #[inline]
    pub fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Multiplies a unit price by a quantity.
    ///
    /// ## User Workflow
    /// ```text
    /// Product: Yerba 1kg  @ 2500.50
    /// Quantity: 3
    ///      │
    ///      ▼
    /// multiply_quantity(3) ← THIS FUNCTION
    ///      │
    ///      ▼
    /// OrderLine.subtotal: 7501.50
    /// ```
    ///
    /// Fails with [`ValidationError::TooLarge`] when the product does not
    /// fit in a decimal.
    #[inline]
    pub fn multiply_quantity(&self, qty: i64) -> Result<Self, ValidationError> {
        self.0
            .checked_mul(Decimal::from(qty))
            .map(Money)
            .ok_or_else(|| too_large("subtotal"))
    }

    /// Applies a percentage markup: `self × (1 + pct/100)`.
    ///
    /// ## Example
    /// ```rust
    /// use preventa_core::money::Money;
    /// use rust_decimal::Decimal;
    ///
    /// let cost = Money::from_units(100);
    /// assert_eq!(cost.apply_markup(Decimal::from(20)).unwrap(), Money::from_units(120));
    /// ```
    pub fn apply_markup(&self, percentage: Decimal) -> Result<Self, ValidationError> {
        let factor = Decimal::ONE
            .checked_add(percentage / Decimal::ONE_HUNDRED)
            .ok_or_else(|| too_large("percentage"))?;
        self.0
            .checked_mul(factor)
            .map(Money)
            .ok_or_else(|| too_large("price"))
    }

    /// Adds two amounts; `None` on overflow.
    #[inline]
    pub fn checked_add(&self, other: Money) -> Option<Self> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Rounds to [`CURRENCY_SCALE`] places, half away from zero.
    pub fn round_to_cents(&self) -> Self {
        Money(
            self.0
                .round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Returns the larger of `self` and zero.
    #[inline]
    pub fn clamp_non_negative(&self) -> Self {
        if self.is_negative() {
            Money::zero()
        } else {
            *self
        }
    }
}

fn too_large(field: &str) -> ValidationError {
    ValidationError::TooLarge {
        field: field.to_string(),
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Always shows two decimals. Presentation formatting (currency symbol,
/// thousands separator) belongs to the UI.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .map(Money)
            .map_err(|e| ValidationError::InvalidFormat {
                field: "amount".to_string(),
                reason: e.to_string(),
            })
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money(value)
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

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
