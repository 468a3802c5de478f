//! # Points Module
//!
//! Provides the `Points` type for loyalty point amounts.
//!
//! ## Why Integer Points?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  The oracle reports accruals like 729.98.                              │
//! │  Summing those as f64 drifts:                                          │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌                                  │
//! │                                                                         │
//! │  A balance is a running counter touched by every accrual and           │
//! │  withdrawal, so drift accumulates forever.                             │
//! │                                                                         │
//! │  OUR SOLUTION: Integer hundredths                                       │
//! │    729.98 on the wire  ◄──►  72998 in memory and in SQLite             │
//! │    Every sum and comparison is exact.                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use loyalty_core::points::Points;
//!
//! let accrual = Points::from_whole(500);
//! let withdrawal = Points::from_hundredths(20_050); // 200.50
//!
//! assert_eq!((accrual - withdrawal).to_string(), "299.50");
//! ```

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Number of hundredths in one whole point.
const SCALE: i64 = 100;

// =============================================================================
// Points Type
// =============================================================================

/// A loyalty point amount in hundredths of a point.
///
/// ## Wire Format
/// Serialized as a JSON number: whole amounts as integers (`500`), fractional
/// amounts with up to two decimals (`729.98`). Deserialization accepts any
/// JSON number and rounds to the nearest hundredth.
///
/// ## Storage
/// With the `sqlx` feature, `Points` maps transparently onto an SQLite
/// `INTEGER` column holding the hundredths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
pub struct Points(i64);

impl Points {
    /// Zero points.
    pub const ZERO: Points = Points(0);

    /// Creates an amount from hundredths of a point.
    ///
    /// ## Example
    /// ```rust
    /// use loyalty_core::points::Points;
    ///
    /// assert_eq!(Points::from_hundredths(72_998).to_string(), "729.98");
    /// ```
    #[inline]
    pub const fn from_hundredths(hundredths: i64) -> Self {
        Points(hundredths)
    }

    /// Creates an amount from whole points.
    #[inline]
    pub const fn from_whole(points: i64) -> Self {
        Points(points * SCALE)
    }

    /// Converts a decimal amount, rounding to the nearest hundredth.
    ///
    /// ## Returns
    /// `None` for NaN, infinities, and values outside the representable range.
    ///
    /// ## Example
    /// ```rust
    /// use loyalty_core::points::Points;
    ///
    /// assert_eq!(Points::from_f64(729.98), Some(Points::from_hundredths(72_998)));
    /// assert_eq!(Points::from_f64(0.1 + 0.2), Some(Points::from_hundredths(30)));
    /// assert_eq!(Points::from_f64(f64::NAN), None);
    /// ```
    pub fn from_f64(value: f64) -> Option<Self> {
        let scaled = (value * SCALE as f64).round();
        // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
        if scaled.is_finite() && scaled >= i64::MIN as f64 && scaled < i64::MAX as f64 {
            Some(Points(scaled as i64))
        } else {
            None
        }
    }

    /// Returns the raw hundredths.
    #[inline]
    pub const fn hundredths(&self) -> i64 {
        self.0
    }

    /// Returns the amount as a decimal.
    ///
    /// Only for the wire format and display. Never do arithmetic on this.
    #[inline]
    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / SCALE as f64
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

    /// Checked subtraction, `None` on overflow.
    #[inline]
    pub const fn checked_sub(self, other: Points) -> Option<Points> {
        match self.0.checked_sub(other.0) {
            Some(v) => Some(Points(v)),
            None => None,
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(
            f,
            "{}{}.{:02}",
            sign,
            abs / SCALE as u64,
            abs % SCALE as u64
        )
    }
}

impl Add for Points {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Points(self.0 + other.0)
    }
}

impl AddAssign for Points {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Points {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Points(self.0 - other.0)
    }
}

impl SubAssign for Points {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Sum for Points {
    fn sum<I: Iterator<Item = Points>>(iter: I) -> Self {
        iter.fold(Points::ZERO, Add::add)
    }
}

// -----------------------------------------------------------------------------
// Serde
// -----------------------------------------------------------------------------

impl Serialize for Points {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0 % SCALE == 0 {
            serializer.serialize_i64(self.0 / SCALE)
        } else {
            serializer.serialize_f64(self.as_f64())
        }
    }
}

impl<'de> Deserialize<'de> for Points {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Points::from_f64(value)
            .ok_or_else(|| de::Error::custom(format!("point amount out of range: {value}")))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
