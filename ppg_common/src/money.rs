use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

//--------------------------------------       Money        ----------------------------------------------------------
/// A fixed-point monetary amount, stored as an integer number of cents.
///
/// All arithmetic is exact integer arithmetic. Floating point only enters at the edges (parsing gateway payloads),
/// and is rounded to cent precision immediately.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.abs();
        write!(f, "{sign}${}.{:02}", cents / 100, cents % 100)
    }
}

impl FromStr for Money {
    type Err = MoneyConversionError;

    /// Parses a decimal amount in major units, e.g. "100", "99.95", "0.5". At most two decimal places are kept.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if frac.len() > 2 {
            return Err(MoneyConversionError(format!("Too many decimal places in '{s}'")));
        }
        let whole = whole.parse::<i64>().map_err(|e| MoneyConversionError(format!("'{s}': {e}")))?;
        let mut frac_cents = 0i64;
        if !frac.is_empty() {
            frac_cents = frac.parse::<i64>().map_err(|e| MoneyConversionError(format!("'{s}': {e}")))?;
            if frac.len() == 1 {
                frac_cents *= 10;
            }
        }
        let cents = if whole < 0 || s.starts_with('-') { whole * 100 - frac_cents } else { whole * 100 + frac_cents };
        Ok(Self(cents))
    }
}

impl Money {
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// The amount in cents.
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Converts a decimal amount in major units, rounding to the nearest cent. Gateways report amounts as JSON
    /// numbers, so a lossless path is not always available; the rounding error here is below half a cent.
    pub fn from_major_units(amount: f64) -> Self {
        Self((amount * 100.0).round() as i64)
    }

    /// Applies a rate expressed in basis points (1 bp = 0.01%), rounding half-up at cent precision.
    pub fn apply_basis_points(&self, bp: i64) -> Self {
        Self((self.0 * bp + 5_000) / 10_000)
    }
}
