//! Exact durations in quarter-length units.
//!
//! [`RationalDuration`] wraps an arbitrary-precision fraction so that bar
//! accounting never accumulates rounding error, no matter how deeply a metre
//! subdivides. Conversion to `f64` only happens at the edge, when a duration
//! is handed to a performer as beats.

use num_bigint::BigInt;
use num_rational::{BigRational, Ratio};
use num_traits::{One, Signed, ToPrimitive, Zero};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};
use std::str::FromStr;

/// An exact, always-reduced fraction of quarter notes (1 = one crotchet).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RationalDuration(BigRational);

impl RationalDuration {
    /// Create `numer/denom`. Returns `None` for a zero denominator.
    pub fn new(numer: i64, denom: i64) -> Option<Self> {
        if denom == 0 {
            return None;
        }
        Some(Self(BigRational::new(BigInt::from(numer), BigInt::from(denom))))
    }

    /// A whole number of quarter lengths.
    pub fn from_integer(value: i64) -> Self {
        Self(BigRational::from_integer(BigInt::from(value)))
    }

    /// Closest simple fraction to a float (e.g. `0.1` becomes `1/10`).
    ///
    /// Returns `None` for NaN, infinities and values outside the `i64` range.
    pub fn from_f64(value: f64) -> Option<Self> {
        let approx = Ratio::<i64>::approximate_float(value)?;
        Self::new(*approx.numer(), *approx.denom())
    }

    pub fn zero() -> Self {
        Self(BigRational::zero())
    }

    pub fn one() -> Self {
        Self(BigRational::one())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_positive()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    /// Numerator of the reduced fraction.
    pub fn numer(&self) -> &BigInt {
        self.0.numer()
    }

    /// Denominator of the reduced fraction (always positive).
    pub fn denom(&self) -> &BigInt {
        self.0.denom()
    }

    /// Floating point value, used for performance time.
    pub fn to_f64(&self) -> f64 {
        match (self.0.numer().to_f64(), self.0.denom().to_f64()) {
            (Some(n), Some(d)) => n / d,
            _ => f64::NAN,
        }
    }
}

impl fmt::Display for RationalDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_integer() {
            write!(f, "{}", self.0.numer())
        } else {
            write!(f, "{}/{}", self.0.numer(), self.0.denom())
        }
    }
}

/// Error returned when a string is not a fraction, integer or decimal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseRationalError(pub String);

impl fmt::Display for ParseRationalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a rational number", self.0)
    }
}

impl std::error::Error for ParseRationalError {}

impl FromStr for RationalDuration {
    type Err = ParseRationalError;

    /// Accepts `3`, `-3/8`, `3 / 8` and decimals such as `0.125`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseRationalError(s.to_string());
        let trimmed = s.trim();

        if let Some((numer, denom)) = trimmed.split_once('/') {
            let numer: BigInt = numer.trim().parse().map_err(|_| err())?;
            let denom: BigInt = denom.trim().parse().map_err(|_| err())?;
            if denom.is_zero() {
                return Err(err());
            }
            return Ok(Self(BigRational::new(numer, denom)));
        }

        if let Some((whole, frac)) = trimmed.split_once('.') {
            let negative = whole.starts_with('-');
            let digits = whole.trim_start_matches(['-', '+']);
            if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err());
            }
            let whole: BigInt = if digits.is_empty() {
                BigInt::zero()
            } else {
                digits.parse().map_err(|_| err())?
            };
            let frac_value: BigInt = frac.parse().map_err(|_| err())?;
            let scale = num_traits::pow(BigInt::from(10), frac.len());
            let magnitude = BigRational::new(whole * &scale + frac_value, scale);
            return Ok(Self(if negative { -magnitude } else { magnitude }));
        }

        let value: BigInt = trimmed.parse().map_err(|_| err())?;
        Ok(Self(BigRational::from_integer(value)))
    }
}

impl From<i64> for RationalDuration {
    fn from(value: i64) -> Self {
        Self::from_integer(value)
    }
}

impl From<BigRational> for RationalDuration {
    fn from(value: BigRational) -> Self {
        Self(value)
    }
}

impl Add for RationalDuration {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl<'a> Add<&'a RationalDuration> for &'a RationalDuration {
    type Output = RationalDuration;

    fn add(self, rhs: &'a RationalDuration) -> Self::Output {
        RationalDuration(&self.0 + &rhs.0)
    }
}

impl AddAssign<&RationalDuration> for RationalDuration {
    fn add_assign(&mut self, rhs: &RationalDuration) {
        self.0 += &rhs.0;
    }
}

impl Sub for RationalDuration {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl<'a> Sub<&'a RationalDuration> for &'a RationalDuration {
    type Output = RationalDuration;

    fn sub(self, rhs: &'a RationalDuration) -> Self::Output {
        RationalDuration(&self.0 - &rhs.0)
    }
}

impl Mul for RationalDuration {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Self(self.0 * rhs.0)
    }
}

impl<'a> Mul<&'a RationalDuration> for &'a RationalDuration {
    type Output = RationalDuration;

    fn mul(self, rhs: &'a RationalDuration) -> Self::Output {
        RationalDuration(&self.0 * &rhs.0)
    }
}

impl Mul<i64> for &RationalDuration {
    type Output = RationalDuration;

    fn mul(self, rhs: i64) -> Self::Output {
        RationalDuration(&self.0 * BigRational::from_integer(BigInt::from(rhs)))
    }
}

impl Sum for RationalDuration {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, x| acc + x)
    }
}

impl<'a> Sum<&'a RationalDuration> for RationalDuration {
    fn sum<I: Iterator<Item = &'a RationalDuration>>(iter: I) -> Self {
        iter.fold(Self::zero(), |mut acc, x| {
            acc += x;
            acc
        })
    }
}

/// Shorthand for a known-good fraction in tables and tests.
///
/// Panics on a zero denominator, so only use it with literal arguments.
pub fn ql(numer: i64, denom: i64) -> RationalDuration {
    match RationalDuration::new(numer, denom) {
        Some(value) => value,
        None => panic!("zero denominator in ql({numer}, {denom})"),
    }
}
