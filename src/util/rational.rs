//! Rational number representation and integer rescaling for timestamps and frame rates

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

/// Number of microseconds in a second; session-level times use `1/TIME_BASE_US`
pub const TIME_BASE_US: i64 = 1_000_000;

/// Rounding mode for [`rescale_rnd`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Round toward zero
    Zero,
    /// Round away from zero
    Inf,
    /// Round toward negative infinity
    Down,
    /// Round toward positive infinity
    Up,
    /// Round to nearest, halfway cases away from zero
    NearInf,
}

impl Rounding {
    /// Rounding direction to use for the magnitude of a negative operand
    fn mirrored(self) -> Self {
        match self {
            Rounding::Down => Rounding::Up,
            Rounding::Up => Rounding::Down,
            other => other,
        }
    }
}

/// A rational number represented as numerator/denominator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

impl Rational {
    /// Create a new rational number
    pub fn new(num: i64, den: i64) -> Self {
        let mut r = Rational { num, den };
        r.reduce();
        r
    }

    /// Create a rational from an integer
    pub fn from_int(n: i64) -> Self {
        Rational { num: n, den: 1 }
    }

    /// Convert to floating point
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    /// True when the value is zero or undefined
    pub fn is_zero(self) -> bool {
        self.num == 0 || self.den == 0
    }

    /// Best approximation of `num/den` whose terms do not exceed `max`.
    ///
    /// Returns the approximation and whether it is exact.
    pub fn reduce_with_limit(num: i64, den: i64, max: i64) -> (Rational, bool) {
        let mut a0 = (0i128, 1i128);
        let mut a1 = (1i128, 0i128);
        let negative = (num < 0) ^ (den < 0);
        let max = max as i128;

        let mut num = (num as i128).abs();
        let mut den = (den as i128).abs();
        let g = gcd_i128(num, den);
        if g != 0 {
            num /= g;
            den /= g;
        }
        if num <= max && den <= max {
            a1 = (num, den);
            den = 0;
        }

        while den != 0 {
            let mut x = num / den;
            let next_den = num - den * x;
            let a2n = x * a1.0 + a0.0;
            let a2d = x * a1.1 + a0.1;

            if a2n > max || a2d > max {
                if a1.0 != 0 {
                    x = (max - a0.0) / a1.0;
                }
                if a1.1 != 0 {
                    x = x.min((max - a0.1) / a1.1);
                }
                if den * (2 * x * a1.1 + a0.1) > num * a1.1 {
                    a1 = (x * a1.0 + a0.0, x * a1.1 + a0.1);
                }
                break;
            }

            a0 = a1;
            a1 = (a2n, a2d);
            num = den;
            den = next_den;
        }

        let n = if negative { -a1.0 } else { a1.0 };
        (
            Rational {
                num: n as i64,
                den: a1.1 as i64,
            },
            den == 0,
        )
    }

    /// Reduce the fraction to lowest terms
    fn reduce(&mut self) {
        if self.den == 0 {
            return;
        }

        let gcd = gcd(self.num.abs(), self.den.abs());
        if gcd > 1 {
            self.num /= gcd;
            self.den /= gcd;
        }

        // Keep denominator positive
        if self.den < 0 {
            self.num = -self.num;
            self.den = -self.den;
        }
    }

    /// Invert the rational number
    pub fn invert(self) -> Self {
        Rational::new(self.den, self.num)
    }
}

/// Greatest common divisor of two non-negative integers
pub fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

fn gcd_i128(mut a: i128, mut b: i128) -> i128 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// `a * b / c` rounded to nearest
pub fn rescale(a: i64, b: i64, c: i64) -> i64 {
    rescale_rnd(a, b, c, Rounding::NearInf)
}

/// `a * b / c` with an explicit rounding mode.
///
/// Returns `i64::MIN` (the unknown-timestamp sentinel) when `c <= 0` or `b < 0`.
pub fn rescale_rnd(a: i64, b: i64, c: i64, rnd: Rounding) -> i64 {
    if c <= 0 || b < 0 || a == i64::MIN {
        return i64::MIN;
    }
    if a < 0 {
        return -rescale_rnd(-a, b, c, rnd.mirrored());
    }

    let r: i128 = match rnd {
        Rounding::NearInf => (c / 2) as i128,
        Rounding::Inf | Rounding::Up => (c - 1) as i128,
        Rounding::Zero | Rounding::Down => 0,
    };
    let v = (a as i128 * b as i128 + r) / c as i128;
    v.clamp(i64::MIN as i128 + 1, i64::MAX as i128) as i64
}

/// Rescale `a` from time base `bq` to time base `cq`
pub fn rescale_q(a: i64, bq: Rational, cq: Rational) -> i64 {
    rescale_q_rnd(a, bq, cq, Rounding::NearInf)
}

/// Rescale `a` from time base `bq` to time base `cq` with an explicit rounding mode
pub fn rescale_q_rnd(a: i64, bq: Rational, cq: Rational, rnd: Rounding) -> i64 {
    rescale_rnd(a, bq.num * cq.den, cq.num * bq.den, rnd)
}

/// Compare two timestamps that may have wrapped around `modulus` (a power of two).
///
/// Returns a negative value when `a` is before `b`, zero when equal and a
/// positive value when `a` is after `b`.
pub fn compare_mod(a: i64, b: i64, modulus: u64) -> i64 {
    let masked = (a as u64).wrapping_sub(b as u64) & modulus.wrapping_sub(1);
    let mut c = masked as i64;
    if masked > (modulus >> 1) {
        c = masked.wrapping_sub(modulus) as i64;
    }
    c
}

impl Default for Rational {
    fn default() -> Self {
        Rational { num: 0, den: 1 }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl Add for Rational {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Rational::new(
            self.num * other.den + other.num * self.den,
            self.den * other.den,
        )
    }
}

impl Sub for Rational {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Rational::new(
            self.num * other.den - other.num * self.den,
            self.den * other.den,
        )
    }
}

impl Mul for Rational {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Rational::new(self.num * other.num, self.den * other.den)
    }
}

impl Div for Rational {
    type Output = Self;

    fn div(self, other: Self) -> Self {
        Rational::new(self.num * other.den, self.den * other.num)
    }
}
