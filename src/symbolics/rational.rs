//! Exact rational numbers for expression constants and stencil weights.
//!
//! Values are kept in lowest terms with a positive denominator, so derived
//! `Eq`/`Hash` agree with numeric equality.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    num: i128,
    den: i128,
}

impl Rational {
    pub const ZERO: Self = Rational { num: 0, den: 1 };
    pub const ONE: Self = Rational { num: 1, den: 1 };
    pub const MINUS_ONE: Self = Rational { num: -1, den: 1 };

    /// Build `num/den` in lowest terms.
    ///
    /// # Panics
    ///
    /// Panics if `den == 0`.
    pub fn new(num: i64, den: i64) -> Self {
        assert!(den != 0, "rational with zero denominator");
        Self::reduce(i128::from(num), i128::from(den)).expect("i64 ratio fits in i128")
    }

    pub const fn integer(n: i64) -> Self {
        Rational {
            num: n as i128,
            den: 1,
        }
    }

    fn reduce(mut num: i128, mut den: i128) -> Option<Self> {
        if den == 0 {
            return None;
        }
        if den < 0 {
            num = num.checked_neg()?;
            den = den.checked_neg()?;
        }
        if num == 0 {
            return Some(Self::ZERO);
        }
        let g = i128::try_from(gcd(num.unsigned_abs(), den.unsigned_abs())).ok()?;
        Some(Rational {
            num: num / g,
            den: den / g,
        })
    }

    pub fn numer(self) -> i128 {
        self.num
    }

    pub fn denom(self) -> i128 {
        self.den
    }

    /// The value as an `i64`, if it is an integer in range.
    pub fn to_i64(self) -> Option<i64> {
        if self.den != 1 {
            return None;
        }
        i64::try_from(self.num).ok()
    }

    pub fn is_zero(self) -> bool {
        self.num == 0
    }

    pub fn is_one(self) -> bool {
        self.num == 1 && self.den == 1
    }

    pub fn is_integer(self) -> bool {
        self.den == 1
    }

    pub fn is_negative(self) -> bool {
        self.num < 0
    }

    pub fn abs(self) -> Self {
        if self.is_negative() {
            -self
        } else {
            self
        }
    }

    /// `None` for zero.
    pub fn recip(self) -> Option<Self> {
        Self::reduce(self.den, self.num)
    }

    /// Largest integer not greater than `self`.
    pub fn floor(self) -> i128 {
        self.num.div_euclid(self.den)
    }

    /// Smallest integer not less than `self`.
    pub fn ceil(self) -> i128 {
        -(-self).floor()
    }

    pub fn checked_add(self, other: Rational) -> Option<Rational> {
        let g = i128::try_from(gcd(self.den.unsigned_abs(), other.den.unsigned_abs())).ok()?;
        let (ls, rs) = (other.den / g, self.den / g);
        let num = self
            .num
            .checked_mul(ls)?
            .checked_add(other.num.checked_mul(rs)?)?;
        Self::reduce(num, self.den.checked_mul(ls)?)
    }

    pub fn checked_sub(self, other: Rational) -> Option<Rational> {
        self.checked_add(other.checked_neg()?)
    }

    /// Cross-cancels before multiplying, so the product overflows only when
    /// the reduced result does not fit.
    pub fn checked_mul(self, other: Rational) -> Option<Rational> {
        if self.is_zero() || other.is_zero() {
            return Some(Self::ZERO);
        }
        let g1 = i128::try_from(gcd(self.num.unsigned_abs(), other.den.unsigned_abs())).ok()?;
        let g2 = i128::try_from(gcd(other.num.unsigned_abs(), self.den.unsigned_abs())).ok()?;
        let num = (self.num / g1).checked_mul(other.num / g2)?;
        let den = (self.den / g2).checked_mul(other.den / g1)?;
        Self::reduce(num, den)
    }

    /// `None` on overflow or division by zero.
    pub fn checked_div(self, other: Rational) -> Option<Rational> {
        self.checked_mul(other.recip()?)
    }

    pub fn checked_neg(self) -> Option<Rational> {
        Some(Rational {
            num: self.num.checked_neg()?,
            den: self.den,
        })
    }

    /// Integer power; `None` when raising zero to a negative power or when
    /// the result overflows.
    pub fn powi(self, exp: i64) -> Option<Self> {
        let base = if exp < 0 { self.recip()? } else { self };
        let mut acc = Self::ONE;
        for _ in 0..exp.unsigned_abs() {
            acc = acc.checked_mul(base)?;
        }
        Some(acc)
    }

    /// Remainder with the sign of the divisor; `None` for a zero divisor.
    pub fn modulo(self, rhs: Self) -> Option<Self> {
        let q = self.checked_div(rhs)?;
        let whole = Self::reduce(q.floor(), 1)?;
        self.checked_sub(rhs.checked_mul(whole)?)
    }

    pub fn to_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// Compares `a/b` with `c/d` (`b, d > 0`) through their continued fractions,
/// which never overflows.
fn cmp_fractions(a: i128, b: i128, c: i128, d: i128) -> Ordering {
    let (q1, q2) = (a.div_euclid(b), c.div_euclid(d));
    if q1 != q2 {
        return q1.cmp(&q2);
    }
    let (r1, r2) = (a.rem_euclid(b), c.rem_euclid(d));
    match (r1 == 0, r2 == 0) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        // r1/b < r2/d  <=>  d/r2 < b/r1
        (false, false) => cmp_fractions(d, r2, b, r1),
    }
}

impl From<i64> for Rational {
    fn from(n: i64) -> Self {
        Rational::integer(n)
    }
}

impl From<i32> for Rational {
    fn from(n: i32) -> Self {
        Rational::integer(i64::from(n))
    }
}

impl From<u32> for Rational {
    fn from(n: u32) -> Self {
        Rational::integer(i64::from(n))
    }
}

impl From<i128> for Rational {
    fn from(n: i128) -> Self {
        Rational { num: n, den: 1 }
    }
}

// The operators panic on overflow, like the integer operators do in debug
// builds. Use the `checked_*` methods where operands are not small.

impl Add for Rational {
    type Output = Rational;
    fn add(self, other: Rational) -> Rational {
        self.checked_add(other).expect("rational addition overflowed")
    }
}

impl Sub for Rational {
    type Output = Rational;
    fn sub(self, other: Rational) -> Rational {
        self.checked_sub(other).expect("rational subtraction overflowed")
    }
}

impl Mul for Rational {
    type Output = Rational;
    fn mul(self, other: Rational) -> Rational {
        self.checked_mul(other).expect("rational multiplication overflowed")
    }
}

impl Div for Rational {
    type Output = Rational;

    /// # Panics
    ///
    /// Panics on division by zero, like integer division.
    fn div(self, other: Rational) -> Rational {
        assert!(!other.is_zero(), "rational division by zero");
        self.checked_div(other).expect("rational division overflowed")
    }
}

impl Neg for Rational {
    type Output = Rational;
    fn neg(self) -> Rational {
        self.checked_neg().expect("rational negation overflowed")
    }
}

impl Mul<Rational> for i64 {
    type Output = Rational;
    fn mul(self, other: Rational) -> Rational {
        Rational::integer(self) * other
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_fractions(self.num, self.den, other.num, other.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(Rational::new(2, 4), Rational::new(1, 2));
        assert_eq!(Rational::new(3, -6), Rational::new(-1, 2));
        assert_eq!(Rational::new(0, 7), Rational::ZERO);
    }

    #[test]
    fn test_arithmetic() {
        let half = Rational::new(1, 2);
        let third = Rational::new(1, 3);
        assert_eq!(half + third, Rational::new(5, 6));
        assert_eq!(half - third, Rational::new(1, 6));
        assert_eq!(half * third, Rational::new(1, 6));
        assert_eq!(half / third, Rational::new(3, 2));
        assert_eq!(-half, Rational::new(-1, 2));
    }

    #[test]
    fn test_floor_and_ceil() {
        assert_eq!(Rational::new(7, 2).floor(), 3);
        assert_eq!(Rational::new(-7, 2).floor(), -4);
        assert_eq!(Rational::new(-7, 2).ceil(), -3);
        assert_eq!(Rational::integer(4).ceil(), 4);
    }

    #[test]
    fn test_powi() {
        assert_eq!(Rational::new(2, 3).powi(2), Some(Rational::new(4, 9)));
        assert_eq!(Rational::integer(2).powi(-2), Some(Rational::new(1, 4)));
        assert_eq!(Rational::ZERO.powi(-1), None);
        assert_eq!(Rational::ZERO.powi(0), Some(Rational::ONE));
    }

    #[test]
    fn test_modulo_follows_divisor_sign() {
        let m = |a, b| Rational::integer(a).modulo(Rational::integer(b));
        assert_eq!(m(7, 3), Some(Rational::integer(1)));
        assert_eq!(m(-7, 3), Some(Rational::integer(2)));
        assert_eq!(m(7, -3), Some(Rational::integer(-2)));
        assert_eq!(m(7, 0), None);
    }

    #[test]
    fn test_ordering() {
        assert!(Rational::new(-1, 2) < Rational::ZERO);
        assert!(Rational::new(1, 3) < Rational::new(1, 2));
        assert!(Rational::new(-7, 2) < Rational::integer(-3));
        let big = Rational::from(i128::MAX / 3);
        assert!(big.recip().unwrap() < (big - Rational::ONE).recip().unwrap());
    }

    #[test]
    fn test_i64_bounds_do_not_wrap() {
        let max = Rational::integer(i64::MAX);
        let next = max + Rational::ONE;
        assert_eq!(next.numer(), i128::from(i64::MAX) + 1);
        assert_eq!(next.to_i64(), None);
        assert_eq!(max.to_i64(), Some(i64::MAX));
        assert_eq!(Rational::integer(i64::MIN).abs().numer(), 1i128 << 63);
    }

    #[test]
    fn test_overflow_is_reported() {
        let huge = Rational::from(i128::MAX);
        assert_eq!(huge.checked_add(Rational::ONE), None);
        assert_eq!(huge.checked_mul(Rational::integer(2)), None);
        assert_eq!(Rational::integer(10).powi(40), None);
        assert_eq!(Rational::ONE.checked_div(Rational::ZERO), None);
    }

    #[test]
    fn test_cross_cancellation_keeps_products_in_range() {
        let a = Rational::reduce(i128::MAX / 7 * 6, 5).unwrap();
        let b = Rational::reduce(5, i128::MAX / 7 * 6).unwrap();
        assert_eq!(a.checked_mul(b), Some(Rational::ONE));
    }
}
