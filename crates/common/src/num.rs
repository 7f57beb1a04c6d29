//! The numeric tower carried by `num` objects.
//!
//! Four representations, ordered by contagion: machine integer, big
//! integer, big rational, double. Binary operations promote both operands
//! to the higher of their two levels; exact results are normalised back to
//! the smallest representation that holds them.

use std::cmp::Ordering;
use std::fmt;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use thiserror::Error;

/// Numeric sub-tag of a `num` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NumTag {
    Int,
    Big,
    Ratio,
    Float,
}

/// Payload of a `num` object.
#[derive(Debug, Clone, PartialEq)]
pub enum Num {
    /// Machine integer.
    Int(i64),
    /// Integer outside the machine range. Never holds a value that fits `i64`.
    Big(BigInt),
    /// Exact non-integral rational. Never has denominator 1.
    Ratio(BigRational),
    /// Inexact double.
    Float(f64),
}

/// Failures of numeric operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NumError {
    #[error("exact division by zero")]
    DivisionByZero,

    #[error("operation requires an integer")]
    NotAnInteger,

    #[error("argument out of domain: {0}")]
    Domain(&'static str),
}

/// Both operands promoted to a common representation.
enum Pair {
    Ints(i64, i64),
    Bigs(BigInt, BigInt),
    Ratios(BigRational, BigRational),
    Floats(f64, f64),
}

fn promote(a: &Num, b: &Num) -> Pair {
    if let (Num::Int(x), Num::Int(y)) = (a, b) {
        return Pair::Ints(*x, *y);
    }
    if let (Some(x), Some(y)) = (a.to_bigint(), b.to_bigint()) {
        return Pair::Bigs(x, y);
    }
    if let (Some(x), Some(y)) = (a.to_ratio(), b.to_ratio()) {
        return Pair::Ratios(x, y);
    }
    Pair::Floats(a.to_f64(), b.to_f64())
}

/// Both operands as integers, or `NotAnInteger`.
enum IntPair {
    Small(i64, i64),
    Big(BigInt, BigInt),
}

fn promote_int(a: &Num, b: &Num) -> Result<IntPair, NumError> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => Ok(IntPair::Small(*x, *y)),
        _ => match (a.to_bigint(), b.to_bigint()) {
            (Some(x), Some(y)) => Ok(IntPair::Big(x, y)),
            _ => Err(NumError::NotAnInteger),
        },
    }
}

impl Num {
    pub fn tag(&self) -> NumTag {
        match self {
            Num::Int(_) => NumTag::Int,
            Num::Big(_) => NumTag::Big,
            Num::Ratio(_) => NumTag::Ratio,
            Num::Float(_) => NumTag::Float,
        }
    }

    /// Wrap a big integer, demoting it to `Int` when it fits.
    pub fn from_bigint(n: BigInt) -> Num {
        match n.to_i64() {
            Some(i) => Num::Int(i),
            None => Num::Big(n),
        }
    }

    /// Wrap a rational, demoting it to an integer when its denominator is 1.
    pub fn from_ratio(r: BigRational) -> Num {
        if r.is_integer() {
            Num::from_bigint(r.to_integer())
        } else {
            Num::Ratio(r)
        }
    }

    pub fn is_exact(&self) -> bool {
        !matches!(self, Num::Float(_))
    }

    pub fn is_integer(&self) -> bool {
        match self {
            Num::Int(_) | Num::Big(_) => true,
            Num::Ratio(_) => false,
            Num::Float(f) => f.is_finite() && f.fract() == 0.0,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Num::Int(i) => *i == 0,
            Num::Big(_) | Num::Ratio(_) => false,
            Num::Float(f) => *f == 0.0,
        }
    }

    /// The value as a machine integer, if it is an exact integer in range.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Num::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The value as a big integer, if it is an exact integer.
    pub fn to_bigint(&self) -> Option<BigInt> {
        match self {
            Num::Int(i) => Some(BigInt::from(*i)),
            Num::Big(n) => Some(n.clone()),
            Num::Ratio(_) | Num::Float(_) => None,
        }
    }

    /// The value as a rational, if it is exact.
    pub fn to_ratio(&self) -> Option<BigRational> {
        match self {
            Num::Int(i) => Some(BigRational::from_integer(BigInt::from(*i))),
            Num::Big(n) => Some(BigRational::from_integer(n.clone())),
            Num::Ratio(r) => Some(r.clone()),
            Num::Float(_) => None,
        }
    }

    /// Nearest double. Out-of-range exact values become infinities.
    pub fn to_f64(&self) -> f64 {
        match self {
            Num::Int(i) => *i as f64,
            Num::Big(n) => bigint_to_f64(n),
            Num::Ratio(r) => bigint_to_f64(r.numer()) / bigint_to_f64(r.denom()),
            Num::Float(f) => *f,
        }
    }

    pub fn add(&self, other: &Num) -> Num {
        match promote(self, other) {
            Pair::Ints(x, y) => match x.checked_add(y) {
                Some(r) => Num::Int(r),
                None => Num::from_bigint(BigInt::from(x) + y),
            },
            Pair::Bigs(x, y) => Num::from_bigint(x + y),
            Pair::Ratios(x, y) => Num::from_ratio(x + y),
            Pair::Floats(x, y) => Num::Float(x + y),
        }
    }

    pub fn sub(&self, other: &Num) -> Num {
        match promote(self, other) {
            Pair::Ints(x, y) => match x.checked_sub(y) {
                Some(r) => Num::Int(r),
                None => Num::from_bigint(BigInt::from(x) - y),
            },
            Pair::Bigs(x, y) => Num::from_bigint(x - y),
            Pair::Ratios(x, y) => Num::from_ratio(x - y),
            Pair::Floats(x, y) => Num::Float(x - y),
        }
    }

    pub fn mul(&self, other: &Num) -> Num {
        match promote(self, other) {
            Pair::Ints(x, y) => match x.checked_mul(y) {
                Some(r) => Num::Int(r),
                None => Num::from_bigint(BigInt::from(x) * y),
            },
            Pair::Bigs(x, y) => Num::from_bigint(x * y),
            Pair::Ratios(x, y) => Num::from_ratio(x * y),
            Pair::Floats(x, y) => Num::Float(x * y),
        }
    }

    /// Division. Exact operands give an exact quotient; an exact zero divisor
    /// is an error, a float zero divisor follows IEEE 754.
    pub fn div(&self, other: &Num) -> Result<Num, NumError> {
        match promote(self, other) {
            Pair::Ints(x, y) => exact_quotient(BigInt::from(x), BigInt::from(y)),
            Pair::Bigs(x, y) => exact_quotient(x, y),
            Pair::Ratios(x, y) => {
                if y.is_zero() {
                    return Err(NumError::DivisionByZero);
                }
                Ok(Num::from_ratio(x / y))
            }
            Pair::Floats(x, y) => Ok(Num::Float(x / y)),
        }
    }

    pub fn neg(&self) -> Num {
        match self {
            Num::Int(i) => match i.checked_neg() {
                Some(r) => Num::Int(r),
                None => Num::from_bigint(-BigInt::from(*i)),
            },
            Num::Big(n) => Num::from_bigint(-n),
            Num::Ratio(r) => Num::Ratio(-r),
            Num::Float(f) => Num::Float(-f),
        }
    }

    pub fn abs(&self) -> Num {
        if self.is_negative() {
            self.neg()
        } else {
            self.clone()
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Num::Int(i) => *i < 0,
            Num::Big(n) => n.is_negative(),
            Num::Ratio(r) => r.is_negative(),
            Num::Float(f) => *f < 0.0,
        }
    }

    /// Floored modulo: the result takes the sign of the divisor.
    pub fn modulo(&self, other: &Num) -> Result<Num, NumError> {
        match promote_int(self, other)? {
            IntPair::Small(_, 0) => Err(NumError::DivisionByZero),
            IntPair::Small(x, y) => {
                let r = x.wrapping_rem(y);
                if r != 0 && (r < 0) != (y < 0) {
                    Ok(Num::Int(r + y))
                } else {
                    Ok(Num::Int(r))
                }
            }
            IntPair::Big(x, y) => {
                if y.is_zero() {
                    return Err(NumError::DivisionByZero);
                }
                let r = &x % &y;
                if !r.is_zero() && r.is_negative() != y.is_negative() {
                    Ok(Num::from_bigint(r + y))
                } else {
                    Ok(Num::from_bigint(r))
                }
            }
        }
    }

    /// Numeric equality across representations. NaN equals nothing.
    pub fn num_eq(&self, other: &Num) -> bool {
        self.partial_cmp_num(other) == Some(Ordering::Equal)
    }

    /// Numeric ordering across representations. `None` if either is NaN.
    pub fn partial_cmp_num(&self, other: &Num) -> Option<Ordering> {
        match promote(self, other) {
            Pair::Ints(x, y) => Some(x.cmp(&y)),
            Pair::Bigs(x, y) => Some(x.cmp(&y)),
            Pair::Ratios(x, y) => Some(x.cmp(&y)),
            Pair::Floats(x, y) => x.partial_cmp(&y),
        }
    }

    pub fn floor(&self) -> Num {
        match self {
            Num::Ratio(r) => Num::from_ratio(r.floor()),
            Num::Float(f) => Num::Float(f.floor()),
            _ => self.clone(),
        }
    }

    pub fn ceiling(&self) -> Num {
        match self {
            Num::Ratio(r) => Num::from_ratio(r.ceil()),
            Num::Float(f) => Num::Float(f.ceil()),
            _ => self.clone(),
        }
    }

    pub fn truncate(&self) -> Num {
        match self {
            Num::Ratio(r) => Num::from_ratio(r.trunc()),
            Num::Float(f) => Num::Float(f.trunc()),
            _ => self.clone(),
        }
    }

    /// Round to nearest, ties to even.
    pub fn round(&self) -> Num {
        match self {
            Num::Ratio(r) => Num::from_ratio(round_half_even(r)),
            Num::Float(f) => Num::Float(f.round_ties_even()),
            _ => self.clone(),
        }
    }

    pub fn to_inexact(&self) -> Num {
        Num::Float(self.to_f64())
    }

    /// Exact rational equal to this value. Floats convert without rounding.
    pub fn to_exact(&self) -> Result<Num, NumError> {
        match self {
            Num::Float(f) => BigRational::from_float(*f)
                .map(Num::from_ratio)
                .ok_or(NumError::Domain("non-finite float has no exact value")),
            _ => Ok(self.clone()),
        }
    }

    pub fn sqrt(&self) -> Num {
        Num::Float(self.to_f64().sqrt())
    }

    /// `e` raised to this value.
    pub fn exp(&self) -> Num {
        Num::Float(self.to_f64().exp())
    }

    /// This value raised to `exponent`. Exact for an exact integer base and
    /// a non-negative machine-integer exponent that fits `u32`.
    ///
    /// An exact result estimated at more than [`MAX_EXACT_BITS`] bits is a
    /// domain error, checked before anything is computed.
    pub fn pow(&self, exponent: &Num) -> Result<Num, NumError> {
        if let (Some(base), Some(e)) = (self.to_bigint(), exponent.as_i64()) {
            if let Ok(e) = u32::try_from(e) {
                // 0, 1 and -1 stay one bit wide under any power.
                let bits = base.bits();
                if bits > 1 && bits.saturating_mul(u64::from(e)) > MAX_EXACT_BITS {
                    return Err(NumError::Domain("exponent too large"));
                }
                return Ok(Num::from_bigint(base.pow(e)));
            }
        }
        Ok(Num::Float(self.to_f64().powf(exponent.to_f64())))
    }

    /// Natural logarithm.
    pub fn ln(&self) -> Num {
        Num::Float(self.to_f64().ln())
    }

    /// Logarithm of this value in base `base`.
    pub fn log(&self, base: &Num) -> Num {
        Num::Float(self.to_f64().ln() / base.to_f64().ln())
    }

    pub fn bit_and(&self, other: &Num) -> Result<Num, NumError> {
        Ok(match promote_int(self, other)? {
            IntPair::Small(x, y) => Num::Int(x & y),
            IntPair::Big(x, y) => Num::from_bigint(x & y),
        })
    }

    pub fn bit_or(&self, other: &Num) -> Result<Num, NumError> {
        Ok(match promote_int(self, other)? {
            IntPair::Small(x, y) => Num::Int(x | y),
            IntPair::Big(x, y) => Num::from_bigint(x | y),
        })
    }

    pub fn bit_xor(&self, other: &Num) -> Result<Num, NumError> {
        Ok(match promote_int(self, other)? {
            IntPair::Small(x, y) => Num::Int(x ^ y),
            IntPair::Big(x, y) => Num::from_bigint(x ^ y),
        })
    }

    pub fn bit_not(&self) -> Result<Num, NumError> {
        match self {
            Num::Int(i) => Ok(Num::Int(!i)),
            Num::Big(n) => Ok(Num::from_bigint(!n)),
            _ => Err(NumError::NotAnInteger),
        }
    }

    /// Left shift. Never overflows; large results become big integers.
    pub fn shl(&self, amount: &Num) -> Result<Num, NumError> {
        let k = shift_amount(amount)?;
        match self {
            Num::Int(i) if k < 63 && (i << k) >> k == *i => Ok(Num::Int(i << k)),
            Num::Int(i) => Ok(Num::from_bigint(BigInt::from(*i) << k)),
            Num::Big(n) => Ok(Num::from_bigint(n << k)),
            _ => Err(NumError::NotAnInteger),
        }
    }

    /// Arithmetic right shift, rounding toward negative infinity.
    pub fn shr(&self, amount: &Num) -> Result<Num, NumError> {
        let k = shift_amount(amount)?;
        match self {
            Num::Int(i) => Ok(Num::Int(i >> k.min(63))),
            Num::Big(n) => Ok(Num::from_bigint(n >> k)),
            _ => Err(NumError::NotAnInteger),
        }
    }
}

/// Largest accepted shift distance.
const MAX_SHIFT: usize = 1 << 24;

/// Largest exact power result, in bits, that `pow` will build.
pub const MAX_EXACT_BITS: u64 = 1 << 24;

fn shift_amount(amount: &Num) -> Result<usize, NumError> {
    match amount {
        Num::Int(k) if *k >= 0 => usize::try_from(*k)
            .ok()
            .filter(|k| *k <= MAX_SHIFT)
            .ok_or(NumError::Domain("shift amount too large")),
        Num::Int(_) => Err(NumError::Domain("negative shift amount")),
        Num::Big(_) => Err(NumError::Domain("shift amount too large")),
        _ => Err(NumError::NotAnInteger),
    }
}

fn exact_quotient(x: BigInt, y: BigInt) -> Result<Num, NumError> {
    if y.is_zero() {
        return Err(NumError::DivisionByZero);
    }
    Ok(Num::from_ratio(BigRational::new(x, y)))
}

fn bigint_to_f64(n: &BigInt) -> f64 {
    n.to_f64().unwrap_or(if n.is_negative() {
        f64::NEG_INFINITY
    } else {
        f64::INFINITY
    })
}

fn round_half_even(r: &BigRational) -> BigRational {
    let floor = r.floor();
    let half = BigRational::new(BigInt::one(), BigInt::from(2));
    match (r - &floor).cmp(&half) {
        Ordering::Less => floor,
        Ordering::Greater => floor + BigRational::one(),
        Ordering::Equal => {
            if (floor.to_integer() % BigInt::from(2)).is_zero() {
                floor
            } else {
                floor + BigRational::one()
            }
        }
    }
}

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Num::Int(i) => write!(f, "{i}"),
            Num::Big(n) => write!(f, "{n}"),
            Num::Ratio(r) => write!(f, "{}/{}", r.numer(), r.denom()),
            Num::Float(x) => write!(f, "{x:?}"),
        }
    }
}

impl From<i64> for Num {
    fn from(i: i64) -> Self {
        Num::Int(i)
    }
}

impl From<f64> for Num {
    fn from(x: f64) -> Self {
        Num::Float(x)
    }
}
