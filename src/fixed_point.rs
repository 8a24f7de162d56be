//! 18-decimal fixed point arithmetic for every consensus-critical number.
//!
//! A `FixedDec` is a sign plus a magnitude scaled by 10^18. Products and quotients are
//! rounded half-to-even back to 18 places, and any value wider than 315 bits is out
//! of bounds. Two replicas feeding the same decimal inputs through these functions get
//! identical outputs, which `rust_decimal`'s 96-bit mantissa cannot promise once
//! interest factors are raised to 10^7-scale powers.

use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;
use uint::construct_uint;

construct_uint! {
    pub struct U512(8);
}

pub const PRECISION: u32 = 18;

const SCALE: u64 = 1_000_000_000_000_000_000;
const HALF_SCALE: u64 = SCALE / 2;
// 256 integer bits plus floor(log2(10^18 - 1)) fractional bits
const MAX_DEC_BITS: usize = 315;
// scaled-integer helpers are capped at 256 bits
const MAX_UINT_BITS: usize = 256;
const MAX_ROOT_ITERATIONS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FixedPointError {
    #[error("decimal out of bounds")]
    OutOfBounds,
    #[error("division by zero")]
    DivisionByZero,
    #[error("negative value where an unsigned amount was expected")]
    Negative,
    #[error("value cannot be represented in the target type")]
    Unrepresentable,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FixedDec {
    negative: bool,
    mag: U512,
}

fn scale() -> U512 {
    U512::from(SCALE)
}

// divide by 10^18, rounding half to even
fn chop_round(x: U512) -> U512 {
    let (quo, rem) = x.div_mod(scale());
    match rem.cmp(&U512::from(HALF_SCALE)) {
        Ordering::Less => quo,
        Ordering::Greater => quo + U512::one(),
        Ordering::Equal => {
            if quo.low_u64() % 2 == 0 {
                quo
            } else {
                quo + U512::one()
            }
        }
    }
}

impl FixedDec {
    pub const ZERO: FixedDec = FixedDec {
        negative: false,
        mag: U512([0; 8]),
    };
    pub const ONE: FixedDec = FixedDec {
        negative: false,
        mag: U512([SCALE, 0, 0, 0, 0, 0, 0, 0]),
    };
    pub const SMALLEST: FixedDec = FixedDec {
        negative: false,
        mag: U512([1, 0, 0, 0, 0, 0, 0, 0]),
    };

    fn from_parts(negative: bool, mag: U512) -> Result<Self, FixedPointError> {
        if mag.bits() > MAX_DEC_BITS {
            return Err(FixedPointError::OutOfBounds);
        }
        Ok(Self {
            negative: negative && !mag.is_zero(),
            mag,
        })
    }

    /// Wraps an already-scaled mantissa, e.g. 10^18 is 1.0.
    pub fn from_mantissa(mantissa: U512) -> Result<Self, FixedPointError> {
        Self::from_parts(false, mantissa)
    }

    pub fn from_int(n: u128) -> Result<Self, FixedPointError> {
        let mag = U512::from(n)
            .checked_mul(scale())
            .ok_or(FixedPointError::OutOfBounds)?;
        Self::from_parts(false, mag)
    }

    pub fn from_decimal(d: Decimal) -> Result<Self, FixedPointError> {
        let d = if d.scale() > PRECISION { d.round_dp(PRECISION) } else { d };
        let mantissa = d.mantissa();
        let mag = U512::from(mantissa.unsigned_abs())
            .checked_mul(U512::exp10((PRECISION - d.scale()) as usize))
            .ok_or(FixedPointError::OutOfBounds)?;
        Self::from_parts(mantissa < 0, mag)
    }

    /// Converts back to `Decimal` at 18 places. Values too wide for a 96-bit
    /// mantissa give up trailing places, rounding half to even.
    pub fn to_decimal(&self) -> Result<Decimal, FixedPointError> {
        let ten = U512::from(10u8);
        let mut mag = self.mag;
        let mut scale = PRECISION;
        while mag.bits() > 96 {
            if scale == 0 {
                return Err(FixedPointError::Unrepresentable);
            }
            let (quo, rem) = mag.div_mod(ten);
            let five = U512::from(5u8);
            mag = if rem > five || (rem == five && quo.low_u64() % 2 == 1) {
                quo + U512::one()
            } else {
                quo
            };
            scale -= 1;
        }
        let m = mag.low_u128() as i128;
        let m = if self.negative { -m } else { m };
        Decimal::try_from_i128_with_scale(m, scale).map_err(|_| FixedPointError::Unrepresentable)
    }

    pub fn mantissa(&self) -> U512 {
        self.mag
    }

    pub fn is_zero(&self) -> bool {
        self.mag.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn abs(&self) -> Self {
        Self {
            negative: false,
            mag: self.mag,
        }
    }

    pub fn neg(&self) -> Self {
        Self {
            negative: !self.negative && !self.mag.is_zero(),
            mag: self.mag,
        }
    }

    pub fn add(&self, other: &FixedDec) -> Result<Self, FixedPointError> {
        if self.negative == other.negative {
            let mag = self
                .mag
                .checked_add(other.mag)
                .ok_or(FixedPointError::OutOfBounds)?;
            return Self::from_parts(self.negative, mag);
        }
        match self.mag.cmp(&other.mag) {
            Ordering::Less => Self::from_parts(other.negative, other.mag - self.mag),
            _ => Self::from_parts(self.negative, self.mag - other.mag),
        }
    }

    pub fn sub(&self, other: &FixedDec) -> Result<Self, FixedPointError> {
        self.add(&other.neg())
    }

    pub fn mul(&self, other: &FixedDec) -> Result<Self, FixedPointError> {
        let product = self
            .mag
            .checked_mul(other.mag)
            .ok_or(FixedPointError::OutOfBounds)?;
        Self::from_parts(self.negative != other.negative, chop_round(product))
    }

    pub fn mul_int(&self, n: u128) -> Result<Self, FixedPointError> {
        let mag = self
            .mag
            .checked_mul(U512::from(n))
            .ok_or(FixedPointError::OutOfBounds)?;
        Self::from_parts(self.negative, mag)
    }

    pub fn quo(&self, other: &FixedDec) -> Result<Self, FixedPointError> {
        if other.is_zero() {
            return Err(FixedPointError::DivisionByZero);
        }
        let widened = self
            .mag
            .checked_mul(scale())
            .and_then(|m| m.checked_mul(scale()))
            .ok_or(FixedPointError::OutOfBounds)?;
        let (quo, _) = widened.div_mod(other.mag);
        Self::from_parts(self.negative != other.negative, chop_round(quo))
    }

    // truncating division by an unscaled integer
    pub fn quo_int(&self, n: u128) -> Result<Self, FixedPointError> {
        if n == 0 {
            return Err(FixedPointError::DivisionByZero);
        }
        let (quo, _) = self.mag.div_mod(U512::from(n));
        Self::from_parts(self.negative, quo)
    }

    /// Integer part, rounding toward zero. Fails on negative values.
    pub fn truncate_int(&self) -> Result<u128, FixedPointError> {
        let (quo, _) = self.mag.div_mod(scale());
        if self.negative && !quo.is_zero() {
            return Err(FixedPointError::Negative);
        }
        u128::try_from(quo).map_err(|_| FixedPointError::Unrepresentable)
    }

    pub fn min(self, other: FixedDec) -> FixedDec {
        if self <= other {
            self
        } else {
            other
        }
    }

    /// Square-and-multiply power. Every intermediate product is rounded.
    pub fn power(&self, power: u64) -> Result<Self, FixedPointError> {
        if power == 0 {
            return Ok(Self::ONE);
        }
        let mut base = *self;
        let mut tmp = Self::ONE;
        let mut i = power;
        while i > 1 {
            if i % 2 != 0 {
                tmp = tmp.mul(&base)?;
            }
            i /= 2;
            base = base.mul(&base)?;
        }
        base.mul(&tmp)
    }

    /// Newton's method n-th root starting from 1.0. Stops once the step is no
    /// larger than 10^-18 or after 100 steps, whichever comes first; a slow
    /// descent from a large radicand returns the unconverged guess.
    pub fn approx_root(&self, root: u64) -> Result<Self, FixedPointError> {
        if self.negative {
            return Ok(self.neg().approx_root(root)?.neg());
        }
        if root == 1 || self.is_zero() || *self == Self::ONE {
            return Ok(*self);
        }
        if root == 0 {
            return Ok(Self::ONE);
        }
        let mut guess = Self::ONE;
        let mut delta = Self::ONE;
        let mut iter = 0;
        while delta.abs() > Self::SMALLEST && iter < MAX_ROOT_ITERATIONS {
            let mut prev = guess.power(root - 1)?;
            if prev.is_zero() {
                prev = Self::SMALLEST;
            }
            delta = self.quo(&prev)?.sub(&guess)?.quo_int(root as u128)?;
            guess = guess.add(&delta)?;
            iter += 1;
        }
        Ok(guess)
    }
}

fn checked_uint(value: Option<U512>) -> Result<U512, FixedPointError> {
    match value {
        Some(v) if v.bits() <= MAX_UINT_BITS => Ok(v),
        _ => Err(FixedPointError::OutOfBounds),
    }
}

/// `x^n` where `x` and the result are integers scaled by `base`, rounding each
/// product half up. The 256-bit ceiling is an error rather than a wrap.
pub fn relative_pow(x: U512, n: u64, base: U512) -> Result<U512, FixedPointError> {
    if base.is_zero() {
        return Err(FixedPointError::DivisionByZero);
    }
    if x.is_zero() {
        return Ok(if n == 0 { base } else { U512::zero() });
    }
    let half = base / U512::from(2u8);
    let mut x = x;
    let mut z = if n % 2 == 0 { base } else { x };
    let mut n = n / 2;
    while n > 0 {
        let squared = checked_uint(x.checked_mul(x))?;
        x = checked_uint(squared.checked_add(half))? / base;
        if n % 2 == 1 {
            let zx = checked_uint(z.checked_mul(x))?;
            z = checked_uint(zx.checked_add(half))? / base;
        }
        n /= 2;
    }
    Ok(z)
}

impl PartialOrd for FixedDec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FixedDec {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => self.mag.cmp(&other.mag),
            (true, true) => other.mag.cmp(&self.mag),
        }
    }
}

impl fmt::Display for FixedDec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (int, frac) = self.mag.div_mod(scale());
        let sign = if self.negative { "-" } else { "" };
        write!(f, "{sign}{int}.{:018}", frac.low_u64())
    }
}

impl fmt::Debug for FixedDec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixedDec({self})")
    }
}
