//! Integer helpers shared by the tally and the vault accounting.
//!
//! Everything here works on 256-bit unsigned integers. Products go through a
//! 512-bit intermediate so `a * b / d` never loses precision to an early
//! overflow; only a quotient that does not fit in 256 bits is an error.

use primitive_types::{U256, U512};

use crate::error::{Result, TallyError};

/// Floor of the square root of `x`, computed with the Babylonian method.
///
/// The iteration starts from `(x + 1) / 2` and descends monotonically until
/// it stops decreasing.
pub fn isqrt(x: U256) -> U256 {
    if x.is_zero() {
        return U256::zero();
    }

    // (x + 1) / 2 without overflowing at U256::MAX
    let mut z = (x >> 1) + (x & U256::one());
    let mut y = x;
    while z < y {
        y = z;
        z = (x / z + z) >> 1;
    }
    y
}

fn overflow(a: U256, b: U256, d: U256) -> TallyError {
    TallyError::Overflow(format!("{} * {} / {} does not fit in 256 bits", a, b, d))
}

/// `floor(a * b / d)` with a 512-bit intermediate product.
pub fn mul_div(a: U256, b: U256, d: U256) -> Result<U256> {
    if d.is_zero() {
        return Err(TallyError::DivisionByZero);
    }

    let quotient = a.full_mul(b) / U512::from(d);
    U256::try_from(quotient).map_err(|_| overflow(a, b, d))
}

/// `ceil(a * b / d)` with a 512-bit intermediate product.
pub fn mul_div_ceil(a: U256, b: U256, d: U256) -> Result<U256> {
    if d.is_zero() {
        return Err(TallyError::DivisionByZero);
    }

    let product = a.full_mul(b);
    let divisor = U512::from(d);
    let floor = U256::try_from(product / divisor).map_err(|_| overflow(a, b, d))?;

    if (product % divisor).is_zero() {
        Ok(floor)
    } else {
        floor
            .checked_add(U256::one())
            .ok_or_else(|| TallyError::Overflow("rounding up past 256 bits".to_string()))
    }
}
