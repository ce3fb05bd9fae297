//! Alpha weighting between quadratic and linear funding.
//!
//! Alpha is always carried as an exact fraction. Funding for a quadratic
//! term `q` and a linear term `l` is
//! `floor(q * num / den) + floor(l * (den - num) / den)`.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};
use crate::math::mul_div;

/// Blend weight between quadratic and linear funding, as `numerator / denominator`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alpha {
    numerator: U256,
    denominator: U256,
}

impl Alpha {
    /// Create a new alpha, rejecting a zero denominator or a value above one
    pub fn new(numerator: U256, denominator: U256) -> Result<Self> {
        if denominator.is_zero() {
            return Err(TallyError::InvalidAlpha(
                "denominator must be greater than zero".to_string(),
            ));
        }
        if numerator > denominator {
            return Err(TallyError::InvalidAlpha(format!(
                "numerator {} exceeds denominator {}",
                numerator, denominator
            )));
        }

        Ok(Self { numerator, denominator })
    }

    /// Pure quadratic funding
    pub fn one() -> Self {
        Self { numerator: U256::one(), denominator: U256::one() }
    }

    /// Pure linear funding
    pub fn zero() -> Self {
        Self { numerator: U256::zero(), denominator: U256::one() }
    }

    pub fn numerator(&self) -> U256 {
        self.numerator
    }

    pub fn denominator(&self) -> U256 {
        self.denominator
    }

    /// `floor(quadratic * alpha)`
    pub fn weigh_quadratic(&self, quadratic: U256) -> Result<U256> {
        mul_div(quadratic, self.numerator, self.denominator)
    }

    /// `floor(linear * (1 - alpha))`
    pub fn weigh_linear(&self, linear: U256) -> Result<U256> {
        mul_div(linear, self.denominator - self.numerator, self.denominator)
    }

    /// Alpha-weighted sum of a quadratic and a linear term
    pub fn blend(&self, quadratic: U256, linear: U256) -> Result<U256> {
        self.weigh_quadratic(quadratic)?
            .checked_add(self.weigh_linear(linear)?)
            .ok_or_else(|| TallyError::Overflow("weighted funding exceeds 256 bits".to_string()))
    }
}

impl Default for Alpha {
    fn default() -> Self {
        Self::one()
    }
}

impl std::fmt::Display for Alpha {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Solve for the alpha that makes total funding equal the available assets.
///
/// Total assets are `matching_pool + user_deposits`. The result is
/// `(assets - linear_sum) / (quadratic_sum - linear_sum)`, clamped to zero
/// when the quadratic sum brings no advantage or the assets cannot even cover
/// the linear sum, and to one when the assets cover the full quadratic sum.
pub fn calculate_optimal_alpha(
    matching_pool: U256,
    quadratic_sum: U256,
    linear_sum: U256,
    user_deposits: U256,
) -> Result<Alpha> {
    let total_assets = matching_pool
        .checked_add(user_deposits)
        .ok_or_else(|| TallyError::Overflow("matching pool plus deposits".to_string()))?;

    if quadratic_sum <= linear_sum {
        return Ok(Alpha::zero());
    }
    if total_assets <= linear_sum {
        return Ok(Alpha::zero());
    }
    if total_assets >= quadratic_sum {
        return Ok(Alpha::one());
    }

    Alpha::new(total_assets - linear_sum, quadratic_sum - linear_sum)
}
