//! Error types for the quadratic tally.

use primitive_types::U256;
use thiserror::Error;

/// Errors that can occur while tallying votes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TallyError {
    /// Contribution was zero
    #[error("Contribution must be greater than zero")]
    ZeroContribution,

    /// Vote weight was zero
    #[error("Vote weight must be greater than zero")]
    ZeroWeight,

    /// Squaring the vote weight does not fit in 256 bits
    #[error("Vote weight {0} overflows when squared")]
    SquareOverflow(U256),

    /// The squared weight is larger than the contribution it claims
    #[error("Vote weight squared ({squared}) exceeds contribution ({contribution})")]
    WeightExceedsContribution { squared: U256, contribution: U256 },

    /// Weight claims more than the square root of the contribution
    #[error("Vote weight {weight} is above the square root {sqrt} of the contribution")]
    WeightAboveSquareRoot { weight: U256, sqrt: U256 },

    /// Weight under-claims by more than the tolerated 10%
    #[error("Vote weight {weight} is more than 10% below the square root {sqrt}")]
    WeightBelowTolerance { weight: U256, sqrt: U256 },

    /// Alpha fraction is not in [0, 1] or has a zero denominator
    #[error("Invalid alpha: {0}")]
    InvalidAlpha(String),

    /// An aggregate grew past 256 bits
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    /// An aggregate would go below zero. Always an accounting bug.
    #[error("Arithmetic underflow: {0}")]
    Underflow(String),

    /// Division by zero in a fixed-point helper
    #[error("Division by zero")]
    DivisionByZero,
}

/// Result type for tally operations
pub type Result<T> = std::result::Result<T, TallyError>;
