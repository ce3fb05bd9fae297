//! Quadratic funding tally for Quadfund
//!
//! This crate keeps the per-project sums and the global aggregates needed to
//! compute alpha-weighted quadratic funding after every vote in constant time,
//! and solves for the alpha that spends exactly the available assets.

pub mod alpha;
pub mod error;
pub mod math;
pub mod tally;

pub use alpha::{calculate_optimal_alpha, Alpha};
pub use error::{Result, TallyError};
pub use math::{isqrt, mul_div, mul_div_ceil};
pub use tally::{Project, ProjectId, QuadraticTally, Tally};

pub use primitive_types::U256;
