//! Quadfund
//!
//! Round-based quadratic funding: participants deposit to acquire voting
//! power, authorized proposers name recipients, votes cost the square of
//! their weight, and after the round successful proposals receive vault
//! shares redeemable against the pooled funds.

/// Module version information
pub mod version {
    /// The current version of the Quadfund library
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

pub mod logging;

/// Incremental quadratic funding tally
pub use quadfund_tally as tally;

/// Round engine, strategies and collaborators
pub use quadfund_mechanism as mechanism;

pub use quadfund_mechanism::{
    Address, AllocationEngine, MechanismConfig, MechanismError, MechanismResult, ProposalState,
    QuadraticVotingStrategy, VoteChoice, VotingStrategy,
};
pub use quadfund_tally::{calculate_optimal_alpha, Alpha, QuadraticTally, U256};

#[cfg(test)]
mod tests {
    #[test]
    fn version_is_available() {
        assert!(!super::version::VERSION.is_empty());
    }
}
