//! Error types for the allocation mechanism

use primitive_types::U256;
use thiserror::Error;

use quadfund_tally::TallyError;

use crate::config::ConfigError;
use crate::types::{Address, ProposalId, ProposalState};

/// Errors raised by a fungible asset collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    /// Sender balance too low
    #[error("Insufficient balance for {account}: have {balance}, need {required}")]
    InsufficientBalance { account: Address, balance: U256, required: U256 },

    /// Spender allowance too low
    #[error("Insufficient allowance for {spender} on {owner}: have {allowance}, need {required}")]
    InsufficientAllowance { owner: Address, spender: Address, allowance: U256, required: U256 },

    /// Transfer to or from the zero address
    #[error("Zero address in asset operation")]
    ZeroAddress,

    /// Balance or supply overflow
    #[error("Asset overflow: {0}")]
    Overflow(String),

    /// Transfer refused by the asset
    #[error("Transfer rejected: {0}")]
    Rejected(String),
}

/// Error types for mechanism operations
#[derive(Error, Debug)]
pub enum MechanismError {
    /// Error from the tally engine
    #[error("Tally error: {0}")]
    Tally(#[from] TallyError),

    /// Error from the underlying asset
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// Error loading or validating configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Amount was zero
    #[error("Amount must be greater than zero")]
    ZeroAmount,

    /// Zero address where a real account is required
    #[error("Zero address not allowed for {0}")]
    ZeroAddress(String),

    /// Malformed input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Caller lacks the required role
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Operation not legal at this point of the round
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Proposal id does not exist
    #[error("Proposal not found: {0}")]
    ProposalNotFound(ProposalId),

    /// Proposal is in the wrong lifecycle state
    #[error("Proposal {proposal_id} is {actual}, expected {expected}")]
    UnexpectedProposalState {
        proposal_id: ProposalId,
        actual: ProposalState,
        expected: ProposalState,
    },

    /// Voter already voted on this proposal
    #[error("{voter} already voted on proposal {proposal_id}")]
    AlreadyVoted { proposal_id: ProposalId, voter: Address },

    /// Repeated signup under a single-signup strategy
    #[error("{0} is already signed up")]
    AlreadySignedUp(Address),

    /// Quadratic cost exceeds remaining power
    #[error("Insufficient voting power: cost {cost}, available {available}")]
    InsufficientVotingPower { cost: U256, available: U256 },

    /// Recipient already named by another proposal
    #[error("Recipient {0} already has a proposal")]
    RecipientAlreadyUsed(Address),

    /// Tally was already finalized
    #[error("Vote tally already finalized")]
    TallyAlreadyFinalized,

    /// Tally has not been finalized yet
    #[error("Vote tally not finalized")]
    TallyNotFinalized,

    /// Share transfers before the redemption window
    #[error("Share transfers are locked until redemption opens")]
    TransfersLocked,

    /// Share balance too low
    #[error("Insufficient shares for {owner}: have {balance}, need {required}")]
    InsufficientShares { owner: Address, balance: U256, required: U256 },

    /// Share allowance too low
    #[error("Insufficient share allowance for {spender}: have {allowance}, need {required}")]
    InsufficientAllowance { spender: Address, allowance: U256, required: U256 },

    /// Redeem or withdraw above the current limit
    #[error("Redeem limit exceeded: requested {requested}, max {max}")]
    ExceedsRedeemLimit { requested: U256, max: U256 },

    /// Mechanism is paused
    #[error("Mechanism is paused")]
    Paused,

    /// A state-mutating call re-entered the mechanism
    #[error("Re-entrant call rejected")]
    Reentrancy,

    /// Meta-transaction signature or deadline failure
    #[error("Signature error: {0}")]
    Signature(String),

    /// Arithmetic overflow
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    /// Arithmetic underflow
    #[error("Arithmetic underflow: {0}")]
    Underflow(String),

    /// Deterministic id already registered
    #[error("Mechanism already deployed: {0}")]
    AlreadyDeployed(String),
}

/// Result type for mechanism operations
pub type MechanismResult<T> = Result<T, MechanismError>;
