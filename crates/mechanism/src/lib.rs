//! Allocation mechanism for Quadfund rounds
//!
//! This crate provides the round engine: signups buy voting power, authorized
//! proposers name recipients, voters pay quadratic costs, and after the
//! voting window the finalized tally is turned into redeemable vault shares.
//! Voting rules plug in through the `VotingStrategy` trait.

pub mod asset;
pub mod clock;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod factory;
pub mod guard;
pub mod shares;
pub mod strategy;
pub mod types;

pub use asset::{FungibleAsset, InMemoryAsset};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, MechanismConfig};
pub use context::{MechanismContext, Roles, Timing};
pub use engine::{
    AllocationEngine, Ed25519Verifier, SignatureVerifier, MAX_DESCRIPTION_LENGTH, MAX_SAFE_VALUE,
};
pub use error::{AssetError, MechanismError, MechanismResult};
pub use events::MechanismEvent;
pub use factory::{MechanismFactory, MechanismId};
pub use guard::ReentrancyGuard;
pub use shares::ShareLedger;
pub use strategy::{
    AlphaControl, Allowlist, AllowlistFilter, Distribution, QuadraticVotingStrategy,
    StaticAllowlist, VoteRequest, VotingStrategy,
};
pub use types::{Address, Proposal, ProposalId, ProposalState, Timestamp, VoteChoice, VoterRecord};
