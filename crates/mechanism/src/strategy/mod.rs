//! Voting strategies
//!
//! The engine owns the round and calls into a `VotingStrategy` at fixed hook
//! points. A strategy decides who may sign up and propose, how much power a
//! deposit buys, what a vote costs, and how a tally turns into shares. It
//! reads the engine through `MechanismContext` and never mutates engine
//! state directly.

use primitive_types::U256;
use quadfund_tally::Alpha;

use crate::context::MechanismContext;
use crate::error::MechanismResult;
use crate::types::{Address, Proposal, ProposalId, VoteChoice};

pub mod allowlist;
pub mod quadratic;

pub use allowlist::{Allowlist, AllowlistFilter, StaticAllowlist};
pub use quadratic::QuadraticVotingStrategy;

/// A vote as submitted to the strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRequest {
    pub proposal_id: ProposalId,
    pub voter: Address,
    pub choice: VoteChoice,
    pub weight: U256,
    /// Voter's power before this vote
    pub current_power: U256,
}

/// How a queued proposal is paid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    /// Engine mints shares 1:1 to the recipient
    MintShares,
    /// Strategy already transferred this many assets to the recipient
    Transferred(U256),
}

/// Hook points the engine calls during a round
pub trait VotingStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Gate before a signup is accepted
    fn before_signup(&self, _ctx: &MechanismContext, _user: &Address) -> MechanismResult<()> {
        Ok(())
    }

    /// Whether a voter may sign up more than once
    fn allows_multiple_signups(&self) -> bool {
        true
    }

    /// Voting power granted for a deposit of the underlying asset
    fn voting_power(
        &self,
        ctx: &MechanismContext,
        user: &Address,
        deposit: U256,
    ) -> MechanismResult<U256>;

    /// Whether `proposer` may create proposals
    fn can_propose(&self, ctx: &MechanismContext, proposer: &Address) -> bool;

    /// Validate a vote without side effects and return the voter's new power
    fn check_vote(&self, ctx: &MechanismContext, vote: &VoteRequest) -> MechanismResult<U256>;

    /// Apply a vote that passed `check_vote`
    fn record_vote(&mut self, ctx: &MechanismContext, vote: &VoteRequest) -> MechanismResult<()>;

    fn has_quorum(&self, ctx: &MechanismContext, proposal_id: ProposalId) -> MechanismResult<bool>;

    /// Shares owed to a successful proposal
    fn convert_votes_to_shares(
        &self,
        ctx: &MechanismContext,
        proposal_id: ProposalId,
    ) -> MechanismResult<U256>;

    /// Chance to pay a recipient directly instead of minting shares
    fn request_custom_distribution(
        &mut self,
        _ctx: &MechanismContext,
        _proposal: &Proposal,
        _shares: U256,
    ) -> MechanismResult<Distribution> {
        Ok(Distribution::MintShares)
    }

    /// Bookkeeping before the tally is frozen
    fn before_finalize(&mut self, _ctx: &MechanismContext) -> MechanismResult<()> {
        Ok(())
    }

    /// Assets available for allocation
    fn total_assets(&self, ctx: &MechanismContext) -> MechanismResult<U256> {
        Ok(ctx.asset().balance_of(&ctx.address()))
    }

    /// Zero outside the redemption window, unlimited inside it
    fn available_withdraw_limit(&self, ctx: &MechanismContext, _owner: &Address) -> U256 {
        if ctx.is_redemption_open() {
            U256::MAX
        } else {
            U256::zero()
        }
    }
}

/// Strategies whose funding blends quadratic and linear terms
pub trait AlphaControl {
    fn alpha(&self) -> Alpha;

    /// Replace alpha, returning the previous value
    fn set_alpha(&mut self, numerator: U256, denominator: U256) -> MechanismResult<Alpha>;

    /// Alpha that spends exactly `matching_pool + user_deposits`
    fn optimal_alpha(&self, matching_pool: U256, user_deposits: U256) -> MechanismResult<Alpha>;
}

impl<S: VotingStrategy + ?Sized> VotingStrategy for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn before_signup(&self, ctx: &MechanismContext, user: &Address) -> MechanismResult<()> {
        (**self).before_signup(ctx, user)
    }

    fn allows_multiple_signups(&self) -> bool {
        (**self).allows_multiple_signups()
    }

    fn voting_power(
        &self,
        ctx: &MechanismContext,
        user: &Address,
        deposit: U256,
    ) -> MechanismResult<U256> {
        (**self).voting_power(ctx, user, deposit)
    }

    fn can_propose(&self, ctx: &MechanismContext, proposer: &Address) -> bool {
        (**self).can_propose(ctx, proposer)
    }

    fn check_vote(&self, ctx: &MechanismContext, vote: &VoteRequest) -> MechanismResult<U256> {
        (**self).check_vote(ctx, vote)
    }

    fn record_vote(&mut self, ctx: &MechanismContext, vote: &VoteRequest) -> MechanismResult<()> {
        (**self).record_vote(ctx, vote)
    }

    fn has_quorum(&self, ctx: &MechanismContext, proposal_id: ProposalId) -> MechanismResult<bool> {
        (**self).has_quorum(ctx, proposal_id)
    }

    fn convert_votes_to_shares(
        &self,
        ctx: &MechanismContext,
        proposal_id: ProposalId,
    ) -> MechanismResult<U256> {
        (**self).convert_votes_to_shares(ctx, proposal_id)
    }

    fn request_custom_distribution(
        &mut self,
        ctx: &MechanismContext,
        proposal: &Proposal,
        shares: U256,
    ) -> MechanismResult<Distribution> {
        (**self).request_custom_distribution(ctx, proposal, shares)
    }

    fn before_finalize(&mut self, ctx: &MechanismContext) -> MechanismResult<()> {
        (**self).before_finalize(ctx)
    }

    fn total_assets(&self, ctx: &MechanismContext) -> MechanismResult<U256> {
        (**self).total_assets(ctx)
    }

    fn available_withdraw_limit(&self, ctx: &MechanismContext, owner: &Address) -> U256 {
        (**self).available_withdraw_limit(ctx, owner)
    }
}
