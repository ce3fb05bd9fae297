//! Allow-list access filter
//!
//! `AllowlistFilter` wraps any strategy and refuses signups from addresses
//! the allow-list does not know. Every other hook goes straight through.

use std::sync::Arc;

use dashmap::DashSet;
use primitive_types::U256;
use quadfund_tally::Alpha;
use tracing::warn;

use crate::context::MechanismContext;
use crate::error::{MechanismError, MechanismResult};
use crate::strategy::{AlphaControl, Distribution, VoteRequest, VotingStrategy};
use crate::types::{Address, Proposal, ProposalId};

/// Source of signup eligibility
pub trait Allowlist: Send + Sync {
    fn is_allowed(&self, user: &Address) -> bool;
}

/// In-memory allow-list
#[derive(Debug, Default)]
pub struct StaticAllowlist {
    members: DashSet<Address>,
}

impl StaticAllowlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_members(members: impl IntoIterator<Item = Address>) -> Self {
        let list = Self::new();
        for member in members {
            list.allow(member);
        }
        list
    }

    pub fn allow(&self, user: Address) {
        self.members.insert(user);
    }

    /// Returns whether the address was on the list
    pub fn revoke(&self, user: &Address) -> bool {
        self.members.remove(user).is_some()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Allowlist for StaticAllowlist {
    fn is_allowed(&self, user: &Address) -> bool {
        self.members.contains(user)
    }
}

pub struct AllowlistFilter<S> {
    inner: S,
    allowlist: Arc<dyn Allowlist>,
}

impl<S: VotingStrategy> AllowlistFilter<S> {
    pub fn new(inner: S, allowlist: Arc<dyn Allowlist>) -> Self {
        Self { inner, allowlist }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: VotingStrategy> VotingStrategy for AllowlistFilter<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn before_signup(&self, ctx: &MechanismContext, user: &Address) -> MechanismResult<()> {
        if !self.allowlist.is_allowed(user) {
            warn!("Signup by {} rejected: not on allow-list", user);
            return Err(MechanismError::Unauthorized(format!("{} is not on the allow-list", user)));
        }
        self.inner.before_signup(ctx, user)
    }

    fn allows_multiple_signups(&self) -> bool {
        self.inner.allows_multiple_signups()
    }

    fn voting_power(
        &self,
        ctx: &MechanismContext,
        user: &Address,
        deposit: U256,
    ) -> MechanismResult<U256> {
        self.inner.voting_power(ctx, user, deposit)
    }

    fn can_propose(&self, ctx: &MechanismContext, proposer: &Address) -> bool {
        self.inner.can_propose(ctx, proposer)
    }

    fn check_vote(&self, ctx: &MechanismContext, vote: &VoteRequest) -> MechanismResult<U256> {
        self.inner.check_vote(ctx, vote)
    }

    fn record_vote(&mut self, ctx: &MechanismContext, vote: &VoteRequest) -> MechanismResult<()> {
        self.inner.record_vote(ctx, vote)
    }

    fn has_quorum(&self, ctx: &MechanismContext, proposal_id: ProposalId) -> MechanismResult<bool> {
        self.inner.has_quorum(ctx, proposal_id)
    }

    fn convert_votes_to_shares(
        &self,
        ctx: &MechanismContext,
        proposal_id: ProposalId,
    ) -> MechanismResult<U256> {
        self.inner.convert_votes_to_shares(ctx, proposal_id)
    }

    fn request_custom_distribution(
        &mut self,
        ctx: &MechanismContext,
        proposal: &Proposal,
        shares: U256,
    ) -> MechanismResult<Distribution> {
        self.inner.request_custom_distribution(ctx, proposal, shares)
    }

    fn before_finalize(&mut self, ctx: &MechanismContext) -> MechanismResult<()> {
        self.inner.before_finalize(ctx)
    }

    fn total_assets(&self, ctx: &MechanismContext) -> MechanismResult<U256> {
        self.inner.total_assets(ctx)
    }

    fn available_withdraw_limit(&self, ctx: &MechanismContext, owner: &Address) -> U256 {
        self.inner.available_withdraw_limit(ctx, owner)
    }
}

impl<S: AlphaControl> AlphaControl for AllowlistFilter<S> {
    fn alpha(&self) -> Alpha {
        self.inner.alpha()
    }

    fn set_alpha(&mut self, numerator: U256, denominator: U256) -> MechanismResult<Alpha> {
        self.inner.set_alpha(numerator, denominator)
    }

    fn optimal_alpha(&self, matching_pool: U256, user_deposits: U256) -> MechanismResult<Alpha> {
        self.inner.optimal_alpha(matching_pool, user_deposits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_allowlist_membership() {
        let alice = Address::from_low_u64(1);
        let bob = Address::from_low_u64(2);
        let list = StaticAllowlist::with_members([alice]);

        assert!(list.is_allowed(&alice));
        assert!(!list.is_allowed(&bob));

        list.allow(bob);
        assert_eq!(list.len(), 2);
        assert!(list.revoke(&alice));
        assert!(!list.revoke(&alice));
        assert!(!list.is_allowed(&alice));
    }
}
