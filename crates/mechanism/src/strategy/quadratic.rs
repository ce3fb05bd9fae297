//! Quadratic voting strategy
//!
//! Deposits buy voting power normalized to 18 decimals. A vote of weight `w`
//! costs `w²` power and adds `(w², w)` to the proposal's tally, so the
//! proposal's alpha-weighted funding is also the number of shares it earns.

use std::collections::HashSet;

use primitive_types::U256;
use quadfund_tally::{calculate_optimal_alpha, Alpha, QuadraticTally, Tally};
use tracing::debug;

use crate::config::MechanismConfig;
use crate::context::MechanismContext;
use crate::error::{MechanismError, MechanismResult};
use crate::strategy::{AlphaControl, VoteRequest, VotingStrategy};
use crate::types::{Address, ProposalId, VoteChoice};

/// Fixed-point precision voting power is expressed in
pub const POWER_DECIMALS: u8 = 18;

#[derive(Debug, Clone)]
pub struct QuadraticVotingStrategy {
    tally: QuadraticTally,
    quorum_shares: U256,
    voted: HashSet<(ProposalId, Address)>,
    allow_multiple_signups: bool,
}

impl QuadraticVotingStrategy {
    pub fn new(quorum_shares: U256, alpha: Alpha) -> Self {
        Self {
            tally: QuadraticTally::new(alpha),
            quorum_shares,
            voted: HashSet::new(),
            allow_multiple_signups: true,
        }
    }

    pub fn from_config(config: &MechanismConfig) -> MechanismResult<Self> {
        let alpha = Alpha::new(config.alpha_numerator, config.alpha_denominator)?;
        Ok(Self::new(config.quorum_shares, alpha)
            .with_multiple_signups(config.allow_multiple_signups))
    }

    /// Allow or forbid repeated signups by the same voter
    pub fn with_multiple_signups(mut self, allow: bool) -> Self {
        self.allow_multiple_signups = allow;
        self
    }

    pub fn tally(&self) -> &QuadraticTally {
        &self.tally
    }

    pub fn get_tally(&self, proposal_id: ProposalId) -> MechanismResult<Tally> {
        Ok(self.tally.get_tally(proposal_id)?)
    }

    pub fn quorum_shares(&self) -> U256 {
        self.quorum_shares
    }

    pub fn has_voted(&self, proposal_id: ProposalId, voter: &Address) -> bool {
        self.voted.contains(&(proposal_id, *voter))
    }

    fn funding(&self, proposal_id: ProposalId) -> MechanismResult<U256> {
        Ok(self.tally.get_tally(proposal_id)?.funding()?)
    }
}

/// Scale `amount` from `decimals` to `POWER_DECIMALS`
pub fn normalize_to_power(amount: U256, decimals: u8) -> MechanismResult<U256> {
    if decimals == POWER_DECIMALS {
        return Ok(amount);
    }
    if decimals < POWER_DECIMALS {
        let factor = U256::exp10(usize::from(POWER_DECIMALS - decimals));
        return amount
            .checked_mul(factor)
            .ok_or_else(|| {
                MechanismError::Overflow(format!(
                    "normalizing {} from {} decimals",
                    amount,
                    decimals
                ))
            });
    }

    let exponent = usize::from(decimals - POWER_DECIMALS);
    if exponent > 77 {
        // 10^78 exceeds U256
        return Ok(U256::zero());
    }
    Ok(amount / U256::exp10(exponent))
}

impl VotingStrategy for QuadraticVotingStrategy {
    fn name(&self) -> &str {
        "quadratic"
    }

    fn allows_multiple_signups(&self) -> bool {
        self.allow_multiple_signups
    }

    fn voting_power(
        &self,
        ctx: &MechanismContext,
        _user: &Address,
        deposit: U256,
    ) -> MechanismResult<U256> {
        normalize_to_power(deposit, ctx.asset().decimals())
    }

    fn can_propose(&self, ctx: &MechanismContext, proposer: &Address) -> bool {
        let roles = ctx.roles();
        *proposer == roles.keeper || *proposer == roles.management
    }

    fn check_vote(&self, _ctx: &MechanismContext, vote: &VoteRequest) -> MechanismResult<U256> {
        if vote.choice != VoteChoice::For {
            return Err(MechanismError::InvalidInput(format!(
                "quadratic voting only accepts For votes, got {:?}",
                vote.choice
            )));
        }
        if self.has_voted(vote.proposal_id, &vote.voter) {
            return Err(MechanismError::AlreadyVoted {
                proposal_id: vote.proposal_id,
                voter: vote.voter,
            });
        }

        let cost = vote
            .weight
            .checked_mul(vote.weight)
            .ok_or_else(|| MechanismError::Overflow(format!("cost of weight {}", vote.weight)))?;
        if cost > vote.current_power {
            return Err(MechanismError::InsufficientVotingPower {
                cost,
                available: vote.current_power,
            });
        }

        Ok(vote.current_power - cost)
    }

    fn record_vote(&mut self, _ctx: &MechanismContext, vote: &VoteRequest) -> MechanismResult<()> {
        let cost = vote
            .weight
            .checked_mul(vote.weight)
            .ok_or_else(|| MechanismError::Overflow(format!("cost of weight {}", vote.weight)))?;

        self.tally.process_vote_unchecked(vote.proposal_id, cost, vote.weight)?;
        self.voted.insert((vote.proposal_id, vote.voter));

        debug!(
            "{} paid {} power for weight {} on proposal {}",
            vote.voter,
            cost,
            vote.weight,
            vote.proposal_id
        );
        Ok(())
    }

    fn has_quorum(
        &self,
        _ctx: &MechanismContext,
        proposal_id: ProposalId,
    ) -> MechanismResult<bool> {
        Ok(self.funding(proposal_id)? >= self.quorum_shares)
    }

    fn convert_votes_to_shares(
        &self,
        _ctx: &MechanismContext,
        proposal_id: ProposalId,
    ) -> MechanismResult<U256> {
        self.funding(proposal_id)
    }
}

impl AlphaControl for QuadraticVotingStrategy {
    fn alpha(&self) -> Alpha {
        self.tally.alpha()
    }

    fn set_alpha(&mut self, numerator: U256, denominator: U256) -> MechanismResult<Alpha> {
        Ok(self.tally.set_alpha(numerator, denominator)?)
    }

    fn optimal_alpha(&self, matching_pool: U256, user_deposits: U256) -> MechanismResult<Alpha> {
        Ok(calculate_optimal_alpha(
            matching_pool,
            self.tally.total_quadratic_sum(),
            self.tally.total_linear_sum(),
            user_deposits,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::InMemoryAsset;
    use crate::clock::ManualClock;
    use crate::context::{Roles, Timing};
    use std::sync::Arc;

    fn u(value: u64) -> U256 {
        U256::from(value)
    }

    fn context(decimals: u8) -> MechanismContext {
        let roles = Roles {
            owner: Address::from_low_u64(1),
            pending_owner: None,
            management: Address::from_low_u64(2),
            keeper: Address::from_low_u64(3),
            emergency_admin: Address::from_low_u64(1),
        };
        let timing = Timing {
            start_time: 0,
            voting_delay: 10,
            voting_period: 100,
            timelock_delay: 10,
            grace_period: 100,
        };
        MechanismContext::new(
            Address::from_low_u64(0xfeed),
            1,
            Arc::new(InMemoryAsset::new(Address::from_low_u64(0xa55e7), "TKN", decimals)),
            Arc::new(ManualClock::new(0)),
            roles,
            timing,
        )
    }

    fn vote(proposal_id: ProposalId, voter: u64, weight: u64, current_power: U256) -> VoteRequest {
        VoteRequest {
            proposal_id,
            voter: Address::from_low_u64(voter),
            choice: VoteChoice::For,
            weight: u(weight),
            current_power,
        }
    }

    fn cast(
        strategy: &mut QuadraticVotingStrategy,
        ctx: &MechanismContext,
        request: &VoteRequest,
    ) -> MechanismResult<U256> {
        let power = strategy.check_vote(ctx, request)?;
        strategy.record_vote(ctx, request)?;
        Ok(power)
    }

    #[test]
    fn test_power_is_normalized_to_18_decimals() {
        let strategy = QuadraticVotingStrategy::new(U256::zero(), Alpha::one());
        let user = Address::from_low_u64(9);

        let usdc = context(6);
        assert_eq!(strategy.voting_power(&usdc, &user, u(1_000_000)).unwrap(), U256::exp10(18));

        let native = context(18);
        assert_eq!(strategy.voting_power(&native, &user, u(42)).unwrap(), u(42));

        let fine = context(20);
        assert_eq!(strategy.voting_power(&fine, &user, u(12_345)).unwrap(), u(123));
    }

    #[test]
    fn test_second_vote_on_same_proposal_is_rejected() {
        let ctx = context(18);
        let mut strategy = QuadraticVotingStrategy::new(U256::zero(), Alpha::one());

        let power = cast(&mut strategy, &ctx, &vote(1, 7, 9, u(100))).unwrap();
        assert_eq!(power, u(19));

        let again = cast(&mut strategy, &ctx, &vote(1, 7, 5, power));
        assert!(matches!(again, Err(MechanismError::AlreadyVoted { proposal_id: 1, .. })));
        assert!(strategy.has_voted(1, &Address::from_low_u64(7)));
        assert_eq!(strategy.get_tally(1).unwrap().sum_contributions, u(81));
    }

    #[test]
    fn test_cost_above_power_is_rejected() {
        let ctx = context(18);
        let mut strategy = QuadraticVotingStrategy::new(U256::zero(), Alpha::one());

        let result = cast(&mut strategy, &ctx, &vote(1, 7, 11, u(100)));
        assert!(matches!(result, Err(MechanismError::InsufficientVotingPower { .. })));
        assert_eq!(strategy.tally().total_linear_sum(), U256::zero());
        assert!(!strategy.has_voted(1, &Address::from_low_u64(7)));
    }

    #[test]
    fn test_only_for_votes_are_accepted() {
        let ctx = context(18);
        let strategy = QuadraticVotingStrategy::new(U256::zero(), Alpha::one());

        let mut request = vote(1, 7, 1, u(100));
        request.choice = VoteChoice::Against;
        assert!(strategy.check_vote(&ctx, &request).is_err());
        request.choice = VoteChoice::Abstain;
        assert!(strategy.check_vote(&ctx, &request).is_err());
    }

    #[test]
    fn test_quorum_and_shares_follow_funding() {
        let ctx = context(18);
        let mut strategy = QuadraticVotingStrategy::new(u(3000), Alpha::one());

        cast(&mut strategy, &ctx, &vote(1, 7, 10, u(100))).unwrap();
        cast(&mut strategy, &ctx, &vote(1, 8, 20, u(400))).unwrap();
        assert!(!strategy.has_quorum(&ctx, 1).unwrap());

        cast(&mut strategy, &ctx, &vote(1, 9, 30, u(900))).unwrap();
        assert!(strategy.has_quorum(&ctx, 1).unwrap());
        assert_eq!(strategy.convert_votes_to_shares(&ctx, 1).unwrap(), u(3600));
        assert!(!strategy.has_quorum(&ctx, 2).unwrap());
    }

    #[test]
    fn test_only_keeper_and_management_propose() {
        let ctx = context(18);
        let strategy = QuadraticVotingStrategy::new(U256::zero(), Alpha::one());

        assert!(strategy.can_propose(&ctx, &Address::from_low_u64(2)));
        assert!(strategy.can_propose(&ctx, &Address::from_low_u64(3)));
        assert!(!strategy.can_propose(&ctx, &Address::from_low_u64(1)));
    }

    #[test]
    fn test_optimal_alpha_uses_live_sums() {
        let ctx = context(18);
        let mut strategy = QuadraticVotingStrategy::new(U256::zero(), Alpha::one());
        cast(&mut strategy, &ctx, &vote(1, 7, 10, u(100))).unwrap();
        cast(&mut strategy, &ctx, &vote(1, 8, 20, u(400))).unwrap();
        cast(&mut strategy, &ctx, &vote(1, 9, 30, u(900))).unwrap();

        let alpha = strategy.optimal_alpha(u(500), u(1000)).unwrap();
        assert_eq!(alpha.numerator(), u(100));
        assert_eq!(alpha.denominator(), u(2200));

        let previous = strategy.set_alpha(alpha.numerator(), alpha.denominator()).unwrap();
        assert_eq!(previous, Alpha::one());
        assert_eq!(strategy.tally().total_funding(), u(1500) - U256::one());
    }
}
