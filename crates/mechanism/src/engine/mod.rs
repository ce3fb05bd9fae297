//! Allocation engine
//!
//! The engine owns every piece of round state: proposals, voter records, the
//! share ledger and the finalized-tally flag. Strategy-specific state lives in
//! the strategy, which is called at fixed hook points and sees the engine only
//! through `MechanismContext`.
//!
//! Proposal states are never stored. `state` derives them from the clock, the
//! quorum hook, the finalized flag and whether the proposal was queued or
//! canceled.
//!
//! Every mutating operation validates all of its inputs before it touches
//! state, and holds the re-entrancy guard for its whole duration.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use primitive_types::U256;
use tracing::{debug, info, warn};

use crate::asset::FungibleAsset;
use crate::clock::Clock;
use crate::config::MechanismConfig;
use crate::context::{MechanismContext, Roles, Timing};
use crate::error::{MechanismError, MechanismResult};
use crate::events::MechanismEvent;
use crate::guard::ReentrancyGuard;
use crate::shares::ShareLedger;
use crate::strategy::{Distribution, VoteRequest, VotingStrategy};
use crate::types::{
    Address, Proposal, ProposalId, ProposalState, Timestamp, VoteChoice, VoterRecord,
};

mod admin;
mod signature;
mod vault;

pub use signature::{Ed25519Verifier, SignatureVerifier};

/// Longest accepted proposal description, in bytes
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;

/// Upper bound for voting power and vote weight: 2^128 - 1
pub const MAX_SAFE_VALUE: U256 = U256([u64::MAX, u64::MAX, 0, 0]);

/// The proposal/voting/distribution state machine
pub struct AllocationEngine<S: VotingStrategy> {
    ctx: MechanismContext,
    strategy: S,
    name: String,
    symbol: String,
    proposals: BTreeMap<ProposalId, Proposal>,
    used_recipients: HashSet<Address>,
    next_proposal_id: ProposalId,
    voters: HashMap<Address, VoterRecord>,
    total_user_deposits: U256,
    shares: ShareLedger,
    tally_finalized: bool,
    /// Snapshot taken at finalization, reduced by redemptions
    total_assets: U256,
    paused: bool,
    nonces: HashMap<Address, u64>,
    verifier: Option<Arc<dyn SignatureVerifier>>,
    guard: ReentrancyGuard,
    events: Vec<MechanismEvent>,
}

impl<S: VotingStrategy> AllocationEngine<S> {
    /// Create an engine living at `address` and holding its balance of `asset`
    pub fn new(
        config: MechanismConfig,
        address: Address,
        asset: Arc<dyn FungibleAsset>,
        clock: Arc<dyn Clock>,
        strategy: S,
    ) -> MechanismResult<Self> {
        config.validate()?;
        if address.is_zero() {
            return Err(MechanismError::ZeroAddress("mechanism".to_string()));
        }
        if asset.address() != config.asset {
            return Err(MechanismError::InvalidInput(format!(
                "asset {} does not match configured asset {}",
                asset.address(),
                config.asset
            )));
        }

        let roles = Roles {
            owner: config.owner,
            pending_owner: None,
            management: config.management.unwrap_or(config.owner),
            keeper: config.keeper.unwrap_or(config.owner),
            emergency_admin: config.emergency_admin.unwrap_or(config.owner),
        };
        let timing = Timing {
            start_time: config.start_time.unwrap_or_else(|| clock.now()),
            voting_delay: config.voting_delay,
            voting_period: config.voting_period,
            timelock_delay: config.timelock_delay,
            grace_period: config.grace_period,
        };

        info!(
            "Created {} mechanism {} ({}): voting {}..{}, owner {}",
            strategy.name(),
            address,
            config.symbol,
            timing.voting_start(),
            timing.voting_end(),
            roles.owner
        );

        Ok(Self {
            ctx: MechanismContext::new(address, config.chain_id, asset, clock, roles, timing),
            strategy,
            name: config.name,
            symbol: config.symbol,
            proposals: BTreeMap::new(),
            used_recipients: HashSet::new(),
            next_proposal_id: 1,
            voters: HashMap::new(),
            total_user_deposits: U256::zero(),
            shares: ShareLedger::new(),
            tally_finalized: false,
            total_assets: U256::zero(),
            paused: false,
            nonces: HashMap::new(),
            verifier: None,
            guard: ReentrancyGuard::new(),
            events: Vec::new(),
        })
    }

    /// Deposit `deposit` of the asset and receive voting power.
    ///
    /// The user must have approved the mechanism for the deposit. Returns the
    /// user's voting power after the signup.
    pub fn signup(&mut self, user: Address, deposit: U256) -> MechanismResult<U256> {
        let _entered = self.guard.enter()?;
        self.require_not_paused()?;

        if user.is_zero() {
            return Err(MechanismError::ZeroAddress("user".to_string()));
        }
        if deposit.is_zero() {
            return Err(MechanismError::ZeroAmount);
        }
        if self.ctx.now() >= self.ctx.timing().voting_end() {
            return Err(MechanismError::InvalidState(
                "signup is closed after voting ends".to_string(),
            ));
        }

        self.strategy.before_signup(&self.ctx, &user)?;

        let record = self.voters.get(&user).cloned().unwrap_or_default();
        if record.signed_up && !self.strategy.allows_multiple_signups() {
            return Err(MechanismError::AlreadySignedUp(user));
        }

        let power = self.strategy.voting_power(&self.ctx, &user, deposit)?;
        let voting_power = record
            .voting_power
            .checked_add(power)
            .filter(|p| *p <= MAX_SAFE_VALUE)
            .ok_or_else(|| {
                MechanismError::InvalidInput(format!("voting power of {} above safe maximum", user))
            })?;
        let deposited = record
            .deposited
            .checked_add(deposit)
            .ok_or_else(|| MechanismError::Overflow(format!("deposits of {}", user)))?;
        let total_user_deposits = self
            .total_user_deposits
            .checked_add(deposit)
            .ok_or_else(|| MechanismError::Overflow("total user deposits".to_string()))?;

        let mechanism = self.ctx.address();
        self.ctx.asset().transfer_from(&mechanism, &user, &mechanism, deposit)?;

        self.voters.insert(
            user,
            VoterRecord {
                voting_power,
                deposited,
                signed_up: true,
            },
        );
        self.total_user_deposits = total_user_deposits;
        self.emit(MechanismEvent::UserRegistered {
            user,
            deposit,
            voting_power,
        });

        info!(
            "{} signed up with {} {}, voting power {}",
            user,
            deposit,
            self.ctx.asset().symbol(),
            voting_power
        );
        Ok(voting_power)
    }

    /// Create a proposal paying `recipient`. Returns the new proposal id.
    pub fn propose(
        &mut self,
        proposer: Address,
        recipient: Address,
        description: &str,
    ) -> MechanismResult<ProposalId> {
        let _entered = self.guard.enter()?;
        self.require_not_paused()?;

        if !self.strategy.can_propose(&self.ctx, &proposer) {
            warn!("Proposal by {} rejected: not an authorized proposer", proposer);
            return Err(MechanismError::Unauthorized(format!("{} may not propose", proposer)));
        }
        if recipient.is_zero() {
            return Err(MechanismError::ZeroAddress("recipient".to_string()));
        }
        if self.used_recipients.contains(&recipient) {
            return Err(MechanismError::RecipientAlreadyUsed(recipient));
        }
        if description.trim().is_empty() {
            return Err(MechanismError::InvalidInput("description is empty".to_string()));
        }
        if description.len() > MAX_DESCRIPTION_LENGTH {
            return Err(MechanismError::InvalidInput(format!(
                "description is {} bytes, max {}",
                description.len(),
                MAX_DESCRIPTION_LENGTH
            )));
        }
        let now = self.ctx.now();
        if now >= self.ctx.timing().voting_end() {
            return Err(MechanismError::InvalidState(
                "proposals are closed after voting ends".to_string(),
            ));
        }

        let proposal_id = self.next_proposal_id;
        let next_proposal_id = proposal_id
            .checked_add(1)
            .ok_or_else(|| MechanismError::Overflow("proposal id".to_string()))?;

        self.proposals.insert(
            proposal_id,
            Proposal {
                id: proposal_id,
                proposer,
                recipient,
                description: description.to_string(),
                created_at: now,
                eta: None,
                canceled: false,
            },
        );
        self.used_recipients.insert(recipient);
        self.next_proposal_id = next_proposal_id;
        self.emit(MechanismEvent::ProposalCreated {
            proposal_id,
            proposer,
            recipient,
            description: description.to_string(),
        });

        info!("Proposal {} created by {} for recipient {}", proposal_id, proposer, recipient);
        Ok(proposal_id)
    }

    /// Cast a vote while the proposal is active. Returns the remaining power.
    pub fn cast_vote(
        &mut self,
        voter: Address,
        proposal_id: ProposalId,
        choice: VoteChoice,
        weight: U256,
    ) -> MechanismResult<U256> {
        let _entered = self.guard.enter()?;
        self.require_not_paused()?;

        let state = self.state(proposal_id)?;
        if state != ProposalState::Active {
            return Err(MechanismError::UnexpectedProposalState {
                proposal_id,
                actual: state,
                expected: ProposalState::Active,
            });
        }
        if weight.is_zero() {
            return Err(MechanismError::ZeroAmount);
        }
        if weight > MAX_SAFE_VALUE {
            return Err(MechanismError::InvalidInput(format!(
                "vote weight {} above safe maximum",
                weight
            )));
        }

        let current_power = match self.voters.get(&voter) {
            Some(record) if record.signed_up => record.voting_power,
            _ => return Err(MechanismError::Unauthorized(format!("{} has not signed up", voter))),
        };

        let request = VoteRequest {
            proposal_id,
            voter,
            choice,
            weight,
            current_power,
        };
        let remaining_power = self.strategy.check_vote(&self.ctx, &request)?;
        if remaining_power > current_power {
            return Err(MechanismError::InvalidState(format!(
                "strategy raised voting power of {} from {} to {}",
                voter, current_power, remaining_power
            )));
        }
        self.strategy.record_vote(&self.ctx, &request)?;

        if let Some(record) = self.voters.get_mut(&voter) {
            record.voting_power = remaining_power;
        }
        self.emit(MechanismEvent::VoteCast {
            voter,
            proposal_id,
            choice,
            weight,
            remaining_power,
        });

        debug!(
            "{} voted {:?} with weight {} on proposal {}, {} power left",
            voter, choice, weight, proposal_id, remaining_power
        );
        Ok(remaining_power)
    }

    /// Withdraw a proposal before it is queued. Only its proposer may cancel.
    pub fn cancel_proposal(
        &mut self,
        caller: Address,
        proposal_id: ProposalId,
    ) -> MechanismResult<()> {
        let _entered = self.guard.enter()?;
        self.require_not_paused()?;

        let proposal = self
            .proposals
            .get(&proposal_id)
            .ok_or(MechanismError::ProposalNotFound(proposal_id))?;
        if proposal.proposer != caller {
            return Err(MechanismError::Unauthorized(format!(
                "only the proposer may cancel proposal {}",
                proposal_id
            )));
        }
        if proposal.canceled {
            return Err(MechanismError::UnexpectedProposalState {
                proposal_id,
                actual: ProposalState::Canceled,
                expected: ProposalState::Active,
            });
        }
        if proposal.eta.is_some() {
            return Err(MechanismError::InvalidState(format!(
                "proposal {} is already queued",
                proposal_id
            )));
        }

        if let Some(proposal) = self.proposals.get_mut(&proposal_id) {
            proposal.canceled = true;
        }
        self.emit(MechanismEvent::ProposalCanceled {
            proposal_id,
            proposer: caller,
        });

        info!("Proposal {} canceled by {}", proposal_id, caller);
        Ok(())
    }

    /// Freeze the tally and open the timelock. Owner only, once, after voting.
    pub fn finalize_vote_tally(&mut self, caller: Address) -> MechanismResult<()> {
        let _entered = self.guard.enter()?;
        self.require_not_paused()?;
        self.require_owner(&caller, "finalize the tally")?;

        if self.tally_finalized {
            return Err(MechanismError::TallyAlreadyFinalized);
        }
        let now = self.ctx.now();
        if now < self.ctx.timing().voting_end() {
            return Err(MechanismError::InvalidState(format!(
                "voting ends at {}, now {}",
                self.ctx.timing().voting_end(),
                now
            )));
        }
        let redemption_start = now
            .checked_add(self.ctx.timing().timelock_delay)
            .ok_or_else(|| MechanismError::Overflow("redemption start".to_string()))?;

        self.strategy.before_finalize(&self.ctx)?;
        let total_assets = self.strategy.total_assets(&self.ctx)?;

        self.tally_finalized = true;
        self.total_assets = total_assets;
        self.ctx.set_global_redemption_start(redemption_start);
        self.emit(MechanismEvent::VoteTallyFinalized {
            total_assets,
            redemption_start,
        });

        info!(
            "Vote tally finalized: {} assets, redemption opens at {}",
            total_assets,
            redemption_start
        );
        Ok(())
    }

    /// Allocate shares to a successful proposal. Anyone may call.
    ///
    /// Returns the share amount the proposal earned, whether it was minted or
    /// paid out directly by the strategy.
    pub fn queue_proposal(&mut self, proposal_id: ProposalId) -> MechanismResult<U256> {
        let _entered = self.guard.enter()?;
        self.require_not_paused()?;

        if !self.tally_finalized {
            return Err(MechanismError::TallyNotFinalized);
        }
        if self.ctx.is_queue_window_closed() {
            return Err(MechanismError::InvalidState(format!(
                "queuing closed at {}, now {}",
                self.ctx.global_redemption_start().unwrap_or_default(),
                self.ctx.now()
            )));
        }
        let state = self.state(proposal_id)?;
        if state != ProposalState::Succeeded {
            return Err(MechanismError::UnexpectedProposalState {
                proposal_id,
                actual: state,
                expected: ProposalState::Succeeded,
            });
        }
        let proposal = self
            .proposals
            .get(&proposal_id)
            .cloned()
            .ok_or(MechanismError::ProposalNotFound(proposal_id))?;

        let shares = self.strategy.convert_votes_to_shares(&self.ctx, proposal_id)?;
        if shares.is_zero() {
            return Err(MechanismError::InvalidState(format!(
                "proposal {} earned no shares",
                proposal_id
            )));
        }
        let eta = self
            .ctx
            .global_redemption_start()
            .ok_or_else(|| MechanismError::InvalidState("redemption start not set".to_string()))?;

        match self.strategy.request_custom_distribution(&self.ctx, &proposal, shares)? {
            Distribution::MintShares => {
                self.shares.mint(&proposal.recipient, shares)?;
            }
            Distribution::Transferred(assets) => {
                self.total_assets = self.total_assets.checked_sub(assets).ok_or_else(|| {
                    MechanismError::Underflow(format!(
                        "custom distribution of {} exceeds total assets",
                        assets
                    ))
                })?;
                self.emit(MechanismEvent::CustomDistribution {
                    proposal_id,
                    recipient: proposal.recipient,
                    assets,
                });
                info!(
                    "Proposal {} paid {} assets directly to {}",
                    proposal_id,
                    assets,
                    proposal.recipient
                );
            }
        }

        if let Some(proposal) = self.proposals.get_mut(&proposal_id) {
            proposal.eta = Some(eta);
        }
        self.emit(MechanismEvent::ProposalQueued {
            proposal_id,
            eta,
            shares,
        });

        info!("Proposal {} queued with {} shares, redeemable at {}", proposal_id, shares, eta);
        Ok(shares)
    }

    /// Current lifecycle state of a proposal
    pub fn state(&self, proposal_id: ProposalId) -> MechanismResult<ProposalState> {
        let proposal = self
            .proposals
            .get(&proposal_id)
            .ok_or(MechanismError::ProposalNotFound(proposal_id))?;
        if proposal.canceled {
            return Ok(ProposalState::Canceled);
        }

        let now = self.ctx.now();
        if let Some(eta) = proposal.eta {
            if now < eta {
                return Ok(ProposalState::Queued);
            }
            return Ok(if self.ctx.is_redemption_expired() {
                ProposalState::Expired
            } else {
                ProposalState::Redeemable
            });
        }

        let timing = self.ctx.timing();
        if now < timing.voting_start() {
            return Ok(ProposalState::Pending);
        }
        if now < timing.voting_end() {
            return Ok(ProposalState::Active);
        }
        if !self.strategy.has_quorum(&self.ctx, proposal_id)? {
            return Ok(ProposalState::Defeated);
        }
        // never queued before redemption opened
        if self.ctx.is_queue_window_closed() {
            return Ok(ProposalState::Expired);
        }
        Ok(ProposalState::Succeeded)
    }

    pub fn proposal(&self, proposal_id: ProposalId) -> Option<&Proposal> {
        self.proposals.get(&proposal_id)
    }

    pub fn proposals(&self) -> impl Iterator<Item = &Proposal> + '_ {
        self.proposals.values()
    }

    pub fn proposal_count(&self) -> usize {
        self.proposals.len()
    }

    /// Remaining voting power of a voter
    pub fn voting_power(&self, user: &Address) -> U256 {
        self.voters.get(user).map(|r| r.voting_power).unwrap_or_default()
    }

    pub fn voter(&self, user: &Address) -> Option<&VoterRecord> {
        self.voters.get(user)
    }

    /// Sum of all signup deposits
    pub fn total_user_deposits(&self) -> U256 {
        self.total_user_deposits
    }

    pub fn is_tally_finalized(&self) -> bool {
        self.tally_finalized
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn address(&self) -> Address {
        self.ctx.address()
    }

    pub fn context(&self) -> &MechanismContext {
        &self.ctx
    }

    pub fn roles(&self) -> &Roles {
        self.ctx.roles()
    }

    pub fn timing(&self) -> &Timing {
        self.ctx.timing()
    }

    pub fn global_redemption_start(&self) -> Option<Timestamp> {
        self.ctx.global_redemption_start()
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Events recorded since the last call
    pub fn take_events(&mut self) -> Vec<MechanismEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: MechanismEvent) {
        debug!("Event: {:?}", event);
        self.events.push(event);
    }

    fn require_not_paused(&self) -> MechanismResult<()> {
        if self.paused {
            return Err(MechanismError::Paused);
        }
        Ok(())
    }

    fn require_owner(&self, caller: &Address, action: &str) -> MechanismResult<()> {
        if *caller != self.ctx.roles().owner {
            warn!("{} tried to {} without the owner role", caller, action);
            return Err(MechanismError::Unauthorized(format!("only the owner may {}", action)));
        }
        Ok(())
    }
}
