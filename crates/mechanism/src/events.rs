//! Events recorded by the mechanism for external consumers

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::types::{Address, ProposalId, Timestamp, VoteChoice};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MechanismEvent {
    UserRegistered { user: Address, deposit: U256, voting_power: U256 },
    ProposalCreated {
        proposal_id: ProposalId,
        proposer: Address,
        recipient: Address,
        description: String,
    },
    ProposalCanceled { proposal_id: ProposalId, proposer: Address },
    VoteCast {
        voter: Address,
        proposal_id: ProposalId,
        choice: VoteChoice,
        weight: U256,
        remaining_power: U256,
    },
    VoteTallyFinalized { total_assets: U256, redemption_start: Timestamp },
    ProposalQueued { proposal_id: ProposalId, eta: Timestamp, shares: U256 },
    CustomDistribution { proposal_id: ProposalId, recipient: Address, assets: U256 },
    AlphaUpdated {
        old_numerator: U256,
        old_denominator: U256,
        new_numerator: U256,
        new_denominator: U256,
    },
    Redeemed { caller: Address, receiver: Address, owner: Address, assets: U256, shares: U256 },
    SharesTransferred { from: Address, to: Address, amount: U256 },
    Swept { token: Address, receiver: Address, amount: U256 },
    Paused { by: Address },
    Unpaused { by: Address },
    OwnershipTransferStarted { previous_owner: Address, new_owner: Address },
    OwnershipTransferred { previous_owner: Address, new_owner: Address },
    OwnershipTransferCanceled { owner: Address, pending_owner: Address },
    ManagementUpdated { management: Address },
    KeeperUpdated { keeper: Address },
    EmergencyAdminUpdated { emergency_admin: Address },
}
