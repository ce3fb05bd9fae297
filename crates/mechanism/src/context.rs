//! Read-only view of the mechanism handed to strategy hooks

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::asset::FungibleAsset;
use crate::clock::Clock;
use crate::types::{Address, Timestamp};

/// Role holders of a mechanism
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roles {
    pub owner: Address,
    /// Set between `transfer_ownership` and `accept_ownership`
    pub pending_owner: Option<Address>,
    pub management: Address,
    pub keeper: Address,
    pub emergency_admin: Address,
}

/// Round timings, all in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub start_time: Timestamp,
    pub voting_delay: u64,
    pub voting_period: u64,
    pub timelock_delay: u64,
    pub grace_period: u64,
}

impl Timing {
    /// First second of the voting window
    pub fn voting_start(&self) -> Timestamp {
        self.start_time.saturating_add(self.voting_delay)
    }

    /// First second after the voting window
    pub fn voting_end(&self) -> Timestamp {
        self.voting_start().saturating_add(self.voting_period)
    }
}

/// Environment shared by the engine and its strategy
pub struct MechanismContext {
    address: Address,
    chain_id: u64,
    asset: Arc<dyn FungibleAsset>,
    clock: Arc<dyn Clock>,
    roles: Roles,
    timing: Timing,
    global_redemption_start: Option<Timestamp>,
}

impl MechanismContext {
    pub(crate) fn new(
        address: Address,
        chain_id: u64,
        asset: Arc<dyn FungibleAsset>,
        clock: Arc<dyn Clock>,
        roles: Roles,
        timing: Timing,
    ) -> Self {
        Self {
            address,
            chain_id,
            asset,
            clock,
            roles,
            timing,
            global_redemption_start: None,
        }
    }

    /// Address of the mechanism, holding its asset balance
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn asset(&self) -> &dyn FungibleAsset {
        self.asset.as_ref()
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn roles(&self) -> &Roles {
        &self.roles
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Set once, when the tally is finalized
    pub fn global_redemption_start(&self) -> Option<Timestamp> {
        self.global_redemption_start
    }

    /// Inclusive `[start, start + grace_period]` window in which shares redeem
    pub fn redemption_window(&self) -> Option<(Timestamp, Timestamp)> {
        self.global_redemption_start
            .map(|start| (start, start.saturating_add(self.timing.grace_period)))
    }

    pub fn is_redemption_open(&self) -> bool {
        let now = self.now();
        self.redemption_window()
            .map_or(false, |(start, end)| now >= start && now <= end)
    }

    /// Queuing closes when redemption opens
    pub fn is_queue_window_closed(&self) -> bool {
        let now = self.now();
        self.global_redemption_start.map_or(false, |start| now >= start)
    }

    /// True once the redemption window has closed for good
    pub fn is_redemption_expired(&self) -> bool {
        let now = self.now();
        self.redemption_window().map_or(false, |(_, end)| now > end)
    }

    pub(crate) fn roles_mut(&mut self) -> &mut Roles {
        &mut self.roles
    }

    pub(crate) fn set_global_redemption_start(&mut self, start: Timestamp) {
        self.global_redemption_start = Some(start);
    }
}
