//! Deterministic mechanism creation
//!
//! A mechanism's id is the SHA-256 of its creator and the canonical JSON of
//! its configuration. The same creator cannot deploy the same configuration
//! twice, and the mechanism's address is derived from the id.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::asset::FungibleAsset;
use crate::clock::Clock;
use crate::config::MechanismConfig;
use crate::engine::AllocationEngine;
use crate::error::{MechanismError, MechanismResult};
use crate::strategy::QuadraticVotingStrategy;
use crate::types::Address;

/// Content-addressed identifier of a deployed mechanism
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MechanismId([u8; 32]);

impl MechanismId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Address of the mechanism: the last 20 bytes of the id
    pub fn address(&self) -> Address {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&self.0[12..]);
        Address::new(bytes)
    }
}

impl fmt::Display for MechanismId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for MechanismId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MechanismId({})", self)
    }
}

/// Registry of deployed mechanisms
#[derive(Debug, Default)]
pub struct MechanismFactory {
    deployed: DashMap<MechanismId, Address>,
}

impl MechanismFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mechanism_id(
        &self,
        creator: &Address,
        config: &MechanismConfig,
    ) -> MechanismResult<MechanismId> {
        let canonical = serde_json::to_vec(config)
            .map_err(|e| {
                MechanismError::InvalidInput(format!("unserializable configuration: {}", e))
            })?;

        let mut hasher = Sha256::new();
        hasher.update(creator.as_bytes());
        hasher.update(&canonical);
        Ok(MechanismId(hasher.finalize().into()))
    }

    pub fn is_deployed(&self, id: &MechanismId) -> bool {
        self.deployed.contains_key(id)
    }

    pub fn address_of(&self, id: &MechanismId) -> Option<Address> {
        self.deployed.get(id).map(|a| *a)
    }

    pub fn deployed_count(&self) -> usize {
        self.deployed.len()
    }

    /// Create a quadratic voting mechanism for `config`
    pub fn deploy_quadratic(
        &self,
        creator: Address,
        config: MechanismConfig,
        asset: Arc<dyn FungibleAsset>,
        clock: Arc<dyn Clock>,
    ) -> MechanismResult<AllocationEngine<QuadraticVotingStrategy>> {
        if creator.is_zero() {
            return Err(MechanismError::ZeroAddress("creator".to_string()));
        }
        config.validate()?;
        let id = self.mechanism_id(&creator, &config)?;

        match self.deployed.entry(id) {
            Entry::Occupied(_) => Err(MechanismError::AlreadyDeployed(id.to_string())),
            Entry::Vacant(slot) => {
                let address = id.address();
                let strategy = QuadraticVotingStrategy::from_config(&config)?;
                let engine = AllocationEngine::new(config, address, asset, clock, strategy)?;
                slot.insert(address);

                info!("{} deployed quadratic mechanism {} at {}", creator, id, address);
                Ok(engine)
            }
        }
    }
}
