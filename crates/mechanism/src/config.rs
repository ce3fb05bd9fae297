//! Mechanism configuration
//!
//! Configuration is plain YAML. Durations are in seconds, amounts are decimal
//! strings (or small integers) and addresses are `0x`-prefixed hex.

use std::fs;
use std::path::Path;

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{u256_dec, Address, Timestamp};

/// Errors that can occur in configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read file: {0}")]
    FileReadError(String),

    #[error("Failed to parse YAML: {0}")]
    YamlParseError(#[from] serde_yaml::Error),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration of one allocation round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MechanismConfig {
    /// Name of the vault share token
    #[serde(default = "default_name")]
    pub name: String,
    /// Symbol of the vault share token
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Underlying asset deposited at signup and distributed to recipients
    pub asset: Address,
    /// Network identifier bound into meta-transaction signatures
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Round start; the clock at construction when omitted
    #[serde(default)]
    pub start_time: Option<Timestamp>,
    #[serde(default = "default_voting_delay")]
    pub voting_delay: u64,
    #[serde(default = "default_voting_period")]
    pub voting_period: u64,
    /// Minimum alpha-weighted funding for a proposal to succeed
    #[serde(default, with = "u256_dec")]
    pub quorum_shares: U256,
    #[serde(default = "default_timelock_delay")]
    pub timelock_delay: u64,
    #[serde(default = "default_grace_period")]
    pub grace_period: u64,
    pub owner: Address,
    #[serde(default)]
    pub management: Option<Address>,
    #[serde(default)]
    pub keeper: Option<Address>,
    #[serde(default)]
    pub emergency_admin: Option<Address>,
    #[serde(default = "default_alpha_part", with = "u256_dec")]
    pub alpha_numerator: U256,
    #[serde(default = "default_alpha_part", with = "u256_dec")]
    pub alpha_denominator: U256,
    /// Whether a voter may sign up more than once
    #[serde(default = "default_allow_multiple_signups")]
    pub allow_multiple_signups: bool,
}

fn default_name() -> String {
    "Quadfund Allocation Shares".to_string()
}

fn default_symbol() -> String {
    "QFS".to_string()
}

fn default_chain_id() -> u64 {
    1
}

fn default_voting_delay() -> u64 {
    86_400
}

fn default_voting_period() -> u64 {
    7 * 86_400
}

fn default_timelock_delay() -> u64 {
    86_400
}

fn default_grace_period() -> u64 {
    14 * 86_400
}

fn default_alpha_part() -> U256 {
    U256::one()
}

fn default_allow_multiple_signups() -> bool {
    true
}

impl MechanismConfig {
    /// A configuration with default timings for the given asset and owner
    pub fn new(asset: Address, owner: Address) -> Self {
        Self {
            name: default_name(),
            symbol: default_symbol(),
            asset,
            chain_id: default_chain_id(),
            start_time: None,
            voting_delay: default_voting_delay(),
            voting_period: default_voting_period(),
            quorum_shares: U256::zero(),
            timelock_delay: default_timelock_delay(),
            grace_period: default_grace_period(),
            owner,
            management: None,
            keeper: None,
            emergency_admin: None,
            alpha_numerator: default_alpha_part(),
            alpha_denominator: default_alpha_part(),
            allow_multiple_signups: default_allow_multiple_signups(),
        }
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| {
                ConfigError::FileReadError(format!("Failed to read {}: {}", path.display(), e))
            })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: MechanismConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check the invariants the engine relies on
    pub fn validate(&self) -> Result<()> {
        if self.asset.is_zero() {
            return Err(ConfigError::InvalidValue("asset".to_string(), "zero address".to_string()));
        }
        if self.owner.is_zero() {
            return Err(ConfigError::InvalidValue("owner".to_string(), "zero address".to_string()));
        }
        if self.name.trim().is_empty() || self.symbol.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "name".to_string(),
                "share name and symbol are required".to_string(),
            ));
        }
        if self.voting_period == 0 {
            return Err(ConfigError::InvalidValue(
                "voting_period".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if self.timelock_delay == 0 {
            return Err(ConfigError::InvalidValue(
                "timelock_delay".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if self.grace_period == 0 {
            return Err(ConfigError::InvalidValue(
                "grace_period".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if self.alpha_denominator.is_zero() {
            return Err(ConfigError::InvalidValue(
                "alpha_denominator".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if self.alpha_numerator > self.alpha_denominator {
            return Err(ConfigError::InvalidValue(
                "alpha_numerator".to_string(),
                format!("{} exceeds denominator {}", self.alpha_numerator, self.alpha_denominator),
            ));
        }
        for (role, address) in [
            ("management", self.management),
            ("keeper", self.keeper),
            ("emergency_admin", self.emergency_admin),
        ] {
            if address.map_or(false, |a| a.is_zero()) {
                return Err(ConfigError::InvalidValue(role.to_string(), "zero address".to_string()));
            }
        }

        Ok(())
    }
}
