//! Core value types shared across the mechanism

use std::fmt;
use std::str::FromStr;

use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Seconds since the Unix epoch
pub type Timestamp = u64;

/// Sequential proposal identifier, starting at 1
pub type ProposalId = u64;

/// A 20-byte account address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// The zero address, never a valid recipient or role holder
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Address whose low eight bytes hold `value`, mainly for fixtures
    pub fn from_low_u64(value: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    /// Last 20 bytes of the SHA-256 of a public key
    pub fn from_public_key(key: &[u8]) -> Self {
        let digest = Sha256::digest(key);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[12..]);
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let decoded = hex::decode(digits).map_err(|e| format!("invalid address {}: {}", s, e))?;
        let bytes: [u8; 20] = decoded
            .try_into()
            .map_err(|v: Vec<u8>| format!("address must be 20 bytes, got {}", v.len()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Serde helpers that read and write a `U256` as a decimal string.
/// Plain integers are accepted on input as well.
pub mod u256_dec {
    use primitive_types::U256;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(U256::from(n)),
            Repr::Text(s) => U256::from_dec_str(s.trim())
                .map_err(|e| D::Error::custom(format!("invalid amount {}: {:?}", s, e))),
        }
    }
}

/// Direction of a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteChoice {
    Against,
    For,
    Abstain,
}

/// Lifecycle state of a proposal, derived from the clock and the tally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalState {
    /// Voting has not started yet
    Pending,
    /// Voting window is open
    Active,
    /// Canceled by its proposer; permanent
    Canceled,
    /// Voting ended below quorum
    Defeated,
    /// Voting ended at or above quorum, not queued yet
    Succeeded,
    /// Queued, waiting for the timelock to elapse
    Queued,
    /// Shares can be redeemed
    Redeemable,
    /// The redemption window has closed
    Expired,
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A funding proposal naming a recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub proposer: Address,
    pub recipient: Address,
    pub description: String,
    pub created_at: Timestamp,
    /// Set when the proposal is queued
    pub eta: Option<Timestamp>,
    pub canceled: bool,
}

/// Per-voter bookkeeping held by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterRecord {
    /// Remaining voting power; only ever decreases when voting
    pub voting_power: U256,
    /// Total underlying asset deposited at signup
    pub deposited: U256,
    pub signed_up: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_round_trips_through_hex() {
        let address = Address::from_low_u64(0xdead_beef);
        let text = address.to_string();
        assert_eq!(text, "0x00000000000000000000000000000000deadbeef");
        assert_eq!(text.parse::<Address>().unwrap(), address);
        assert_eq!("00000000000000000000000000000000deadbeef".parse::<Address>().unwrap(), address);
    }

    #[test]
    fn test_address_rejects_bad_input() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!("0xzz".parse::<Address>().is_err());
    }

    #[test]
    fn test_zero_address() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::from_low_u64(1).is_zero());
    }

    #[test]
    fn test_amounts_accept_numbers_and_strings() {
        #[derive(Deserialize, Serialize)]
        struct Amount {
            #[serde(with = "u256_dec")]
            value: U256,
        }

        let small: Amount = serde_yaml::from_str("value: 42").unwrap();
        assert_eq!(small.value, U256::from(42u64));

        let large: Amount = serde_yaml::from_str("value: \"1000000000000000000000000\"").unwrap();
        assert_eq!(large.value, U256::exp10(24));
        assert_eq!(
            serde_json::to_string(&large).unwrap(),
            "{\"value\":\"1000000000000000000000000\"}"
        );
    }
}
