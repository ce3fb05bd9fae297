//! Signature-authorized signup and voting
//!
//! A relayer submits the operation on behalf of a signer. The signed digest
//! binds the mechanism's domain (name, version, chain id, address), the
//! operation's arguments, the signer's current nonce and a deadline. The nonce
//! only moves when the operation succeeds, so a rejected submission can be
//! retried with the same signature.

use std::sync::Arc;

use dashmap::DashMap;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use primitive_types::U256;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{MechanismError, MechanismResult};
use crate::strategy::VotingStrategy;
use crate::types::{Address, ProposalId, Timestamp, VoteChoice};

use super::AllocationEngine;

const DOMAIN_TAG: &[u8] = b"Quadfund.AllocationMechanism";
const DOMAIN_VERSION: &[u8] = b"1";
const SIGNUP_TAG: &[u8] = b"Signup";
const CAST_VOTE_TAG: &[u8] = b"CastVote";

/// Checks that `signer` produced `signature` over `message`
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, signer: &Address, message: &[u8], signature: &[u8]) -> MechanismResult<()>;
}

/// Ed25519 verifier over a registry of signer keys
#[derive(Debug, Default)]
pub struct Ed25519Verifier {
    keys: DashMap<Address, VerifyingKey>,
}

impl Ed25519Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key under the address derived from it
    pub fn register(&self, key: VerifyingKey) -> Address {
        let address = Address::from_public_key(key.as_bytes());
        self.keys.insert(address, key);
        address
    }

    /// Register a key for an explicitly chosen address
    pub fn register_for(&self, address: Address, key: VerifyingKey) {
        self.keys.insert(address, key);
    }

    pub fn key_of(&self, address: &Address) -> Option<VerifyingKey> {
        self.keys.get(address).map(|k| *k)
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, signer: &Address, message: &[u8], signature: &[u8]) -> MechanismResult<()> {
        let key = self
            .key_of(signer)
            .ok_or_else(|| MechanismError::Signature(format!("no key registered for {}", signer)))?;
        let bytes: [u8; 64] = signature
            .try_into()
            .map_err(|_| {
                MechanismError::Signature(format!(
                    "signature must be 64 bytes, got {}",
                    signature.len()
                ))
            })?;

        key.verify(message, &Signature::from_bytes(&bytes))
            .map_err(|_| MechanismError::Signature(format!("invalid signature for {}", signer)))
    }
}

fn choice_byte(choice: VoteChoice) -> u8 {
    match choice {
        VoteChoice::Against => 0,
        VoteChoice::For => 1,
        VoteChoice::Abstain => 2,
    }
}

fn next_nonce(signer: &Address, nonce: u64) -> MechanismResult<u64> {
    nonce
        .checked_add(1)
        .ok_or_else(|| MechanismError::Overflow(format!("nonce of {}", signer)))
}

fn amount_bytes(value: U256) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    bytes
}

impl<S: VotingStrategy> AllocationEngine<S> {
    pub fn with_signature_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn set_signature_verifier(&mut self, verifier: Arc<dyn SignatureVerifier>) {
        self.verifier = Some(verifier);
    }

    /// Next nonce expected from `signer`
    pub fn nonce(&self, signer: &Address) -> u64 {
        self.nonces.get(signer).copied().unwrap_or_default()
    }

    /// Hash binding signatures to this mechanism instance
    pub fn domain_separator(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN_TAG);
        hasher.update(self.name.as_bytes());
        hasher.update(DOMAIN_VERSION);
        hasher.update(self.ctx.chain_id().to_be_bytes());
        hasher.update(self.ctx.address().as_bytes());
        hasher.finalize().into()
    }

    /// Digest a signer signs to authorize `signup_with_signature`
    pub fn signup_digest(
        &self,
        user: &Address,
        deposit: U256,
        nonce: u64,
        deadline: Timestamp,
    ) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.domain_separator());
        hasher.update(SIGNUP_TAG);
        hasher.update(user.as_bytes());
        hasher.update(amount_bytes(deposit));
        hasher.update(nonce.to_be_bytes());
        hasher.update(deadline.to_be_bytes());
        hasher.finalize().into()
    }

    /// Digest a signer signs to authorize `cast_vote_with_signature`
    pub fn cast_vote_digest(
        &self,
        voter: &Address,
        proposal_id: ProposalId,
        choice: VoteChoice,
        weight: U256,
        nonce: u64,
        deadline: Timestamp,
    ) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.domain_separator());
        hasher.update(CAST_VOTE_TAG);
        hasher.update(voter.as_bytes());
        hasher.update(proposal_id.to_be_bytes());
        hasher.update([choice_byte(choice)]);
        hasher.update(amount_bytes(weight));
        hasher.update(nonce.to_be_bytes());
        hasher.update(deadline.to_be_bytes());
        hasher.finalize().into()
    }

    /// `signup` authorized by `user`'s signature
    pub fn signup_with_signature(
        &mut self,
        user: Address,
        deposit: U256,
        deadline: Timestamp,
        signature: &[u8],
    ) -> MechanismResult<U256> {
        let nonce = self.nonce(&user);
        let next = next_nonce(&user, nonce)?;
        let digest = self.signup_digest(&user, deposit, nonce, deadline);
        self.verify_signature(&user, &digest, signature, deadline)?;

        let power = self.signup(user, deposit)?;
        self.consume_nonce(user, next);
        Ok(power)
    }

    /// `cast_vote` authorized by `voter`'s signature
    pub fn cast_vote_with_signature(
        &mut self,
        voter: Address,
        proposal_id: ProposalId,
        choice: VoteChoice,
        weight: U256,
        deadline: Timestamp,
        signature: &[u8],
    ) -> MechanismResult<U256> {
        let nonce = self.nonce(&voter);
        let next = next_nonce(&voter, nonce)?;
        let digest = self.cast_vote_digest(&voter, proposal_id, choice, weight, nonce, deadline);
        self.verify_signature(&voter, &digest, signature, deadline)?;

        let power = self.cast_vote(voter, proposal_id, choice, weight)?;
        self.consume_nonce(voter, next);
        Ok(power)
    }

    fn verify_signature(
        &self,
        signer: &Address,
        digest: &[u8; 32],
        signature: &[u8],
        deadline: Timestamp,
    ) -> MechanismResult<()> {
        let now = self.ctx.now();
        if now > deadline {
            return Err(MechanismError::Signature(format!(
                "deadline {} passed at {}",
                deadline,
                now
            )));
        }
        let verifier = self
            .verifier
            .as_ref()
            .ok_or_else(|| {
                MechanismError::Signature("no signature verifier configured".to_string())
            })?;

        verifier.verify(signer, digest, signature).map_err(|e| {
            warn!("Rejected signature from {}: {}", signer, e);
            e
        })
    }

    fn consume_nonce(&mut self, signer: Address, next: u64) {
        self.nonces.insert(signer, next);
        debug!("Nonce of {} now {}", signer, next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{FungibleAsset, InMemoryAsset};
    use crate::clock::ManualClock;
    use crate::config::MechanismConfig;
    use crate::strategy::QuadraticVotingStrategy;
    use ed25519_dalek::{Signer, SigningKey};
    use quadfund_tally::Alpha;

    fn setup() -> (AllocationEngine<QuadraticVotingStrategy>, SigningKey, Address) {
        let asset = Arc::new(InMemoryAsset::new(Address::from_low_u64(0xa55e7), "TKN", 18));
        let mut config = MechanismConfig::new(asset.address(), Address::from_low_u64(1));
        config.start_time = Some(0);
        config.chain_id = 10;

        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let verifier = Arc::new(Ed25519Verifier::new());
        let user = verifier.register(signing_key.verifying_key());

        asset.mint(&user, U256::from(500u64)).unwrap();
        asset.approve(&user, &Address::from_low_u64(0xfeed), U256::MAX).unwrap();

        let strategy = QuadraticVotingStrategy::new(U256::zero(), Alpha::one());
        let engine = AllocationEngine::new(
            config,
            Address::from_low_u64(0xfeed),
            asset,
            Arc::new(ManualClock::new(100)),
            strategy,
        )
        .unwrap()
        .with_signature_verifier(verifier);
        (engine, signing_key, user)
    }

    #[test]
    fn test_signed_signup_consumes_nonce() {
        let (mut engine, key, user) = setup();
        let deposit = U256::from(100u64);
        let digest = engine.signup_digest(&user, deposit, 0, 200);
        let signature = key.sign(&digest).to_bytes();

        let power = engine.signup_with_signature(user, deposit, 200, &signature).unwrap();
        assert_eq!(power, deposit);
        assert_eq!(engine.nonce(&user), 1);

        // the same signature is bound to nonce 0
        assert!(matches!(
            engine.signup_with_signature(user, deposit, 200, &signature),
            Err(MechanismError::Signature(_))
        ));
    }

    #[test]
    fn test_expired_deadline_is_rejected() {
        let (mut engine, key, user) = setup();
        let deposit = U256::from(100u64);
        let digest = engine.signup_digest(&user, deposit, 0, 99);
        let signature = key.sign(&digest).to_bytes();

        assert!(engine.signup_with_signature(user, deposit, 99, &signature).is_err());
        assert_eq!(engine.nonce(&user), 0);
    }

    #[test]
    fn test_failed_operation_keeps_nonce() {
        let (mut engine, key, user) = setup();
        let deposit = U256::from(10_000u64);
        let digest = engine.signup_digest(&user, deposit, 0, 200);
        let signature = key.sign(&digest).to_bytes();

        // balance is only 500
        assert!(engine.signup_with_signature(user, deposit, 200, &signature).is_err());
        assert_eq!(engine.nonce(&user), 0);
    }

    #[test]
    fn test_domain_separator_binds_chain_and_address() {
        let (engine, _key, _user) = setup();
        let asset = Arc::new(InMemoryAsset::new(Address::from_low_u64(0xa55e7), "TKN", 18));
        let mut config = MechanismConfig::new(asset.address(), Address::from_low_u64(1));
        config.chain_id = 11;
        let other = AllocationEngine::new(
            config,
            Address::from_low_u64(0xfeed),
            asset,
            Arc::new(ManualClock::new(100)),
            QuadraticVotingStrategy::new(U256::zero(), Alpha::one()),
        )
        .unwrap();

        assert_ne!(engine.domain_separator(), other.domain_separator());
    }

    #[test]
    fn test_wrong_signer_is_rejected() {
        let verifier = Ed25519Verifier::new();
        let alice = SigningKey::from_bytes(&[1u8; 32]);
        let mallory = SigningKey::from_bytes(&[2u8; 32]);
        let address = verifier.register(alice.verifying_key());

        let message = b"payload";
        assert!(verifier.verify(&address, message, &alice.sign(message).to_bytes()).is_ok());
        assert!(verifier.verify(&address, message, &mallory.sign(message).to_bytes()).is_err());
        assert!(verifier.verify(&address, message, &[0u8; 10]).is_err());
    }
}
