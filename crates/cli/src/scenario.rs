//! Round simulation from a YAML scenario
//!
//! A scenario names the mechanism configuration, an in-memory asset, the
//! voters with their deposits, the proposals and the votes. The simulation
//! drives a manual clock through the whole round and reports what every
//! proposal received.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use primitive_types::U256;
use serde::Deserialize;
use tracing::{info, warn};

use quadfund_mechanism::types::u256_dec;
use quadfund_mechanism::{
    Address, FungibleAsset, InMemoryAsset, ManualClock, MechanismConfig, MechanismFactory,
    ProposalId, ProposalState, VoteChoice,
};
use quadfund_tally::Alpha;

#[derive(Debug, Clone, Deserialize)]
pub struct AssetSpec {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

impl Default for AssetSpec {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            decimals: default_decimals(),
        }
    }
}

fn default_symbol() -> String {
    "TKN".to_string()
}

fn default_decimals() -> u8 {
    18
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoterSpec {
    pub address: Address,
    #[serde(with = "u256_dec")]
    pub deposit: U256,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalSpec {
    pub recipient: Address,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteSpec {
    pub voter: Address,
    /// 1-based index into `proposals`
    pub proposal: ProposalId,
    #[serde(with = "u256_dec")]
    pub weight: U256,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub mechanism: MechanismConfig,
    #[serde(default)]
    pub asset: AssetSpec,
    /// Assets sent to the mechanism on top of signup deposits
    #[serde(default, with = "u256_dec")]
    pub matching_pool: U256,
    /// Replace the configured alpha with the one that spends every asset
    #[serde(default)]
    pub optimal_alpha: bool,
    pub voters: Vec<VoterSpec>,
    pub proposals: Vec<ProposalSpec>,
    #[serde(default)]
    pub votes: Vec<VoteSpec>,
}

impl Scenario {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_yaml_str(&contents)
            .with_context(|| format!("Invalid scenario {}", path.display()))
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let scenario: Scenario = serde_yaml::from_str(contents)?;
        scenario.mechanism.validate()?;
        if scenario.proposals.is_empty() {
            bail!("scenario has no proposals");
        }
        Ok(scenario)
    }
}

/// Outcome of one proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalReport {
    pub id: ProposalId,
    pub recipient: Address,
    pub state: ProposalState,
    pub sum_contributions: U256,
    pub sum_square_roots: U256,
    pub funding: U256,
    pub shares: U256,
    pub redeemed: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    pub alpha: Alpha,
    pub total_assets: U256,
    pub total_deposits: U256,
    pub proposals: Vec<ProposalReport>,
    /// Assets left in the mechanism after every recipient redeemed
    pub remaining: U256,
}

/// Run the scenario from signup to redemption
pub fn simulate(scenario: Scenario) -> Result<SimulationReport> {
    let mut config = scenario.mechanism;
    let start = config.start_time.unwrap_or(0);
    config.start_time = Some(start);
    let owner = config.owner;

    let asset = Arc::new(InMemoryAsset::new(
        config.asset,
        scenario.asset.symbol,
        scenario.asset.decimals,
    ));
    let clock = Arc::new(ManualClock::new(start));
    let mut engine = MechanismFactory::new()
        .deploy_quadratic(owner, config, asset.clone(), clock.clone())
        .context("Failed to create mechanism")?;
    let mechanism = engine.address();

    if !scenario.matching_pool.is_zero() {
        asset.mint(&mechanism, scenario.matching_pool)?;
    }

    for voter in &scenario.voters {
        asset.mint(&voter.address, voter.deposit)?;
        asset.approve(&voter.address, &mechanism, voter.deposit)?;
        engine
            .signup(voter.address, voter.deposit)
            .with_context(|| format!("Signup of {} failed", voter.address))?;
    }

    let proposer = engine.roles().keeper;
    let mut ids = Vec::with_capacity(scenario.proposals.len());
    for proposal in &scenario.proposals {
        let id = engine
            .propose(proposer, proposal.recipient, &proposal.description)
            .with_context(|| format!("Proposal for {} failed", proposal.recipient))?;
        ids.push(id);
    }

    clock.set(engine.timing().voting_start());
    for vote in &scenario.votes {
        if let Err(e) = engine.cast_vote(vote.voter, vote.proposal, VoteChoice::For, vote.weight) {
            warn!("Vote by {} on proposal {} rejected: {}", vote.voter, vote.proposal, e);
        }
    }

    if scenario.optimal_alpha {
        engine.apply_optimal_alpha(owner).context("Failed to apply optimal alpha")?;
    }

    clock.set(engine.timing().voting_end());
    engine.finalize_vote_tally(owner).context("Failed to finalize tally")?;
    let total_assets = engine.total_assets()?;

    let mut reports = Vec::with_capacity(ids.len());
    for id in ids {
        let shares = match engine.state(id)? {
            ProposalState::Succeeded => engine.queue_proposal(id)?,
            _ => U256::zero(),
        };
        let tally = engine.strategy().get_tally(id)?;
        let recipient = engine
            .proposal(id)
            .map(|p| p.recipient)
            .context("Queued proposal disappeared")?;
        reports.push(ProposalReport {
            id,
            recipient,
            state: engine.state(id)?,
            sum_contributions: tally.sum_contributions,
            sum_square_roots: tally.sum_square_roots,
            funding: tally.funding()?,
            shares,
            redeemed: U256::zero(),
        });
    }

    if let Some(start) = engine.global_redemption_start() {
        clock.set(start);
    }
    for report in reports.iter_mut() {
        let shares = engine.max_redeem(&report.recipient)?;
        if shares.is_zero() {
            continue;
        }
        report.redeemed =
            engine.redeem(report.recipient, shares, report.recipient, report.recipient)?;
        report.state = engine.state(report.id)?;
    }

    let report = SimulationReport {
        alpha: engine.alpha(),
        total_assets,
        total_deposits: engine.total_user_deposits(),
        proposals: reports,
        remaining: asset.balance_of(&mechanism),
    };
    info!("Simulation finished with {} assets left", report.remaining);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCENARIO: &str = r#"
mechanism:
  asset: "0x00000000000000000000000000000000000a55e7"
  owner: "0x0000000000000000000000000000000000000001"
  keeper: "0x0000000000000000000000000000000000000002"
  start_time: 0
  voting_delay: 10
  voting_period: 100
  timelock_delay: 50
  grace_period: 200
matching_pool: 100
optimal_alpha: true
voters:
  - address: "0x000000000000000000000000000000000000000a"
    deposit: 100
  - address: "0x000000000000000000000000000000000000000b"
    deposit: 400
  - address: "0x000000000000000000000000000000000000000c"
    deposit: 900
proposals:
  - recipient: "0x0000000000000000000000000000000000000014"
    description: "Shared tooling"
votes:
  - voter: "0x000000000000000000000000000000000000000a"
    proposal: 1
    weight: 10
  - voter: "0x000000000000000000000000000000000000000b"
    proposal: 1
    weight: 20
  - voter: "0x000000000000000000000000000000000000000c"
    proposal: 1
    weight: 30
"#;

    #[test]
    fn test_simulation_spends_pool_with_optimal_alpha() {
        let report = simulate(Scenario::from_yaml_str(SCENARIO).unwrap()).unwrap();

        assert_eq!(report.alpha, Alpha::new(U256::from(100u64), U256::from(2200u64)).unwrap());
        assert_eq!(report.total_assets, U256::from(1500u64));
        assert_eq!(report.total_deposits, U256::from(1400u64));

        let proposal = &report.proposals[0];
        assert_eq!(proposal.sum_square_roots, U256::from(60u64));
        assert_eq!(proposal.shares, U256::from(1499u64));
        assert_eq!(proposal.redeemed, U256::from(1500u64));
        assert_eq!(proposal.state, ProposalState::Redeemable);
        assert_eq!(report.remaining, U256::zero());
    }

    #[test]
    fn test_scenario_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCENARIO.as_bytes()).unwrap();

        let scenario = Scenario::from_file(file.path()).unwrap();
        assert_eq!(scenario.voters.len(), 3);
        assert_eq!(scenario.asset.decimals, 18);
        assert!(Scenario::from_file("/nonexistent/scenario.yaml").is_err());
    }

    #[test]
    fn test_scenario_needs_proposals() {
        let without = SCENARIO.split("proposals:").next().unwrap().to_string() + "proposals: []\n";
        assert!(Scenario::from_yaml_str(&without).is_err());
    }
}
