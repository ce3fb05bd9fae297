mod scenario;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use primitive_types::U256;
use tracing::debug;

use quadfund::logging::init_logging;
use quadfund_mechanism::MechanismConfig;
use quadfund_tally::calculate_optimal_alpha;

use crate::scenario::{simulate, Scenario};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the alpha that spends exactly the available assets
    Alpha {
        /// Assets added on top of user deposits
        #[arg(long, value_parser = parse_amount)]
        matching_pool: U256,
        /// Sum of squared square-root sums over all proposals
        #[arg(long, value_parser = parse_amount)]
        quadratic_sum: U256,
        /// Sum of contributions over all proposals
        #[arg(long, value_parser = parse_amount)]
        linear_sum: U256,
        /// Total deposited at signup
        #[arg(long, value_parser = parse_amount)]
        user_deposits: U256,
    },
    /// Validate a mechanism configuration file
    CheckConfig {
        /// Path to the YAML configuration
        path: PathBuf,
    },
    /// Run a full round described by a scenario file
    Simulate {
        /// Path to the YAML scenario
        path: PathBuf,
    },
}

fn parse_amount(s: &str) -> std::result::Result<U256, String> {
    U256::from_dec_str(s.trim()).map_err(|e| format!("invalid amount {}: {:?}", s, e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Alpha {
            matching_pool,
            quadratic_sum,
            linear_sum,
            user_deposits,
        } => {
            let alpha =
                calculate_optimal_alpha(matching_pool, quadratic_sum, linear_sum, user_deposits)
                    .map_err(|e| anyhow!("Failed to compute alpha: {}", e))?;
            let funding = alpha.blend(quadratic_sum, linear_sum)?;
            println!("alpha: {}", alpha);
            println!("total funding: {}", funding);
        }
        Commands::CheckConfig { path } => {
            let config = MechanismConfig::from_file(&path)
                .with_context(|| format!("Invalid configuration {}", path.display()))?;
            debug!("Loaded {:?}", config);

            let start = config.start_time.map_or("at creation".to_string(), |t| t.to_string());
            println!("{} ({}) over asset {}", config.name, config.symbol, config.asset);
            println!("owner: {}", config.owner);
            println!("start: {}", start);
            println!(
                "voting delay {}s, period {}s, timelock {}s, grace {}s",
                config.voting_delay,
                config.voting_period,
                config.timelock_delay,
                config.grace_period
            );
            println!("alpha: {}/{}", config.alpha_numerator, config.alpha_denominator);
            println!("quorum: {}", config.quorum_shares);
        }
        Commands::Simulate { path } => {
            let report = simulate(Scenario::from_file(&path)?)?;

            println!("alpha: {}", report.alpha);
            println!("total assets: {}", report.total_assets);
            println!("user deposits: {}", report.total_deposits);
            for proposal in &report.proposals {
                println!(
                    "#{} {} {}: contributions {}, sqrt sum {}, funding {}, shares {}, redeemed {}",
                    proposal.id,
                    proposal.recipient,
                    proposal.state,
                    proposal.sum_contributions,
                    proposal.sum_square_roots,
                    proposal.funding,
                    proposal.shares,
                    proposal.redeemed
                );
            }
            println!("remaining: {}", report.remaining);
        }
    }

    Ok(())
}
