//! l1-registrar: operator CLI for L1 validator registration.
//!
//! Stake checks, warp codec output, P-Chain queries, and a `simulate`
//! command that runs the whole saga against in-memory collaborators.

mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::json;

use l1_validator_registration::adapters::{
    AggregatorBehavior, InMemoryPChain, InMemorySignatureAggregator, InMemoryValidatorManager,
    JsonRpcPChainClient,
};
use l1_validator_registration::domain::PChainValidator;
use l1_validator_registration::{
    compute_share_with_limit, pack_l1_validator_registration, sum_validator_weights, BlockchainId,
    L1Descriptor, NodeId, PChainClient, PChainOwner, RegistrationConfig, RegistrationService,
    RegistrationStep, SubnetId, TxId, ValidationId, Validator, ValidatorRegistrationApi,
};

use telemetry::{init_tracing, TelemetryConfig};

/// Operator CLI for registering validators on Avalanche L1s
#[derive(Parser, Debug)]
#[command(name = "l1-registrar", version)]
#[command(about = "Validator registration tooling for permissioned Avalanche L1s")]
struct Args {
    /// JSON configuration file (defaults to REGISTRAR_* environment variables)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Post-addition weight share of a candidate
    Share {
        /// Current L1 total weight
        #[arg(long)]
        total: u64,
        /// Candidate weight
        #[arg(long)]
        weight: u64,
    },
    /// Unsigned L1ValidatorRegistration message as hex
    PackRegistration {
        /// Validation id (CB58 or 0x hex)
        validation_id: String,
        /// Encode `registered = false`
        #[arg(long)]
        removed: bool,
    },
    /// P-Chain transaction status
    TxStatus {
        /// Transaction id (CB58)
        tx_id: String,
        /// Poll until the transaction commits or the poll bound is reached
        #[arg(long)]
        wait: bool,
    },
    /// Subnet validating a blockchain, with its current total weight
    Subnet {
        /// Blockchain id (CB58)
        blockchain_id: String,
    },
    /// Run the full saga against in-memory collaborators
    Simulate {
        /// Existing L1 total weight
        #[arg(long, default_value = "500")]
        total_weight: u64,
        /// Candidate weight
        #[arg(long, default_value = "100")]
        weight: u64,
        /// Fail this step once, then resume from it
        #[arg(long)]
        fail_at: Option<RegistrationStep>,
        /// Processing polls before the P-Chain commits
        #[arg(long, default_value = "2")]
        processing_polls: u32,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<RegistrationConfig> {
    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config: RegistrationConfig = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;
            config.validate()?;
            config
        }
        None => RegistrationConfig::from_env()?,
    };
    Ok(config)
}

fn parse_validation_id(text: &str) -> anyhow::Result<ValidationId> {
    if text.starts_with("0x") {
        Ok(ValidationId::from_hex(text)?)
    } else {
        Ok(text.parse()?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&TelemetryConfig::from_env())?;
    let config = load_config(args.config.as_ref())?;
    tracing::info!(
        network = %config.network,
        weight_policy = ?config.weight_policy,
        "[registrar] Configuration loaded"
    );

    match args.command {
        Command::Share { total, weight } => {
            let share = compute_share_with_limit(total, weight, config.max_weight_share_percent);
            println!(
                "{}",
                json!({
                    "totalWeight": share.total_weight,
                    "candidateWeight": share.candidate_weight,
                    "percentage": share.percentage,
                    "limit": config.max_weight_share_percent,
                    "exceeds": share.exceeds,
                })
            );
        }

        Command::PackRegistration {
            validation_id,
            removed,
        } => {
            let validation_id = parse_validation_id(&validation_id)?;
            let network = config.network;
            let message = pack_l1_validator_registration(
                &validation_id,
                !removed,
                network.network_id(),
                &network.p_chain_blockchain_id(),
            )?;
            println!("{}", message.to_hex());
        }

        Command::TxStatus { tx_id, wait } => {
            let tx_id: TxId = tx_id.parse()?;
            let client = JsonRpcPChainClient::new(&config.p_chain_rpc_url, config.request_timeout())?;

            let mut attempts = 0u32;
            loop {
                let response = client.get_tx_status(&tx_id).await?;
                attempts += 1;
                if !wait || response.status.is_terminal() {
                    println!(
                        "{}",
                        json!({ "txID": tx_id.to_string(), "status": response.status, "reason": response.reason })
                    );
                    break;
                }
                if !config.poll.allows(attempts) {
                    bail!("{} still {:?} after {} polls", tx_id, response.status, attempts);
                }
                tokio::time::sleep(config.poll.delay_for(attempts - 1)).await;
            }
        }

        Command::Subnet { blockchain_id } => {
            let blockchain_id: BlockchainId = blockchain_id.parse()?;
            let client = JsonRpcPChainClient::new(&config.p_chain_rpc_url, config.request_timeout())?;
            let subnet_id = client.validated_by(&blockchain_id).await?;
            let validators = client.current_validators(&subnet_id).await?;
            println!(
                "{}",
                json!({
                    "blockchainID": blockchain_id.to_string(),
                    "subnetID": subnet_id.to_string(),
                    "validators": validators.len(),
                    "totalWeight": sum_validator_weights(&validators),
                })
            );
        }

        Command::Simulate {
            total_weight,
            weight,
            fail_at,
            processing_polls,
        } => simulate(config, total_weight, weight, fail_at, processing_polls).await?,
    }

    Ok(())
}

async fn simulate(
    mut config: RegistrationConfig,
    total_weight: u64,
    weight: u64,
    fail_at: Option<RegistrationStep>,
    processing_polls: u32,
) -> anyhow::Result<()> {
    let l1 = L1Descriptor {
        blockchain_id: BlockchainId::new([0x1B; 32]),
        manager_address: [0x0C; 20],
        evm_chain_id: 99_999,
    };
    let subnet_id = SubnetId::new([0x5B; 32]);
    config.poll = l1_validator_registration::PollPolicy::for_testing();

    let contract = Arc::new(
        InMemoryValidatorManager::new(
            l1.manager_address,
            config.network,
            l1.blockchain_id,
            subnet_id,
            l1.evm_chain_id,
        )
        .with_total_weight(total_weight),
    );
    let p_chain = Arc::new(
        InMemoryPChain::new("P-simulated", u64::MAX)
            .with_subnet(l1.blockchain_id, subnet_id)
            .with_validators(
                subnet_id,
                vec![PChainValidator {
                    node_id: NodeId([0x01; 20]),
                    weight: total_weight,
                }],
            ),
    );
    let aggregator = Arc::new(InMemorySignatureAggregator::new().with_p_chain(Arc::clone(&p_chain)));
    p_chain.set_processing_polls(processing_polls);

    match fail_at {
        None => {}
        Some(RegistrationStep::InitializeRegistration) => {
            bail!("InitializeRegistration failures cannot be scripted in simulation")
        }
        Some(RegistrationStep::SignMessage) => {
            aggregator.push_behavior(AggregatorBehavior::Fail("simulated quorum failure".into()))
        }
        Some(RegistrationStep::RegisterOnPChain) => p_chain.drop_next_registration("simulated drop"),
        Some(RegistrationStep::WaitForPChainSignature) => {
            aggregator.push_behavior(AggregatorBehavior::Sign);
            aggregator.push_behavior(AggregatorBehavior::Blank);
        }
        Some(RegistrationStep::FinalizeRegistration) => contract.revert_next_complete(),
    }

    let service = RegistrationService::new(
        Arc::clone(&contract),
        aggregator,
        Arc::clone(&p_chain),
        Arc::clone(&p_chain),
        config,
    );

    let validator = Validator {
        node_id: NodeId([0x42; 20]),
        bls_public_key: vec![0x11; 48],
        bls_proof_of_possession: vec![0x22; 96],
        weight,
        balance: 1_000_000_000,
        remaining_balance_owner: PChainOwner::single([0x33; 20]),
        disable_owner: PChainOwner::single([0x44; 20]),
    };

    let mut saga = service.begin(validator, l1).await?;
    let outcome = match service.add_validator(&mut saga).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let step = e.failed_step().context("failure outside a step")?;
            tracing::warn!("[registrar] {}; resuming from {}", e, step);
            println!("{}", serde_json::to_string(&service.progress(&saga))?);
            service.resume(&mut saga, step).await?
        }
    };

    println!("{}", serde_json::to_string(&service.progress(&saga))?);
    println!(
        "{}",
        json!({
            "validationID": outcome.validation_id.to_string(),
            "pChainTxID": outcome.p_chain_tx_id.map(|id| id.to_string()),
            "completionTxHash": format!("0x{}", hex::encode(outcome.completion_tx_hash)),
            "l1TotalWeight": contract.total_weight(),
        })
    );
    Ok(())
}
