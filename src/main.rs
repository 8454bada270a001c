//! Contract Runtime CLI entry point.
//!
//! Loads a TOML configuration, deploys the contracts it lists into an
//! in-memory state and performs a single call.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use contract_runtime_common::{Address, ConfigFile, ContractId};
use contract_runtime_core::{CallInfo, InMemoryState};
use contract_runtime_executor::ContractRuntime;

#[derive(Debug, Parser)]
#[command(name = "contract-runtime", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, env = "CONTRACT_RUNTIME_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Call an exported function on a deployed contract.
    Call {
        /// Hex-encoded address of the contract account.
        #[arg(long)]
        contract: Address,

        /// Exported function to invoke.
        #[arg(long)]
        function: String,

        /// Hex-encoded parameter bytes.
        #[arg(long, default_value = "")]
        params: String,

        /// Fuel budget; defaults to `execution.default_fuel`.
        #[arg(long)]
        fuel: Option<u64>,

        /// Hex-encoded address of the calling account.
        #[arg(long)]
        actor: Option<Address>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,contract_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config_file = match &cli.config {
        Some(path) => ConfigFile::from_file(path)?,
        None => ConfigFile::default(),
    };

    let state = Arc::new(InMemoryState::new());
    seed(&state, &config_file)?;

    let runtime = ContractRuntime::new(config_file.runtime)?;

    match cli.command {
        Command::Call {
            contract,
            function,
            params,
            fuel,
            actor,
        } => {
            let params = hex::decode(params.trim_start_matches("0x"))
                .context("--params must be hex-encoded")?;

            let mut defaults = CallInfo::new(state, contract, "");
            if let Some(fuel) = fuel {
                defaults.fuel = fuel;
            }
            if let Some(actor) = actor {
                defaults.actor = actor;
            }

            let result = runtime
                .with_defaults(defaults)
                .call_contract(contract, function, params)
                .await?;

            println!("{}", hex::encode(result));
            println!("{}", serde_json::to_string_pretty(&runtime.get_block_stats())?);
        }
    }

    Ok(())
}

/// Deploy every contract listed in the configuration file.
fn seed(state: &InMemoryState, config: &ConfigFile) -> anyhow::Result<()> {
    for entry in &config.contracts {
        let bytes = std::fs::read(&entry.path)
            .with_context(|| format!("Failed to read contract '{}' from {}", entry.id, entry.path))?;
        let address: Address = entry
            .address
            .parse()
            .with_context(|| format!("Invalid address for contract '{}'", entry.id))?;

        state.deploy(address, ContractId::from(entry.id.as_str()), bytes);
        state.set_balance(address, entry.balance);

        info!(
            contract_id = %entry.id,
            address = %address,
            balance = entry.balance,
            "Contract deployed"
        );
    }
    Ok(())
}
