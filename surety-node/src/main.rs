//! surety-node: drive a flight surety ledger with simulated oracle reporters

use clap::{Parser, Subcommand};
use tracing::info;

use surety_node::NodeConfig;

#[derive(Parser)]
#[command(name = "surety-node")]
#[command(about = "Reporter simulation node for the flight surety ledger")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "surety-node.toml")]
    config: String,

    /// Number of oracles to register (overrides config file)
    #[arg(long, env = "SURETY_ORACLES")]
    oracles: Option<usize>,

    /// Matching responses needed for quorum (overrides config file)
    #[arg(long, env = "SURETY_MIN_RESPONSES")]
    min_responses: Option<usize>,

    /// Hex entropy seed for oracle index draws (overrides config file)
    #[arg(long, env = "SURETY_ENTROPY_SEED")]
    entropy_seed: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the reporter simulation and print a JSON report
    Simulate,
    /// Print the effective configuration as TOML
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("surety=info".parse()?)
                .add_directive("surety_node=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    info!("Config file: {}", cli.config);

    let mut config = NodeConfig::load(&cli.config)?;
    if let Some(oracles) = cli.oracles {
        config.simulation.oracles = oracles;
    }
    if let Some(min_responses) = cli.min_responses {
        config.ledger.oracles.min_responses = min_responses;
    }
    if let Some(seed) = cli.entropy_seed {
        config.simulation.entropy_seed = Some(seed);
    }
    config.validate()?;

    match cli.command.unwrap_or(Command::Simulate) {
        Command::Simulate => {
            let report = surety_node::run(&config).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::ShowConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
