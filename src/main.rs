//! Chainscore CLI
//!
//! One-shot wallet credit scoring from the terminal:
//! - `chainscore score <address> --chain sei|eth|sol`
//! - `chainscore health`

use chainscore::models::types::Chain;
use chainscore::{AppConfig, ScoreOrchestrator};

use clap::{Parser, Subcommand};
use eyre::Result;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "chainscore", version, about = "Multi-chain wallet credit scoring")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score one wallet
    Score {
        /// Wallet address (0x… for Sei/Ethereum, base58 for Solana)
        address: String,
        /// sei | eth | sol
        #[arg(long, short, default_value = "sei")]
        chain: String,
        /// Print the full JSON response instead of the summary
        #[arg(long)]
        json: bool,
    },
    /// Engine status plus a probe of every configured chain
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let orchestrator = ScoreOrchestrator::from_config(&config).await?;

    match cli.command {
        Command::Score { address, chain, json } => {
            let chain = Chain::parse(&chain)?;
            let response = orchestrator.get_score(&address, chain).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                let result = &response.result;
                println!("{}", result.summary());
                println!("   Band: {} | Latency: {}ms", response.band, response.latency_ms);
                for factor in &result.factors {
                    println!("   {:<18} {:>4} / {:<4}", factor.name, factor.points, factor.max_points);
                }
            }
        }
        Command::Health => {
            let report = orchestrator.health();
            println!("{}", serde_json::to_string_pretty(&report)?);
            for probe in orchestrator.chain_health().await {
                let mark = if probe.healthy { "✅" } else { "❌" };
                match probe.error {
                    Some(err) => println!("{} {} ({}ms): {}", mark, probe.chain.name(), probe.latency_ms, err),
                    None => println!("{} {} ({}ms)", mark, probe.chain.name(), probe.latency_ms),
                }
            }
        }
    }

    Ok(())
}
