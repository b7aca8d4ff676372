use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use drawdown::api::run_http_server;
use drawdown::core::{SimulationConfig, SimulationEngine, ValidationError, run_monte_carlo};

#[derive(Parser, Debug)]
#[command(
    name = "drawdown",
    about = "Household retirement drawdown simulator (monthly ledger, RMDs, guardrails)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the JSON API over HTTP.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Run a single simulation from a JSON config file and print the result.
    Run {
        #[arg(long)]
        config: PathBuf,
    },
    /// Run a Monte Carlo sweep from a JSON config file and print the summary.
    Montecarlo {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, default_value_t = 1_000)]
        runs: u32,
    },
}

fn load_config(path: &PathBuf) -> Result<SimulationConfig, String> {
    let raw = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("{}: {e}", path.display()))
}

fn invalid(e: ValidationError) -> ExitCode {
    eprintln!("invalid configuration: {e}");
    ExitCode::from(2)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { port } => {
            if let Err(e) = run_http_server(port).await {
                eprintln!("server error: {e}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Command::Run { config } => {
            let config = match load_config(&config) {
                Ok(config) => config,
                Err(msg) => {
                    eprintln!("{msg}");
                    return ExitCode::FAILURE;
                }
            };
            let result = match SimulationEngine::with_default_calculators(config) {
                Ok(engine) => engine.run(),
                Err(e) => return invalid(e),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&result).expect("result serializes")
            );
            ExitCode::SUCCESS
        }
        Command::Montecarlo { config, runs } => {
            let config = match load_config(&config) {
                Ok(config) => config,
                Err(msg) => {
                    eprintln!("{msg}");
                    return ExitCode::FAILURE;
                }
            };
            let summary = match run_monte_carlo(&config, runs) {
                Ok(summary) => summary,
                Err(e) => return invalid(e),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).expect("summary serializes")
            );
            ExitCode::SUCCESS
        }
    }
}
