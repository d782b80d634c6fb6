use anyhow::Result;
use clap::Parser;
use leaderboard_ledger::cli::{self, Command};
use leaderboard_ledger::{CredentialParams, LedgerConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "leaderboard-ledger")]
#[command(about = "Storefront revenue ledger and leaderboard")]
struct Cli {
    /// Directory holding ledger.json and tracking.jsonl
    #[arg(long, global = true, env = "LEADERBOARD_DATA_DIR", default_value = ".leaderboard")]
    data_dir: PathBuf,
    #[arg(long, global = true, env = "LEADERBOARD_HASH_MEMORY_KIB", default_value_t = argon2::Params::DEFAULT_M_COST)]
    hash_memory_kib: u32,
    #[arg(long, global = true, env = "LEADERBOARD_HASH_ITERATIONS", default_value_t = argon2::Params::DEFAULT_T_COST)]
    hash_iterations: u32,
    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Collector mode is chatty; everything else only surfaces warnings on stderr
    let default_level = if matches!(cli.command, Command::Serve { .. }) {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .init();

    let config = LedgerConfig {
        data_dir: cli.data_dir,
        credentials: CredentialParams {
            memory_kib: cli.hash_memory_kib,
            iterations: cli.hash_iterations,
            ..CredentialParams::default()
        },
        ..LedgerConfig::default()
    };

    cli::run(cli.command, config).await
}
