// berthd: box deployment agent
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::stderr;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

mod cmd;
use cmd::start::StartArgs;

#[derive(Parser, Debug)]
#[command(name = "berthd", author, version, about = "Box deployment agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output - shows debug logs
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Starts the agent and deploys boxes until stopped.
    Start(StartArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG, fall back to verbose/info for our crates
    let level = if cli.verbose { "debug" } else { "info" };
    let default_directives = format!(
        "berthd={level},berth_actions={level},berth_common={level},berth_provision={level},berth_agent={level},tower=warn,hyper=warn,reqwest=warn",
        level = level
    );
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));
    registry().with(filter).with(fmt::layer().with_writer(stderr)).init();

    match cli.command {
        Commands::Start(args) => {
            if let Err(e) = cmd::start::run(args).await {
                error!("berthd failed: {:#}", e);
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
