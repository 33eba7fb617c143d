use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{ClientContext, ConfigCommand, LockCommand, RepairCommand, SyncCommand};
use shopsync::config::Config;

#[derive(Parser)]
#[command(name = "shopsync")]
#[command(version)]
#[command(about = "Offline-first repair shop client", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize with the remote service
    Sync(SyncCommand),

    /// Keep syncing in the background until Ctrl-C
    Watch,

    /// Manage repair tickets
    Repair(RepairCommand),

    /// Inspect and manage remote edit locks
    Lock(LockCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shopsync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    let Some(command) = cli.command else {
        println!("Use --help to see available commands");
        return Ok(());
    };

    let client = ClientContext::open(&config).await?;
    match command {
        Commands::Sync(cmd) => cmd.run(&client, &config).await?,
        Commands::Watch => commands::watch(&client).await?,
        Commands::Repair(cmd) => cmd.run(&client).await?,
        Commands::Lock(cmd) => cmd.run(&client).await?,
        Commands::Config(cmd) => cmd.run(&client, &config).await?,
    }

    client.orchestrator.wait_idle().await;
    Ok(())
}
