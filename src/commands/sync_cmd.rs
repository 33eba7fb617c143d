//! Sync CLI commands for synchronizing with the remote service.

use clap::{Args, Subcommand};

use super::ClientContext;
use shopsync::config::Config;
use shopsync::remote::Collection;
use shopsync::sync::{ReconcileReport, RunOutcome, SyncStatus, SyncTrigger};

/// Sync with remote service
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration and server status
    Status,
}

impl SyncCommand {
    pub async fn run(
        &self,
        client: &ClientContext,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            None => self.sync(client).await,
            Some(SyncSubcommand::Status) => self.status(client, config).await,
        }
    }

    async fn sync(&self, client: &ClientContext) -> Result<(), Box<dyn std::error::Error>> {
        println!("Syncing with server...");
        println!();

        match client.orchestrator.run_sync(SyncTrigger::Manual).await {
            RunOutcome::Skipped(reason) => {
                println!("Sync skipped: {}", reason);
            }
            RunOutcome::Completed { report, absorbed } => {
                print_report(Collection::Repairs, &report.repairs);
                if let Some(warehouse) = &report.warehouse {
                    print_report(Collection::WarehouseItems, warehouse);
                }
                if let Some(transactions) = &report.transactions {
                    print_report(Collection::Transactions, transactions);
                }
                for failure in &absorbed {
                    println!("  ✗ {}: {}", failure.collection, failure.error);
                }
                println!();
                println!("Sync complete.");
            }
            RunOutcome::Failed(e) => return Err(e.into()),
        }

        Ok(())
    }

    async fn status(
        &self,
        client: &ClientContext,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        let unsynced = client.store.repairs().list_unsynced().await?.len();
        println!("Device:    {}", client.orchestrator.device_id());
        println!("Interval:  {}s", config.sync.interval_secs);
        println!("Unsynced:  {} repair(s)", unsynced);

        let Some(base) = client.store.preferences().server_url().await? else {
            println!("Server:    not configured");
            println!();
            println!("To enable sync, run:");
            println!();
            println!("  shopsync config set-server 192.168.1.20:8080");
            println!();
            println!("Or set remote.server_url in your config file.");
            return Ok(());
        };
        println!("Server:    {}", base);
        println!();

        print!("Server status: ");
        match client.gateway.health(&base).await {
            Ok(health) => match health.version {
                Some(version) => println!("✓ {} (version {})", health.status, version),
                None => println!("✓ {}", health.status),
            },
            Err(e) => println!("✗ {}", e),
        }

        Ok(())
    }
}

fn print_report(collection: Collection, report: &ReconcileReport) {
    println!(
        "  ✓ {}: {} pulled, {} pushed, {} pruned",
        collection, report.pulled, report.pushed, report.pruned
    );
    if report.skipped_unsynced > 0 {
        println!("      {} kept local (unsynced edits)", report.skipped_unsynced);
    }
    if report.push_rejected > 0 {
        println!("      {} rejected by server", report.push_rejected);
    }
    if report.placeholders > 0 {
        println!("      {} unreadable record(s)", report.placeholders);
    }
}

fn print_status(status: &SyncStatus) {
    let state = if status.offline_mode {
        "offline"
    } else if status.is_syncing {
        "syncing"
    } else {
        "idle"
    };
    let last = status
        .last_sync_time
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    match &status.last_error {
        Some(e) => println!(
            "[{}] last sync: {}, failures: {}, error: {}",
            state, last, status.failure_count, e
        ),
        None => println!("[{}] last sync: {}", state, last),
    }
}

/// Runs the orchestrator until Ctrl-C, printing each status change.
pub async fn watch(client: &ClientContext) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = &client.orchestrator;
    let mut status = orchestrator.subscribe();
    orchestrator.start()?;
    println!("Watching for changes (Ctrl-C to stop)...");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                print_status(&snapshot);
            }
        }
    }

    println!();
    println!("Stopping...");
    orchestrator.stop();
    orchestrator.wait_idle().await;
    Ok(())
}
