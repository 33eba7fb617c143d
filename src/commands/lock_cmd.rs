use clap::{Args, Subcommand};

use super::ClientContext;
use shopsync::remote::{LockState, ReleaseOutcome};

#[derive(Args)]
pub struct LockCommand {
    #[command(subcommand)]
    pub command: LockSubcommand,
}

#[derive(Subcommand)]
pub enum LockSubcommand {
    /// Show who holds the edit lock on a remote repair
    Status {
        /// Remote id of the repair
        remote_id: i64,
    },

    /// Take the edit lock for this device
    Acquire {
        /// Remote id of the repair
        remote_id: i64,
    },

    /// Give the edit lock back
    Release {
        /// Remote id of the repair
        remote_id: i64,
    },
}

impl LockCommand {
    pub async fn run(&self, client: &ClientContext) -> Result<(), Box<dyn std::error::Error>> {
        let orchestrator = &client.orchestrator;

        match &self.command {
            LockSubcommand::Status { remote_id } => {
                let state = orchestrator.query_lock(*remote_id).await?;
                print_lock(*remote_id, &state, orchestrator.device_id());
            }
            LockSubcommand::Acquire { remote_id } => {
                let state = orchestrator.acquire_lock(*remote_id).await?;
                print_lock(*remote_id, &state, orchestrator.device_id());
            }
            LockSubcommand::Release { remote_id } => {
                match orchestrator.release_lock_now(*remote_id).await {
                    ReleaseOutcome::Released => println!("Released lock on {}", remote_id),
                    ReleaseOutcome::Absorbed(e) => {
                        println!("Lock on {} may still be held: {}", remote_id, e)
                    }
                }
            }
        }

        Ok(())
    }
}

fn print_lock(entity_id: i64, state: &LockState, device_id: &str) {
    if !state.locked {
        println!("Repair {} is not locked", entity_id);
        return;
    }
    let holder = state.holder_device.as_deref().unwrap_or("unknown device");
    let since = state
        .acquired_at
        .map(|t| format!(" since {}", t.format("%Y-%m-%d %H:%M:%S")))
        .unwrap_or_default();
    if state.is_held_by(device_id) {
        println!("Repair {} is locked by this device{}", entity_id, since);
    } else {
        println!("Repair {} is locked by {}{}", entity_id, holder, since);
    }
}
