use clap::{Args, Subcommand};

use super::{ClientContext, OutputFormat};
use shopsync::models::{Repair, RepairStatus};

#[derive(Args)]
pub struct RepairCommand {
    #[command(subcommand)]
    pub command: RepairSubcommand,
}

#[derive(Subcommand)]
pub enum RepairSubcommand {
    /// List repair tickets
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Only tickets not yet accepted by the server
        #[arg(long)]
        unsynced: bool,
    },

    /// Show a ticket's details
    Show {
        /// Receipt number
        receipt: i64,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Register a new repair ticket
    New {
        /// Client name
        client: String,

        /// Device being repaired
        device: String,

        /// Client phone number
        #[arg(long)]
        phone: Option<String>,

        /// Problem description
        #[arg(long)]
        problem: Option<String>,

        /// Technician assigned to the repair
        #[arg(long)]
        executor: Option<String>,

        /// Quoted cost
        #[arg(long)]
        cost: Option<f64>,

        /// Amount paid up front
        #[arg(long)]
        prepayment: Option<f64>,

        /// Mark as urgent
        #[arg(long)]
        urgent: bool,

        /// Receipt number (default: next free number)
        #[arg(long)]
        receipt: Option<i64>,
    },

    /// Change a ticket's status
    Status {
        /// Receipt number
        receipt: i64,

        /// New status (e.g. in_progress, ready, "Waiting for parts")
        status: RepairStatus,
    },
}

impl RepairCommand {
    pub async fn run(&self, client: &ClientContext) -> Result<(), Box<dyn std::error::Error>> {
        let repo = client.store.repairs();

        match &self.command {
            RepairSubcommand::List { format, unsynced } => {
                let repairs = if *unsynced {
                    repo.list_unsynced().await?
                } else {
                    repo.list().await?
                };

                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&repairs)?),
                    OutputFormat::Text => {
                        if repairs.is_empty() {
                            println!("No repairs found.");
                            return Ok(());
                        }
                        println!(
                            "{:>8}  {:<20}  {:<20}  {:<18}  {}",
                            "RECEIPT", "CLIENT", "DEVICE", "STATUS", "SYNCED"
                        );
                        for repair in &repairs {
                            println!(
                                "{:>8}  {:<20}  {:<20}  {:<18}  {}",
                                repair.receipt_number,
                                truncate(&repair.client_name, 20),
                                truncate(&repair.device, 20),
                                truncate(&repair.status, 18),
                                if repair.synced { "yes" } else { "no" }
                            );
                        }
                    }
                }
            }

            RepairSubcommand::Show { receipt, format } => {
                let repair = find(client, *receipt).await?;
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&repair)?),
                    OutputFormat::Text => print_repair(&repair),
                }
            }

            RepairSubcommand::New {
                client: client_name,
                device,
                phone,
                problem,
                executor,
                cost,
                prepayment,
                urgent,
                receipt,
            } => {
                let mut repair = Repair::new(receipt.unwrap_or(0), client_name, device);
                if let Some(phone) = phone {
                    repair = repair.with_phone(phone);
                }
                if let Some(problem) = problem {
                    repair = repair.with_problem(problem);
                }
                if let Some(executor) = executor {
                    repair = repair.with_executor(executor);
                }
                if let Some(cost) = cost {
                    repair = repair.with_cost(*cost);
                }
                repair.prepayment = prepayment.unwrap_or(0.0);
                repair.urgent = *urgent;

                let created = client.orchestrator.create_repair(repair).await?;
                println!("Created repair #{}", created.receipt_number);
                if !created.synced {
                    println!("Saved locally; it will be sent on the next sync.");
                }
            }

            RepairSubcommand::Status { receipt, status } => {
                let mut repair = find(client, *receipt).await?;
                repair.status = status.label().to_string();
                let updated = repo.update_local(&repair).await?;
                println!(
                    "Repair #{} is now '{}'",
                    updated.receipt_number, updated.status
                );
            }
        }

        Ok(())
    }
}

async fn find(client: &ClientContext, receipt: i64) -> Result<Repair, Box<dyn std::error::Error>> {
    client
        .store
        .repairs()
        .find_by_receipt(receipt)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| format!("Repair #{} not found", receipt).into())
}

fn print_repair(repair: &Repair) {
    println!("Repair #{}", repair.receipt_number);
    println!("{}", "=".repeat(8 + repair.receipt_number.to_string().len()));
    println!();
    println!("Client:     {}", repair.client_name);
    if !repair.client_phone.is_empty() {
        println!("Phone:      {}", repair.client_phone);
    }
    println!("Device:     {}", repair.device);
    if !repair.problem.is_empty() {
        println!("Problem:    {}", repair.problem);
    }
    println!("Status:     {}", repair.status);
    if !repair.executor.is_empty() {
        println!("Executor:   {}", repair.executor);
    }
    println!(
        "Cost:       {:.2} (prepaid {:.2}, due {:.2})",
        repair.cost,
        repair.prepayment,
        repair.balance_due()
    );
    if repair.urgent {
        println!("Urgent:     yes");
    }
    println!(
        "Created:    {}",
        repair.created_at.format("%Y-%m-%d %H:%M")
    );
    match repair.remote_id {
        Some(id) if repair.synced => println!("Sync:       synced (remote id {})", id),
        Some(id) => println!("Sync:       local changes pending (remote id {})", id),
        None => println!("Sync:       not yet sent"),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
