use clap::{Args, Subcommand};

use super::{ClientContext, OutputFormat};
use shopsync::config::Config;
use shopsync::db::SERVER_URL_KEY;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Point this device at a remote service (e.g. 192.168.1.20:8080)
    SetServer {
        /// Server address; a bare host gets http://
        url: String,
    },

    /// Forget the remote service and work local-only
    ClearServer,
}

impl ConfigCommand {
    pub async fn run(
        &self,
        client: &ClientContext,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let preferences = client.store.preferences();

        match &self.command {
            ConfigSubcommand::Show { format } => {
                let server_url = preferences.server_url().await?;
                match format {
                    OutputFormat::Json => {
                        let mut value = serde_json::to_value(config)?;
                        value["server_url"] =
                            serde_json::json!(server_url.as_ref().map(|u| u.to_string()));
                        value["device"] = serde_json::json!(client.orchestrator.device_id());
                        println!("{}", serde_json::to_string_pretty(&value)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("database_path: {}", config.database_path.value.display());
                        println!("  source: {}", config.database_path.source);
                        println!();

                        println!("device_id: {}", client.orchestrator.device_id());
                        println!("  source: {}", config.device_id.source);
                        println!();

                        match &server_url {
                            Some(url) => println!("server_url: {}", url),
                            None => println!("server_url: (not configured)"),
                        }
                        println!(
                            "sync: every {}s, offline after {} failures, {} per page",
                            config.sync.interval_secs,
                            config.sync.failure_threshold,
                            config.sync.page_size
                        );
                    }
                }
            }

            ConfigSubcommand::SetServer { url } => match preferences.set_server_url(url).await? {
                Some(url) => println!("Server set to {}", url),
                None => println!("Server cleared"),
            },

            ConfigSubcommand::ClearServer => {
                preferences.remove(SERVER_URL_KEY).await?;
                println!("Server cleared");
                if config.remote.server_url.is_some() {
                    println!(
                        "Note: remote.server_url in the config file will be used again on the next run."
                    );
                }
            }
        }

        Ok(())
    }
}
