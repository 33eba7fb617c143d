mod config_cmd;
mod lock_cmd;
mod repair;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use lock_cmd::LockCommand;
pub use repair::RepairCommand;
pub use sync_cmd::{watch, SyncCommand};

use clap::ValueEnum;
use std::sync::Arc;

use shopsync::config::Config;
use shopsync::db::LocalStore;
use shopsync::remote::{HttpGateway, RemoteGateway};
use shopsync::sync::{SyncOrchestrator, SysfsNetworkSource};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Everything a command needs on this device.
pub struct ClientContext {
    pub store: LocalStore,
    pub gateway: Arc<dyn RemoteGateway>,
    pub orchestrator: SyncOrchestrator,
}

impl ClientContext {
    pub async fn open(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let store = LocalStore::open(&config.database_path.value).await?;
        let preferences = store.preferences();

        // The stored URL wins; config only provides the first value.
        if let Some(url) = &config.remote.server_url {
            preferences.seed_server_url(url).await?;
        }
        let device_id = match &config.device_id.value {
            Some(id) => id.clone(),
            None => preferences.device_id().await?,
        };

        let gateway: Arc<dyn RemoteGateway> = Arc::new(HttpGateway::new(
            config.remote.timeouts(),
            config.remote.api_key.clone(),
        )?);
        let network = SysfsNetworkSource::new(config.sync.network_poll());
        let orchestrator = SyncOrchestrator::new(
            store.clone(),
            gateway.clone(),
            network,
            config.sync.policy(),
            device_id,
        );

        Ok(Self {
            store,
            gateway,
            orchestrator,
        })
    }
}
