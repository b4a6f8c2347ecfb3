//! Subcommand implementations.

pub mod group;
pub mod migrate;
pub mod start;

use opsbot_core::Config;
use opsbot_store::GroupStore;

pub async fn open_store(config: &Config) -> anyhow::Result<GroupStore> {
    let path = config.resolved_store_path();
    GroupStore::open(&path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open store {}: {e}", path.display()))
}
