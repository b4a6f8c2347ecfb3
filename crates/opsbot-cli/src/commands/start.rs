//! `opsbot start`: boot and supervise until interrupted.

use opsbot_core::Config;
use opsbot_runtime::{abort, BootError, Bootstrap};
use std::sync::Arc;
use tracing::info;

pub async fn run(config: Config) -> anyhow::Result<()> {
    let store = match super::open_store(&config).await {
        Ok(store) => Arc::new(store),
        Err(err) => abort(&*err),
    };

    let mut bootstrap = Bootstrap::new(config, store);
    let mut handle = match bootstrap.start().await {
        Ok(handle) => handle,
        Err(err) => abort(&err),
    };

    let failure = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            None
        }
        err = handle.wait() => Some(err),
    };

    handle.shutdown().await;
    match failure {
        Some(err) => abort(&BootError::Supervisor(err)),
        None => {
            info!("opsbot stopped");
            Ok(())
        }
    }
}
