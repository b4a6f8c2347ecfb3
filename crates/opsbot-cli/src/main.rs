//! opsbot: chat-ops bot runtime
//!
//! Boots the supervision tree and administers permission groups.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use opsbot_core::ConfigStore;
use opsbot_runtime::abort;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let default = if verbose { "opsbot=debug" } else { "opsbot=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_store = match &cli.config {
        Some(path) => ConfigStore::with_path(path),
        None => ConfigStore::new(),
    };
    // `start` must not silently fall back to defaults on an unreadable file
    let mut config = match cli.command {
        Commands::Start => config_store.try_load().unwrap_or_else(|err| abort(&err)),
        _ => config_store.load(),
    };
    cli.apply_overrides(&mut config);
    tracing::debug!(config = %config_store.path().display(), environment = %config.environment, "configuration loaded");

    match cli.command {
        Commands::Start => commands::start::run(config).await?,
        Commands::Migrate => commands::migrate::run(&config).await?,
        Commands::Group { action } => {
            let store = commands::open_store(&config).await?;
            println!("{}", commands::group::run(&store, action).await?);
        }
        Commands::Role { action } => {
            let store = commands::open_store(&config).await?;
            println!("{}", commands::group::run_role(&store, action).await?);
        }
        Commands::User { name } => {
            let store = commands::open_store(&config).await?;
            println!("{}", commands::group::create_user(&store, &name).await?);
        }
    }

    Ok(())
}
