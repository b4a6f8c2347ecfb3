//! `opsbot migrate`: bring the migration table up to the files on disk.

use opsbot_core::Config;
use opsbot_store::{migrations, GroupStore};

/// Record pending migrations. Returns the versions recorded.
pub async fn apply(store: &GroupStore, config: &Config) -> anyhow::Result<Vec<u64>> {
    let files = migrations::scan(&config.migrations_dir).await?;
    let applied = migrations::apply_pending(store, &files, &config.schema_namespace).await?;
    store.ensure_admin().await?;
    Ok(applied)
}

pub async fn run(config: &Config) -> anyhow::Result<()> {
    let store = super::open_store(config).await?;
    let applied = apply(&store, config).await?;
    if applied.is_empty() {
        println!("Schema already up to date.");
    } else {
        for version in &applied {
            println!("Applied migration {version}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_migrate_records_files_and_seeds_admin() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("1_init.sql"), "").unwrap();
        std::fs::write(dir.path().join("2_groups.sql"), "").unwrap();
        let config = Config {
            migrations_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let store = GroupStore::in_memory();

        assert_eq!(apply(&store, &config).await.unwrap(), vec![1, 2]);
        assert_eq!(store.applied_version("opsbot").await, 2);
        assert!(store.get_group_by_name(opsbot_core::ADMIN_GROUP).await.is_ok());
        assert!(apply(&store, &config).await.unwrap().is_empty());
    }
}
