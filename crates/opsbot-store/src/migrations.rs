//! Migration directory scanning and the migration table.
//!
//! Migration files are named `<numeric-version>_<description>`; anything
//! else in the directory is ignored. The schema itself belongs to the
//! persistence engine; this module only tracks which versions exist on disk
//! and which have been recorded as applied.

use crate::error::StoreError;
use crate::store::GroupStore;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

const MIGRATION_FILE_PATTERN: &str = r"^([0-9]+)_(.+)$";

/// A migration file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: u64,
    pub name: String,
    pub path: PathBuf,
}

/// List migration files in `dir`, ordered by version.
///
/// A missing directory yields an empty list; two files sharing a version are
/// an error.
pub async fn scan(dir: &Path) -> Result<Vec<MigrationFile>, StoreError> {
    if !fs::try_exists(dir).await? {
        return Ok(Vec::new());
    }

    let pattern =
        Regex::new(MIGRATION_FILE_PATTERN).map_err(|e| StoreError::InvalidFormat(e.to_string()))?;
    let mut entries = fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some(captures) = pattern.captures(&file_name) else {
            tracing::debug!(file = %file_name, "skipping non-migration file");
            continue;
        };
        let version = captures[1].parse::<u64>().map_err(|e| {
            StoreError::InvalidFormat(format!("migration '{file_name}': {e}"))
        })?;
        files.push(MigrationFile {
            version,
            name: captures[2].to_string(),
            path: entry.path(),
        });
    }

    files.sort_by_key(|file| file.version);
    if let Some(pair) = files.windows(2).find(|pair| pair[0].version == pair[1].version) {
        return Err(StoreError::InvalidFormat(format!(
            "duplicate migration version {} ({} and {})",
            pair[0].version,
            pair[0].path.display(),
            pair[1].path.display()
        )));
    }
    Ok(files)
}

/// Highest version among `files`, or 0 when empty.
pub fn file_version(files: &[MigrationFile]) -> u64 {
    files.iter().map(|file| file.version).max().unwrap_or(0)
}

/// Record every file newer than the applied version. Returns the versions
/// recorded, in order.
pub async fn apply_pending(
    store: &GroupStore,
    files: &[MigrationFile],
    namespace: &str,
) -> Result<Vec<u64>, StoreError> {
    let current = store.applied_version(namespace).await;
    let mut applied = Vec::new();

    for file in files.iter().filter(|file| file.version > current) {
        info!(version = file.version, name = %file.name, "Applying migration");
        store.record_migration(namespace, file.version).await?;
        applied.push(file.version);
    }

    if applied.is_empty() {
        info!(version = current, "Schema already up to date");
    }
    Ok(applied)
}
