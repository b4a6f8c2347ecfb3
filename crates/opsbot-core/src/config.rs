use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

/// Deployment environment the process runs in.
///
/// Defaults to `Production`: development relaxes startup checks and has to be
/// asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Environment {
    /// Local development; schema drift is tolerated and chat may be disabled.
    Development,
    /// Automated test runs.
    Test,
    /// Anything deployed.
    #[default]
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        self == Environment::Development
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(CoreError::UnknownEnvironment(s.to_string())),
        }
    }
}

/// Serialized settings from ~/.opsbot/config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub environment: Environment,
    /// Skip bus, relay, command and adapter infrastructure (development only).
    pub chat_disabled: bool,
    /// Chat backend name; resolved case-insensitively at startup.
    pub adapter: String,
    /// Location of the store file. Falls back to the platform data dir.
    pub store_path: Option<PathBuf>,
    pub migrations_dir: PathBuf,
    pub schema_namespace: String,
    pub bus_shutdown_grace_ms: u64,
    pub max_restarts: u32,
    pub restart_window_secs: u64,
    pub token_reap_interval_secs: u64,
    pub template_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            chat_disabled: false,
            adapter: "slack".to_string(),
            store_path: None,
            migrations_dir: PathBuf::from("migrations"),
            schema_namespace: "opsbot".to_string(),
            bus_shutdown_grace_ms: 10_000,
            max_restarts: 3,
            restart_window_secs: 5,
            token_reap_interval_secs: 60,
            template_ttl_secs: 300,
        }
    }
}

impl Config {
    /// Store file location, resolving the platform default when unset.
    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("opsbot")
                .join("store.json")
        })
    }
}

/// Helper struct for storing the location to read/write global settings
pub struct ConfigStore {
    path: PathBuf,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".opsbot");
        path.push("config.json");
        Self { path }
    }

    /// Use an explicit config file (for testing and `--config`).
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load the saved config, failing on unreadable or malformed files.
    /// A missing file yields the defaults.
    pub fn try_load(&self) -> Result<Config, CoreError> {
        if !self.path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load the saved config, or fallback to Default
    pub fn load(&self) -> Config {
        match self.try_load() {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "ignoring unreadable config");
                Config::default()
            }
        }
    }

    /// Save the config back to disk
    pub fn save(&self, config: &Config) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_partial_file_uses_defaults() {
        let partial = r#"{ "adapter": "irc", "environment": "production" }"#;

        let parsed: Config = serde_json::from_str(partial).unwrap();
        assert_eq!(parsed.adapter, "irc");
        assert_eq!(parsed.environment, Environment::Production);
        assert!(!parsed.chat_disabled);
        assert_eq!(parsed.bus_shutdown_grace_ms, 10_000);
        assert_eq!(parsed.schema_namespace, "opsbot");
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("Production".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("test".parse::<Environment>().unwrap(), Environment::Test);

        let err = "staging".parse::<Environment>().unwrap_err().to_string();
        assert!(err.contains("staging"));
    }

    #[test]
    fn test_config_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_path(dir.path().join("nested").join("config.json"));

        let config = Config {
            adapter: "hipchat".to_string(),
            chat_disabled: true,
            ..Default::default()
        };
        store.save(&config).unwrap();

        let loaded = store.try_load().unwrap();
        assert_eq!(loaded.adapter, "hipchat");
        assert!(loaded.chat_disabled);
    }

    #[test]
    fn test_config_store_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_path(dir.path().join("absent.json"));
        let loaded = store.try_load().unwrap();
        assert_eq!(loaded.adapter, "slack");
    }

    #[test]
    fn test_defaults_never_relax_startup_checks() {
        assert_eq!(Config::default().environment, Environment::Production);
        let parsed: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.environment, Environment::Production);
    }

    #[test]
    fn test_mistyped_environment_is_not_development() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "environment": "staging" }"#).unwrap();
        let store = ConfigStore::with_path(&path);

        assert!(store.try_load().is_err());
        assert_ne!(store.load().environment, Environment::Development);
    }

    #[test]
    fn test_config_store_malformed_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = ConfigStore::with_path(&path);

        assert!(store.try_load().is_err());
        assert_eq!(store.load().adapter, "slack");
    }
}
