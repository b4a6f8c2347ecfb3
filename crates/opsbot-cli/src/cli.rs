//! CLI argument and command definitions.

use clap::{Parser, Subcommand};
use opsbot_core::{Config, Environment};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "opsbot", version, about = "opsbot: chat-ops bot runtime and permission groups")]
pub struct Cli {
    /// Runtime environment (development, test, production).
    #[arg(long = "env", env = "OPSBOT_ENV", global = true)]
    pub environment: Option<Environment>,

    /// Run without chat infrastructure. Only honoured in development.
    #[arg(long, env = "OPSBOT_CHAT_DISABLED", global = true)]
    pub chat_disabled: Option<bool>,

    /// Chat adapter (slack, hipchat, irc, null, test).
    #[arg(long, env = "OPSBOT_ADAPTER", global = true)]
    pub adapter: Option<String>,

    /// Config file (defaults to ~/.opsbot/config.json).
    #[arg(long, env = "OPSBOT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Store file.
    #[arg(long, env = "OPSBOT_STORE", global = true)]
    pub store: Option<PathBuf>,

    /// Directory holding `<version>_<name>` migration files.
    #[arg(long, env = "OPSBOT_MIGRATIONS_DIR", global = true)]
    pub migrations_dir: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Layer flags and environment variables over the loaded config.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(environment) = self.environment {
            config.environment = environment;
        }
        if let Some(chat_disabled) = self.chat_disabled {
            config.chat_disabled = chat_disabled;
        }
        if let Some(adapter) = &self.adapter {
            config.adapter = adapter.clone();
        }
        if let Some(store) = &self.store {
            config.store_path = Some(store.clone());
        }
        if let Some(dir) = &self.migrations_dir {
            config.migrations_dir = dir.clone();
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Boot the supervision tree and run until interrupted.
    Start,

    /// Record pending migrations in the migration table.
    Migrate,

    /// Manage permission groups.
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },

    /// Manage known roles.
    Role {
        #[command(subcommand)]
        action: RoleAction,
    },

    /// Register a user so it can join groups.
    User {
        /// User name.
        name: String,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum GroupAction {
    /// Create a group.
    Create { name: String },
    /// Rename a group.
    Rename { name: String, new_name: String },
    /// Delete a group with no roles and no members.
    Delete { name: String },
    /// Grant a role to a group.
    Grant { group: String, role: String },
    /// Revoke a role from a group.
    Revoke { group: String, role: String },
    /// Add a user to a group.
    AddMember { group: String, user: String },
    /// Remove a user from a group.
    RemoveMember { group: String, user: String },
    /// Print a group as JSON.
    Show { name: String },
    /// List all groups.
    List,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum RoleAction {
    /// Register a role.
    Create { name: String },
    /// List registered roles.
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "opsbot",
            "--env",
            "prod",
            "--chat-disabled",
            "true",
            "--adapter",
            "IRC",
            "start",
        ]);
        let mut config = Config::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.environment, Environment::Production);
        assert!(config.chat_disabled);
        assert_eq!(config.adapter, "IRC");
        assert!(matches!(cli.command, Commands::Start));
    }

    #[test]
    fn test_group_subcommands_parse() {
        let cli = Cli::parse_from(["opsbot", "group", "add-member", "ops", "alice"]);
        match cli.command {
            Commands::Group { action } => assert_eq!(
                action,
                GroupAction::AddMember {
                    group: "ops".to_string(),
                    user: "alice".to_string()
                }
            ),
            _ => panic!("expected group command"),
        }
    }

    #[test]
    fn test_unknown_environment_is_rejected() {
        assert!(Cli::try_parse_from(["opsbot", "--env", "staging", "start"]).is_err());
    }
}
