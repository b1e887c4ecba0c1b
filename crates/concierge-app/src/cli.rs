//! CLI argument definitions for the Concierge binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use concierge_core::config::ConciergeConfig;

/// Concierge: an empathetic retail assistant driven from the terminal.
#[derive(Parser, Debug)]
#[command(name = "concierge", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory for the SQLite database.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage customer accounts.
    Customer {
        #[command(subcommand)]
        action: CustomerCommand,
    },
    /// Open a session and chat line by line on stdin. `/end` ends it.
    Chat {
        customer_id: String,
        #[arg(long, default_value = "cli")]
        channel: String,
    },
    /// Print the stored messages of a session, oldest first.
    History {
        session_id: Uuid,
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Read or overwrite a customer profile.
    Profile {
        #[command(subcommand)]
        action: ProfileCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum CustomerCommand {
    /// Register a customer and print its id.
    Add {
        email: String,
        /// Explicit id; a random UUID is used otherwise.
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    Show {
        customer_id: String,
    },
    /// Overwrite the profile. Omitted fields are cleared.
    Set {
        customer_id: String,
        /// Preferences as a JSON object, e.g. '{"style":"casual"}'.
        #[arg(long)]
        preferences: Option<String>,
        #[arg(long)]
        lifetime_value: Option<f64>,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > CONCIERGE_CONFIG env var > ~/.concierge/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("CONCIERGE_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Apply flag overrides on top of the loaded file.
    pub fn apply_overrides(&self, config: &mut ConciergeConfig) {
        if let Some(ref dir) = self.data_dir {
            config.general.data_dir = dir.to_string_lossy().to_string();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
    }
}

fn default_config_path() -> PathBuf {
    match std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        Some(home) => PathBuf::from(home).join(".concierge").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_config_flag_wins() {
        let args = CliArgs::try_parse_from(["concierge", "-c", "/tmp/c.toml", "chat", "cust-1"])
            .unwrap();
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/c.toml"));
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let args = CliArgs::try_parse_from([
            "concierge",
            "--data-dir",
            "/var/lib/concierge",
            "--log-level",
            "debug",
            "history",
            "6f1c9a52-2f7c-4c39-9d0e-6a3c7b1e2d4f",
        ])
        .unwrap();

        let mut config = ConciergeConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.general.data_dir, "/var/lib/concierge");
        assert_eq!(config.general.log_level, "debug");
    }

    #[test]
    fn test_no_overrides_keeps_file_values() {
        let args = CliArgs::try_parse_from(["concierge", "profile", "show", "cust-1"]).unwrap();
        let mut config = ConciergeConfig::default();
        let before = config.general.data_dir.clone();
        args.apply_overrides(&mut config);
        assert_eq!(config.general.data_dir, before);
    }

    #[test]
    fn test_chat_defaults_to_cli_channel() {
        let args = CliArgs::try_parse_from(["concierge", "chat", "cust-1"]).unwrap();
        match args.command {
            Command::Chat {
                customer_id,
                channel,
            } => {
                assert_eq!(customer_id, "cust-1");
                assert_eq!(channel, "cli");
            }
            other => panic!("Expected Chat, got {:?}", other),
        }
    }

    #[test]
    fn test_history_rejects_bad_session_id() {
        assert!(CliArgs::try_parse_from(["concierge", "history", "not-a-uuid"]).is_err());
    }

    #[test]
    fn test_profile_set_parses_fields() {
        let args = CliArgs::try_parse_from([
            "concierge",
            "profile",
            "set",
            "cust-1",
            "--preferences",
            r#"{"style":"casual"}"#,
            "--lifetime-value",
            "42.5",
        ])
        .unwrap();
        match args.command {
            Command::Profile {
                action:
                    ProfileCommand::Set {
                        preferences,
                        lifetime_value,
                        ..
                    },
            } => {
                assert_eq!(preferences.as_deref(), Some(r#"{"style":"casual"}"#));
                assert_eq!(lifetime_value, Some(42.5));
            }
            other => panic!("Expected Profile Set, got {:?}", other),
        }
    }
}
