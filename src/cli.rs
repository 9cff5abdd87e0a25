//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

use inrepo_triggers::output::{ColorChoice, OutputConfig};
use inrepo_triggers::settings::Settings;

use crate::commands::{self, Context};

/// Resolve and merge CI trigger configuration declared inside repositories
#[derive(Parser, Debug)]
#[command(name = "inrepo-triggers")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: ColorChoice,

    /// Set log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,

    /// Settings file (TOML). Defaults to the per-user config file when present.
    #[arg(long, global = true, value_name = "FILE", env = "INREPO_TRIGGERS_CONFIG")]
    config: Option<PathBuf>,

    /// Override the directory trigger files are read from.
    #[arg(long, global = true, value_name = "DIR", env = "INREPO_TRIGGERS_TRIGGER_DIR")]
    trigger_dir: Option<String>,

    /// Override the timeout for URL fetches, in seconds.
    #[arg(long, global = true, value_name = "SECS", env = "INREPO_TRIGGERS_HTTP_TIMEOUT")]
    http_timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the resolved trigger configuration of one repository
    Load(commands::load::LoadArgs),

    /// Check that repositories' trigger configuration loads cleanly
    Validate(commands::validate::ValidateArgs),

    /// Show a repository's jobs, tasks and steps as a tree
    Tree(commands::tree::TreeArgs),

    /// Merge many repositories into one configuration and report changes
    Merge(commands::merge::MergeArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);

        let mut settings = Settings::load(self.config.as_deref()).context("Failed to load settings")?;
        if let Some(trigger_dir) = self.trigger_dir {
            settings.trigger_dir = trigger_dir;
        }
        if let Some(timeout) = self.http_timeout {
            settings.http_timeout_secs = timeout;
        }
        settings.validate()?;

        let ctx = Context {
            out: OutputConfig::new(self.color),
            settings,
        };

        match self.command {
            Commands::Load(args) => commands::load::execute(args, &ctx),
            Commands::Validate(args) => commands::validate::execute(args, &ctx),
            Commands::Tree(args) => commands::tree::execute(args, &ctx),
            Commands::Merge(args) => commands::merge::execute(args, &ctx),
        }
    }
}

fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    // A logger may already be installed when embedded in tests.
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_parse() {
        let cli = Cli::try_parse_from([
            "inrepo-triggers",
            "--color",
            "never",
            "--trigger-dir",
            ".ci",
            "load",
            "myorg/myrepo",
        ])
        .unwrap();
        assert_eq!(cli.color, ColorChoice::Never);
        assert_eq!(cli.trigger_dir.as_deref(), Some(".ci"));
        assert_eq!(cli.log_level, "warn");
    }

    #[test]
    fn test_invalid_color_rejected() {
        assert!(Cli::try_parse_from(["inrepo-triggers", "--color", "pink", "merge"]).is_err());
    }
}
