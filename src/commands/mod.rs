//! # CLI Command Implementations
//!
//! Each subcommand lives in its own file with:
//! - An `Args` struct defining its options, derived using `clap`.
//! - An `execute` function taking the parsed `Args` and the shared
//!   [`Context`].
//!
//! All commands read repositories from a directory of checkouts laid out as
//! `<root>/<owner>/<repo>/...`.

pub mod load;
pub mod merge;
pub mod tree;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::Args;

use inrepo_triggers::fetcher::DirectoryFetcher;
use inrepo_triggers::http::HttpClient;
use inrepo_triggers::locator::split_full_name;
use inrepo_triggers::output::OutputConfig;
use inrepo_triggers::settings::Settings;

/// State shared by every command
pub struct Context {
    pub out: OutputConfig,
    pub settings: Settings,
}

/// Location of the repository checkouts
#[derive(Args, Debug, Clone)]
pub struct RootArgs {
    /// Directory holding checkouts as `<owner>/<repo>`.
    #[arg(long, value_name = "DIR", env = "INREPO_TRIGGERS_ROOT", default_value = ".")]
    pub root: PathBuf,
}

impl RootArgs {
    pub fn fetcher(&self, settings: &Settings) -> Result<DirectoryFetcher> {
        if !self.root.is_dir() {
            anyhow::bail!("Repository root {} is not a directory", self.root.display());
        }
        let http = HttpClient::from_settings(settings).context("Failed to build HTTP client")?;
        Ok(DirectoryFetcher::new(self.root.clone(), http))
    }
}

/// Split an `OWNER/REPO` argument.
pub fn parse_repo(full_name: &str) -> Result<(String, String)> {
    split_full_name(full_name).with_context(|| format!("Invalid repository '{}'", full_name))
}

/// Every `<owner>/<repo>` directory under `root`, sorted.
///
/// Hidden directories are skipped at both levels.
pub fn discover_repos(root: &Path) -> Result<Vec<String>> {
    let mut repos = Vec::new();
    for owner in read_dirs(root)? {
        for repo in read_dirs(&root.join(&owner))? {
            repos.push(format!("{}/{}", owner, repo));
        }
    }
    repos.sort();
    Ok(repos)
}

fn read_dirs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with('.') && entry.file_type()?.is_dir() {
            names.push(name);
        }
    }
    Ok(names)
}
