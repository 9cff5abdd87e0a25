//! # Merge Command Implementation
//!
//! Merges many repositories into a fresh global configuration in parallel,
//! the way a control plane refreshes its view after a push. All
//! repositories share one fetch cache and one resolver cache, so content
//! referenced from several repositories is fetched once.
//!
//! Prints one line per repository and a summary. Fails when any repository
//! failed to merge.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use rayon::prelude::*;

use inrepo_triggers::cache::{FetchCache, ResolverCache};
use inrepo_triggers::error::Error;
use inrepo_triggers::merger::{GlobalConfig, PluginConfig, TriggerLoader};
use inrepo_triggers::output::Status;

use super::{discover_repos, parse_repo, Context, RootArgs};

/// Merge many repositories into one configuration and report changes
#[derive(Args, Debug)]
pub struct MergeArgs {
    #[command(flatten)]
    pub root: RootArgs,

    /// Repositories to merge, as OWNER/REPO. Defaults to every repository
    /// under the root.
    #[arg(value_name = "OWNER/REPO")]
    pub repos: Vec<String>,

    /// Existing plugin configuration (YAML) to merge plugin enablement into.
    #[arg(long, value_name = "FILE")]
    pub plugins: Option<PathBuf>,

    /// Print the resulting plugin configuration.
    #[arg(long)]
    pub show_plugins: bool,
}

/// Outcome of merging one repository
struct RepoOutcome {
    full_name: String,
    result: std::result::Result<bool, Error>,
}

/// Execute the `merge` command.
pub fn execute(args: MergeArgs, ctx: &Context) -> Result<()> {
    let out = &ctx.out;
    let fetcher = args.root.fetcher(&ctx.settings)?;
    let repos = if args.repos.is_empty() {
        discover_repos(&args.root.root)?
    } else {
        args.repos.clone()
    };
    let repos = repos
        .iter()
        .map(|full_name| parse_repo(full_name).map(|(owner, repo)| (full_name.clone(), owner, repo)))
        .collect::<Result<Vec<_>>>()?;

    let plugins = match &args.plugins {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            PluginConfig::from_yaml(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => PluginConfig::default(),
    };
    let global = GlobalConfig::new();
    let fetch_cache = FetchCache::new();
    let resolver_cache = ResolverCache::new();
    let loader = TriggerLoader::new(&fetcher, &fetch_cache, &resolver_cache)
        .with_settings(ctx.settings.clone());

    let outcomes: Vec<RepoOutcome> = repos
        .par_iter()
        .map(|(full_name, owner, repo)| RepoOutcome {
            full_name: full_name.clone(),
            result: loader.merge(&global, &plugins, owner, repo, ""),
        })
        .collect();

    let mut changed = 0;
    let mut failed = 0;
    for outcome in &outcomes {
        let line = match &outcome.result {
            Ok(true) => {
                changed += 1;
                let jobs = global
                    .repo(&outcome.full_name)?
                    .map(|triggers| triggers.len())
                    .unwrap_or(0);
                out.status(
                    Status::Changed,
                    &format!("{}: {} jobs", outcome.full_name, jobs),
                )
            }
            Ok(false) => out.status(Status::Unchanged, &outcome.full_name),
            Err(e) => {
                failed += 1;
                out.status(Status::Error, &format!("{}: {}", outcome.full_name, e))
            }
        };
        println!("{}", line);
    }

    let (mut presubmits, mut postsubmits) = (0, 0);
    for full_name in global.repos()? {
        if let Some(triggers) = global.repo(&full_name)? {
            presubmits += triggers.presubmits.len();
            postsubmits += triggers.postsubmits.len();
        }
    }

    println!("\n{}", out.heading("Summary:"));
    println!("   Repositories: {}", outcomes.len());
    println!("   Changed: {}", changed);
    println!("   Failed: {}", failed);
    println!("   Presubmits: {}", presubmits);
    println!("   Postsubmits: {}", postsubmits);

    if args.show_plugins {
        println!("\n{}", out.heading("Plugins:"));
        print!("{}", serde_yaml::to_string(&plugins.snapshot()?)?);
    }

    if failed > 0 {
        anyhow::bail!("{} of {} repositories failed to merge", failed, outcomes.len());
    }
    Ok(())
}
