//! # Load Command Implementation
//!
//! Resolves one repository's trigger configuration and prints it as YAML or
//! JSON. Nothing is merged; this is the read-only view a control plane would
//! receive.

use anyhow::{Context as _, Result};
use clap::{Args, ValueEnum};

use inrepo_triggers::cache::{FetchCache, ResolverCache};
use inrepo_triggers::job::RepoTriggers;
use inrepo_triggers::merger::TriggerLoader;

use super::{parse_repo, Context, RootArgs};

/// Output format for the resolved configuration
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

/// Print the resolved trigger configuration of one repository
#[derive(Args, Debug)]
pub struct LoadArgs {
    #[command(flatten)]
    pub root: RootArgs,

    /// Repository to load, as OWNER/REPO.
    #[arg(value_name = "OWNER/REPO")]
    pub repo: String,

    /// Ref recorded in locators (the checkout itself is not switched).
    #[arg(long = "ref", value_name = "REF", default_value = "")]
    pub r#ref: String,

    /// Output format.
    #[arg(long, value_enum, default_value = "yaml")]
    pub format: Format,
}

/// Execute the `load` command.
pub fn execute(args: LoadArgs, ctx: &Context) -> Result<()> {
    let (owner, repo) = parse_repo(&args.repo)?;
    let fetcher = args.root.fetcher(&ctx.settings)?;
    let fetch_cache = FetchCache::new();
    let resolver_cache = ResolverCache::new();

    let triggers = TriggerLoader::new(&fetcher, &fetch_cache, &resolver_cache)
        .with_settings(ctx.settings.clone())
        .load(&owner, &repo, &args.r#ref)
        .with_context(|| format!("Failed to load triggers for {}", args.repo))?;

    print!("{}", render(&triggers, args.format)?);
    Ok(())
}

/// Serialise a trigger set in the requested format.
pub fn render(triggers: &RepoTriggers, format: Format) -> Result<String> {
    Ok(match format {
        Format::Yaml => serde_yaml::to_string(triggers)?,
        Format::Json => serde_json::to_string_pretty(triggers)? + "\n",
    })
}
