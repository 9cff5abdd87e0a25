//! # Validate Command Implementation
//!
//! Loads each named repository (or every repository under the root) and
//! reports whether its trigger configuration resolves and validates. The
//! command fails when any repository fails.
//!
//! This command is read-only.

use anyhow::Result;
use clap::Args;

use inrepo_triggers::cache::{FetchCache, ResolverCache};
use inrepo_triggers::merger::TriggerLoader;
use inrepo_triggers::output::Status;

use super::{discover_repos, parse_repo, Context, RootArgs};

/// Check that repositories' trigger configuration loads cleanly
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub root: RootArgs,

    /// Repositories to validate, as OWNER/REPO. Defaults to every
    /// repository under the root.
    #[arg(value_name = "OWNER/REPO")]
    pub repos: Vec<String>,
}

/// Execute the `validate` command.
pub fn execute(args: ValidateArgs, ctx: &Context) -> Result<()> {
    let out = &ctx.out;
    let fetcher = args.root.fetcher(&ctx.settings)?;
    let repos = if args.repos.is_empty() {
        discover_repos(&args.root.root)?
    } else {
        args.repos
    };

    let fetch_cache = FetchCache::new();
    let resolver_cache = ResolverCache::new();
    let loader = TriggerLoader::new(&fetcher, &fetch_cache, &resolver_cache)
        .with_settings(ctx.settings.clone());

    let mut failures = 0;
    for full_name in &repos {
        let (owner, repo) = parse_repo(full_name)?;
        match loader.load(&owner, &repo, "") {
            Ok(triggers) => println!(
                "{}",
                out.status(
                    Status::Ok,
                    &format!(
                        "{}: {} presubmits, {} postsubmits",
                        full_name,
                        triggers.presubmits.len(),
                        triggers.postsubmits.len()
                    )
                )
            ),
            Err(e) => {
                failures += 1;
                println!("{}", out.status(Status::Error, &format!("{}: {}", full_name, e)));
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} repositories failed validation", failures, repos.len());
    }
    println!(
        "\n{}",
        out.heading(&format!("All {} repositories are valid", repos.len()))
    );
    Ok(())
}
