//! # Tree Command Implementation
//!
//! Displays one repository's resolved configuration as a tree:
//! repository, job kind, job, task, step.
//!
//! This command is read-only.

use anyhow::{Context as _, Result};
use clap::Args;
use ptree::{print_tree, TreeItem};

use inrepo_triggers::cache::{FetchCache, ResolverCache};
use inrepo_triggers::job::{JobBase, RepoTriggers, Step};
use inrepo_triggers::merger::TriggerLoader;

use super::{parse_repo, Context, RootArgs};

/// Show a repository's jobs, tasks and steps as a tree
#[derive(Args, Debug)]
pub struct TreeArgs {
    #[command(flatten)]
    pub root: RootArgs,

    /// Repository to show, as OWNER/REPO.
    #[arg(value_name = "OWNER/REPO")]
    pub repo: String,

    /// Maximum depth to display (0 shows only the repository).
    #[arg(long, value_name = "NUM")]
    pub depth: Option<usize>,
}

/// Execute the `tree` command.
pub fn execute(args: TreeArgs, ctx: &Context) -> Result<()> {
    let (owner, repo) = parse_repo(&args.repo)?;
    let fetcher = args.root.fetcher(&ctx.settings)?;
    let fetch_cache = FetchCache::new();
    let resolver_cache = ResolverCache::new();

    let triggers = TriggerLoader::new(&fetcher, &fetch_cache, &resolver_cache)
        .with_settings(ctx.settings.clone())
        .load(&owner, &repo, "")
        .with_context(|| format!("Failed to load triggers for {}", args.repo))?;

    println!(
        "{} Trigger tree for: {}",
        ctx.out.symbol("🌳", "[TREE]"),
        args.repo
    );
    let root = build_tree(&args.repo, &triggers).truncate(args.depth.unwrap_or(usize::MAX));
    print_tree(&root).context("Failed to display tree")?;
    Ok(())
}

/// Build the display tree for a trigger set
fn build_tree(full_name: &str, triggers: &RepoTriggers) -> TreeNode {
    let presubmits = triggers.presubmits.iter().map(|job| job_node(&job.base));
    let postsubmits = triggers.postsubmits.iter().map(|job| job_node(&job.base));
    TreeNode::new(
        full_name.to_string(),
        vec![
            TreeNode::new("presubmits".to_string(), presubmits.collect()),
            TreeNode::new("postsubmits".to_string(), postsubmits.collect()),
        ],
    )
}

fn job_node(base: &JobBase) -> TreeNode {
    let label = if base.context == base.name {
        base.name.clone()
    } else {
        format!("{} [{}]", base.name, base.context)
    };
    let tasks = base
        .pipeline
        .tasks
        .iter()
        .map(|task| {
            let steps = task.steps.iter().map(step_node).collect();
            TreeNode::new(task.name.clone(), steps)
        })
        .collect();
    TreeNode::new(label, tasks)
}

fn step_node(step: &Step) -> TreeNode {
    let label = match &step.name {
        Some(name) => format!("{} ({})", name, step.image),
        None => step.image.clone(),
    };
    TreeNode::new(label, vec![])
}

/// Tree node structure for ptree visualization
#[derive(Clone, Debug)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeNode {
    fn new(label: String, children: Vec<TreeNode>) -> Self {
        Self { label, children }
    }

    /// Drop everything below `depth` levels.
    fn truncate(mut self, depth: usize) -> Self {
        if depth == 0 {
            self.children.clear();
        } else {
            self.children = self
                .children
                .into_iter()
                .map(|child| child.truncate(depth - 1))
                .collect();
        }
        self
    }
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: std::io::Write>(
        &self,
        f: &mut W,
        _style: &ptree::Style,
    ) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> std::borrow::Cow<'_, [Self::Child]> {
        std::borrow::Cow::Borrowed(&self.children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inrepo_triggers::job::{Brancher, PipelineSpec, Presubmit, Task};
    use std::collections::BTreeMap;

    fn triggers() -> RepoTriggers {
        RepoTriggers {
            presubmits: vec![Presubmit {
                base: JobBase {
                    name: "lint".to_string(),
                    context: "ci/lint".to_string(),
                    labels: BTreeMap::new(),
                    max_concurrency: None,
                    pipeline: PipelineSpec {
                        params: BTreeMap::new(),
                        tasks: vec![Task {
                            name: "clippy".to_string(),
                            params: BTreeMap::new(),
                            steps: vec![Step {
                                name: Some("check".to_string()),
                                image: "rust:1.80".to_string(),
                                ..Step::default()
                            }],
                        }],
                    },
                    source_file: "myorg/myrepo/.lighthouse/triggers.yaml@HEAD".to_string(),
                },
                always_run: true,
                optional: false,
                trigger: Presubmit::default_trigger("lint"),
                rerun_command: Presubmit::default_rerun_command("lint"),
                run_if_changed: None,
                brancher: Brancher::default(),
            }],
            postsubmits: vec![],
        }
    }

    #[test]
    fn test_build_tree_labels() {
        let tree = build_tree("myorg/myrepo", &triggers());
        assert_eq!(tree.label, "myorg/myrepo");
        let job = &tree.children[0].children[0];
        assert_eq!(job.label, "lint [ci/lint]");
        assert_eq!(job.children[0].label, "clippy");
        assert_eq!(job.children[0].children[0].label, "check (rust:1.80)");
        assert!(tree.children[1].children.is_empty());
    }

    #[test]
    fn test_truncate_depth() {
        let tree = build_tree("myorg/myrepo", &triggers()).truncate(2);
        let job = &tree.children[0].children[0];
        assert!(job.children.is_empty());
        assert!(build_tree("myorg/myrepo", &triggers())
            .truncate(0)
            .children
            .is_empty());
    }
}
