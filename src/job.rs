//! Resolved jobs
//!
//! These are the types handed to the rest of the control plane. They contain
//! no reference variants: every task and step is concrete, so a value of
//! these types is by construction fully resolved.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Whether a job runs before or after a change is merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Presubmit,
    Postsubmit,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Presubmit => write!(f, "presubmit"),
            JobKind::Postsubmit => write!(f, "postsubmit"),
        }
    }
}

/// One container step of a task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Step {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Container image reference, e.g. `org/image:tag`
    pub image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
}

/// A resolved task: an ordered list of concrete steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    pub steps: Vec<Step>,
}

/// A resolved pipeline: an ordered list of concrete tasks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    pub tasks: Vec<Task>,
}

/// Fields shared by presubmits and postsubmits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobBase {
    pub name: String,
    /// Status context reported for the job; defaults to the name
    pub context: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<u32>,
    pub pipeline: PipelineSpec,
    /// Locator of the trigger file that declared the job
    pub source_file: String,
}

/// Branch filters shared by both job kinds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brancher {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_branches: Vec<String>,
}

impl Brancher {
    /// Whether a job filtered by this brancher runs against `branch`.
    ///
    /// `skip_branches` wins over `branches`; no `branches` means every branch.
    pub fn should_run(&self, branch: &str) -> Result<bool> {
        for pattern in &self.skip_branches {
            if anchored(pattern)?.is_match(branch) {
                return Ok(false);
            }
        }
        if self.branches.is_empty() {
            return Ok(true);
        }
        for pattern in &self.branches {
            if anchored(pattern)?.is_match(branch) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Every branch pattern, for validation
    pub fn patterns(&self) -> impl Iterator<Item = &String> {
        self.branches.iter().chain(self.skip_branches.iter())
    }
}

/// Branch patterns match the whole branch name.
fn anchored(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{})$", pattern))?)
}

/// A job triggered on pull-request events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presubmit {
    #[serde(flatten)]
    pub base: JobBase,
    #[serde(default)]
    pub always_run: bool,
    #[serde(default)]
    pub optional: bool,
    /// Regex matched against comment bodies to trigger the job
    pub trigger: String,
    /// Comment that re-runs the job
    pub rerun_command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_if_changed: Option<String>,
    #[serde(flatten)]
    pub brancher: Brancher,
}

impl Presubmit {
    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn context(&self) -> &str {
        &self.base.context
    }

    /// Default trigger regex for a job named `name`
    pub fn default_trigger(name: &str) -> String {
        format!(r"(?m)^/test( all| {}),?(\s+|$)", regex::escape(name))
    }

    /// Default rerun command for a job named `name`
    pub fn default_rerun_command(name: &str) -> String {
        format!("/test {}", name)
    }

    /// Whether a pull request against `branch` should run this job.
    pub fn should_run(&self, branch: &str) -> Result<bool> {
        self.brancher.should_run(branch)
    }

    /// Whether a comment body requests this job.
    pub fn matches_comment(&self, body: &str) -> Result<bool> {
        Ok(Regex::new(&self.trigger)?.is_match(body))
    }
}

/// A job triggered on push events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Postsubmit {
    #[serde(flatten)]
    pub base: JobBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_if_changed: Option<String>,
    #[serde(flatten)]
    pub brancher: Brancher,
}

impl Postsubmit {
    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn context(&self) -> &str {
        &self.base.context
    }

    /// Whether a push to `branch` should run this job.
    pub fn should_run(&self, branch: &str) -> Result<bool> {
        self.brancher.should_run(branch)
    }
}

/// Every resolved job one repository declares
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoTriggers {
    #[serde(default)]
    pub presubmits: Vec<Presubmit>,
    #[serde(default)]
    pub postsubmits: Vec<Postsubmit>,
}

impl RepoTriggers {
    pub fn is_empty(&self) -> bool {
        self.presubmits.is_empty() && self.postsubmits.is_empty()
    }

    /// Total number of jobs of both kinds
    pub fn len(&self) -> usize {
        self.presubmits.len() + self.postsubmits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(name: &str) -> JobBase {
        JobBase {
            name: name.to_string(),
            context: name.to_string(),
            labels: BTreeMap::new(),
            max_concurrency: None,
            pipeline: PipelineSpec::default(),
            source_file: "o/r/.lighthouse/triggers.yaml@main".to_string(),
        }
    }

    fn presubmit(name: &str, brancher: Brancher) -> Presubmit {
        Presubmit {
            base: base(name),
            always_run: true,
            optional: false,
            trigger: Presubmit::default_trigger(name),
            rerun_command: Presubmit::default_rerun_command(name),
            run_if_changed: None,
            brancher,
        }
    }

    #[test]
    fn test_job_kind_display() {
        assert_eq!(JobKind::Presubmit.to_string(), "presubmit");
        assert_eq!(JobKind::Postsubmit.to_string(), "postsubmit");
    }

    #[test]
    fn test_default_trigger_matches_comments() {
        let job = presubmit("lint", Brancher::default());
        assert!(job.matches_comment("/test lint").unwrap());
        assert!(job.matches_comment("/test all").unwrap());
        assert!(job.matches_comment("looks good\n/test lint\n").unwrap());
        assert!(!job.matches_comment("/test linter").unwrap());
        assert!(!job.matches_comment("/test build").unwrap());
        assert_eq!(job.rerun_command, "/test lint");
    }

    #[test]
    fn test_default_trigger_escapes_name() {
        let job = presubmit("unit.tests", Brancher::default());
        assert!(job.matches_comment("/test unit.tests").unwrap());
        assert!(!job.matches_comment("/test unitXtests").unwrap());
    }

    #[test]
    fn test_brancher_should_run() {
        let everything = Brancher::default();
        assert!(everything.should_run("feature/x").unwrap());

        let main_only = Brancher {
            branches: vec!["main".to_string(), "release-.*".to_string()],
            skip_branches: vec![],
        };
        assert!(main_only.should_run("main").unwrap());
        assert!(main_only.should_run("release-1.2").unwrap());
        assert!(!main_only.should_run("mainline").unwrap());

        let skip = Brancher {
            branches: vec![".*".to_string()],
            skip_branches: vec!["gh-pages".to_string()],
        };
        assert!(!skip.should_run("gh-pages").unwrap());
        assert!(skip.should_run("main").unwrap());
    }

    #[test]
    fn test_brancher_invalid_pattern() {
        let broken = Brancher {
            branches: vec!["(".to_string()],
            skip_branches: vec![],
        };
        assert!(broken.should_run("main").is_err());
    }

    #[test]
    fn test_repo_triggers_len() {
        let mut triggers = RepoTriggers::default();
        assert!(triggers.is_empty());
        triggers
            .presubmits
            .push(presubmit("lint", Brancher::default()));
        triggers.postsubmits.push(Postsubmit {
            base: base("release"),
            run_if_changed: None,
            brancher: Brancher::default(),
        });
        assert!(!triggers.is_empty());
        assert_eq!(triggers.len(), 2);
    }
}
