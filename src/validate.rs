//! Semantic checks on a resolved trigger set
//!
//! Validation is fail-fast: the first problem found is returned and the
//! repository's configuration is not merged.

use std::collections::HashSet;

use regex::Regex;

use crate::error::{Error, Result};
use crate::job::{Brancher, JobBase, JobKind, RepoTriggers};

/// Validate every job declared by the repository `full_name`.
///
/// Presubmit and postsubmit names (and contexts) are checked independently;
/// a presubmit and a postsubmit may share a name.
pub fn validate_triggers(full_name: &str, triggers: &RepoTriggers) -> Result<()> {
    let mut checker = Checker::new(full_name, JobKind::Presubmit);
    for job in &triggers.presubmits {
        checker.unique(&job.base)?;
        checker.regex(&job.base, "trigger", &job.trigger)?;
        if let Some(pattern) = &job.run_if_changed {
            checker.regex(&job.base, "run_if_changed", pattern)?;
        }
        checker.branches(&job.base, &job.brancher)?;
        checker.steps(&job.base)?;
    }

    let mut checker = Checker::new(full_name, JobKind::Postsubmit);
    for job in &triggers.postsubmits {
        checker.unique(&job.base)?;
        if let Some(pattern) = &job.run_if_changed {
            checker.regex(&job.base, "run_if_changed", pattern)?;
        }
        checker.branches(&job.base, &job.brancher)?;
        checker.steps(&job.base)?;
    }

    Ok(())
}

/// Per-kind validation state
struct Checker<'a> {
    repo: &'a str,
    kind: JobKind,
    names: HashSet<String>,
    contexts: HashSet<String>,
}

impl<'a> Checker<'a> {
    fn new(repo: &'a str, kind: JobKind) -> Self {
        Self {
            repo,
            kind,
            names: HashSet::new(),
            contexts: HashSet::new(),
        }
    }

    fn unique(&mut self, job: &JobBase) -> Result<()> {
        if !self.names.insert(job.name.clone()) {
            return Err(Error::DuplicateJob {
                repo: self.repo.to_string(),
                kind: self.kind,
                name: job.name.clone(),
            });
        }
        if !job.context.is_empty() && !self.contexts.insert(job.context.clone()) {
            return Err(Error::DuplicateJob {
                repo: self.repo.to_string(),
                kind: self.kind,
                name: format!("context {}", job.context),
            });
        }
        Ok(())
    }

    fn regex(&self, job: &JobBase, field: &str, pattern: &str) -> Result<()> {
        Regex::new(pattern)
            .map(|_| ())
            .map_err(|e| self.invalid(job, format!("invalid {} regex: {}", field, e)))
    }

    fn branches(&self, job: &JobBase, brancher: &Brancher) -> Result<()> {
        for pattern in brancher.patterns() {
            Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
                self.invalid(job, format!("invalid branch pattern '{}': {}", pattern, e))
            })?;
        }
        Ok(())
    }

    fn steps(&self, job: &JobBase) -> Result<()> {
        for task in &job.pipeline.tasks {
            for (index, step) in task.steps.iter().enumerate() {
                if step.image.trim().is_empty() {
                    return Err(self.invalid(
                        job,
                        format!("step {} of task '{}' has no image", index + 1, task.name),
                    ));
                }
            }
        }
        Ok(())
    }

    fn invalid(&self, job: &JobBase, message: String) -> Error {
        Error::InvalidJob {
            repo: self.repo.to_string(),
            kind: self.kind,
            name: job.name.clone(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{PipelineSpec, Postsubmit, Presubmit, Step, Task};
    use std::collections::BTreeMap;

    fn base(name: &str) -> JobBase {
        JobBase {
            name: name.to_string(),
            context: name.to_string(),
            labels: BTreeMap::new(),
            max_concurrency: None,
            pipeline: PipelineSpec {
                params: BTreeMap::new(),
                tasks: vec![Task {
                    name: "build".to_string(),
                    params: BTreeMap::new(),
                    steps: vec![Step {
                        image: "alpine".to_string(),
                        ..Step::default()
                    }],
                }],
            },
            source_file: "myorg/myrepo/.lighthouse/triggers.yaml@master".to_string(),
        }
    }

    fn presubmit(name: &str) -> Presubmit {
        Presubmit {
            base: base(name),
            always_run: false,
            optional: false,
            trigger: Presubmit::default_trigger(name),
            rerun_command: Presubmit::default_rerun_command(name),
            run_if_changed: None,
            brancher: Brancher::default(),
        }
    }

    fn postsubmit(name: &str) -> Postsubmit {
        Postsubmit {
            base: base(name),
            run_if_changed: None,
            brancher: Brancher::default(),
        }
    }

    #[test]
    fn test_empty_is_valid() {
        assert!(validate_triggers("myorg/myrepo", &RepoTriggers::default()).is_ok());
    }

    #[test]
    fn test_distinct_jobs_are_valid() {
        let triggers = RepoTriggers {
            presubmits: vec![presubmit("lint"), presubmit("test")],
            postsubmits: vec![postsubmit("lint")],
        };
        assert!(validate_triggers("myorg/myrepo", &triggers).is_ok());
    }

    #[test]
    fn test_duplicate_presubmit_name() {
        let triggers = RepoTriggers {
            presubmits: vec![presubmit("lint"), presubmit("lint")],
            postsubmits: vec![],
        };
        let err = validate_triggers("myorg/myrepo", &triggers).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Duplicate presubmit 'lint' in repository myorg/myrepo"
        );
    }

    #[test]
    fn test_duplicate_postsubmit_name() {
        let triggers = RepoTriggers {
            presubmits: vec![],
            postsubmits: vec![postsubmit("release"), postsubmit("release")],
        };
        let err = validate_triggers("myorg/myrepo", &triggers).unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateJob {
                kind: JobKind::Postsubmit,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_context() {
        let mut second = presubmit("lint-again");
        second.base.context = "lint".to_string();
        let triggers = RepoTriggers {
            presubmits: vec![presubmit("lint"), second],
            postsubmits: vec![],
        };
        let err = validate_triggers("myorg/myrepo", &triggers).unwrap_err();
        assert!(err.to_string().contains("context lint"));
    }

    #[test]
    fn test_invalid_regexes() {
        let mut bad_trigger = presubmit("lint");
        bad_trigger.trigger = "(?m)^/test(".to_string();
        let triggers = RepoTriggers {
            presubmits: vec![bad_trigger],
            postsubmits: vec![],
        };
        assert!(matches!(
            validate_triggers("myorg/myrepo", &triggers).unwrap_err(),
            Error::InvalidJob { .. }
        ));

        let mut bad_branch = postsubmit("release");
        bad_branch.brancher.branches = vec!["release-[".to_string()];
        let triggers = RepoTriggers {
            presubmits: vec![],
            postsubmits: vec![bad_branch],
        };
        let err = validate_triggers("myorg/myrepo", &triggers).unwrap_err();
        assert!(err.to_string().contains("invalid branch pattern 'release-['"));

        let mut bad_changed = presubmit("docs");
        bad_changed.run_if_changed = Some("docs/(".to_string());
        let triggers = RepoTriggers {
            presubmits: vec![bad_changed],
            postsubmits: vec![],
        };
        assert!(validate_triggers("myorg/myrepo", &triggers).is_err());
    }

    #[test]
    fn test_step_without_image() {
        let mut job = presubmit("lint");
        job.base.pipeline.tasks[0].steps.push(Step::default());
        let triggers = RepoTriggers {
            presubmits: vec![job],
            postsubmits: vec![],
        };
        let err = validate_triggers("myorg/myrepo", &triggers).unwrap_err();
        assert!(err.to_string().contains("step 2 of task 'build' has no image"));
    }
}
