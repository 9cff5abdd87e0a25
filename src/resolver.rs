//! # Reference Resolution
//!
//! Turns raw job declarations into fully materialised pipelines by following
//! every `source:` and `uses:` reference.
//!
//! ## Process
//!
//! For each reference the resolver:
//!
//! 1.  Resolves the reference string against the locator of the file that
//!     contains it, producing a canonical [`SourceLocator`].
//! 2.  Rejects the locator if it already appears on the current resolution
//!     chain (a cycle), or if the chain is deeper than the configured limit.
//! 3.  Claims the locator in the [`ResolverCache`]. A finished entry is reused
//!     without any fetch. A marker held by another pass means that pass is
//!     resolving the same content concurrently; this pass then resolves it
//!     privately instead of waiting, so two passes can never deadlock on each
//!     other.
//! 4.  Reads the bytes through the [`FetchCache`], fetching on a miss.
//! 5.  Parses the fragment, recursively resolves the references it
//!     introduces, and publishes the result in the resolver cache.
//!
//! Any failure abandons the locator's marker and fails the whole job; no
//! partial result escapes.

use std::sync::Arc;

use log::{debug, warn};

use crate::cache::{Claim, FetchCache, Fragment, PassId, ResolverCache};
use crate::config::{self, RawJobBase, RawPipeline, RawTask, Sourced};
use crate::error::{Error, Result};
use crate::fetcher::ContentFetcher;
use crate::job::{JobBase, PipelineSpec, Step, Task};
use crate::locator::SourceLocator;
use crate::settings::Settings;

/// Resolves references for one top-level pass
pub struct Resolver<'a> {
    fetcher: &'a dyn ContentFetcher,
    fetch_cache: &'a FetchCache,
    resolver_cache: &'a ResolverCache,
    settings: &'a Settings,
    pass: PassId,
    /// Locators currently being resolved, outermost first
    chain: Vec<SourceLocator>,
}

impl<'a> Resolver<'a> {
    /// Start a new pass over the shared caches.
    pub fn new(
        fetcher: &'a dyn ContentFetcher,
        fetch_cache: &'a FetchCache,
        resolver_cache: &'a ResolverCache,
        settings: &'a Settings,
    ) -> Self {
        Self {
            fetcher,
            fetch_cache,
            resolver_cache,
            settings,
            pass: PassId::next(),
            chain: Vec::new(),
        }
    }

    /// Resolve a job declared in the trigger file at `file`.
    pub fn resolve_job(&mut self, raw: &RawJobBase, file: &SourceLocator) -> Result<JobBase> {
        debug!("Resolving job '{}' from {}", raw.name, file);
        let pipeline = self.resolve_pipeline_source(&raw.pipeline_source(), file)?;
        Ok(JobBase {
            name: raw.name.clone(),
            context: raw.context.clone().unwrap_or_else(|| raw.name.clone()),
            labels: raw.labels.clone(),
            max_concurrency: raw.max_concurrency,
            pipeline,
            source_file: file.to_string(),
        })
    }

    /// Resolve a pipeline that is either inline or a reference from `parent`.
    pub fn resolve_pipeline_source(
        &mut self,
        source: &Sourced<RawPipeline>,
        parent: &SourceLocator,
    ) -> Result<PipelineSpec> {
        match source {
            Sourced::Inline(pipeline) => self.resolve_raw_pipeline(pipeline, parent),
            Sourced::Reference(uses) => {
                let locator = parent.resolve_reference(&uses.uses)?;
                self.resolve_pipeline_at(&locator)
            }
        }
    }

    /// Resolve the pipeline document stored at `locator`.
    pub fn resolve_pipeline_at(&mut self, locator: &SourceLocator) -> Result<PipelineSpec> {
        let fragment = self.resolve_at(locator, |this, bytes| {
            let raw = config::parse_pipeline(bytes, locator)?;
            Ok(Fragment::Pipeline(this.resolve_raw_pipeline(&raw, locator)?))
        })?;
        match &*fragment {
            Fragment::Pipeline(pipeline) => Ok(pipeline.clone()),
            other => Err(kind_mismatch(locator, other, "pipeline")),
        }
    }

    /// Resolve the task document stored at `locator`.
    pub fn resolve_task_at(&mut self, locator: &SourceLocator) -> Result<Task> {
        let fragment = self.resolve_at(locator, |this, bytes| {
            let raw = config::parse_task(bytes, locator)?;
            Ok(Fragment::Task(this.resolve_raw_task(&raw, locator)?))
        })?;
        match &*fragment {
            Fragment::Task(task) => Ok(task.clone()),
            other => Err(kind_mismatch(locator, other, "task")),
        }
    }

    /// Resolve the step fragment stored at `locator`.
    pub fn resolve_steps_at(&mut self, locator: &SourceLocator) -> Result<Vec<Step>> {
        let fragment = self.resolve_at(locator, |this, bytes| {
            let raw = config::parse_step_fragment(bytes, locator)?;
            Ok(Fragment::Steps(this.resolve_raw_steps(&raw, locator)?))
        })?;
        match &*fragment {
            Fragment::Steps(steps) => Ok(steps.clone()),
            other => Err(kind_mismatch(locator, other, "step list")),
        }
    }

    fn resolve_raw_pipeline(
        &mut self,
        raw: &RawPipeline,
        at: &SourceLocator,
    ) -> Result<PipelineSpec> {
        let mut tasks = Vec::with_capacity(raw.tasks.len());
        for task in &raw.tasks {
            tasks.push(match task {
                Sourced::Inline(task) => self.resolve_raw_task(task, at)?,
                Sourced::Reference(uses) => {
                    let locator = at.resolve_reference(&uses.uses)?;
                    self.resolve_task_at(&locator)?
                }
            });
        }
        Ok(PipelineSpec {
            params: raw.params.clone(),
            tasks,
        })
    }

    fn resolve_raw_task(&mut self, raw: &RawTask, at: &SourceLocator) -> Result<Task> {
        Ok(Task {
            name: raw.name.clone(),
            params: raw.params.clone(),
            steps: self.resolve_raw_steps(&raw.steps, at)?,
        })
    }

    fn resolve_raw_steps(&mut self, raw: &[Sourced<Step>], at: &SourceLocator) -> Result<Vec<Step>> {
        let mut steps = Vec::with_capacity(raw.len());
        for step in raw {
            match step {
                Sourced::Inline(step) => steps.push(step.clone()),
                Sourced::Reference(uses) => {
                    let locator = at.resolve_reference(&uses.uses)?;
                    steps.extend(self.resolve_steps_at(&locator)?);
                }
            }
        }
        Ok(steps)
    }

    /// Shared cache/cycle handling around building the fragment at `locator`.
    fn resolve_at<F>(&mut self, locator: &SourceLocator, build: F) -> Result<Arc<Fragment>>
    where
        F: FnOnce(&mut Self, &[u8]) -> Result<Fragment>,
    {
        if let Some(start) = self.chain.iter().position(|l| l == locator) {
            let mut cycle: Vec<String> = self.chain[start..].iter().map(|l| l.to_string()).collect();
            cycle.push(locator.to_string());
            return Err(Error::CycleDetected {
                cycle: cycle.join(" -> "),
            });
        }
        if self.chain.len() >= self.settings.max_reference_depth {
            return Err(Error::DepthExceeded {
                locator: locator.to_string(),
                depth: self.settings.max_reference_depth,
            });
        }

        let publish = match self.resolver_cache.claim(locator, self.pass)? {
            Claim::Cached(fragment) => {
                debug!("Resolver cache hit for {}", locator);
                return Ok(fragment);
            }
            Claim::Owned => true,
            Claim::Busy => {
                warn!(
                    "{} is being resolved by another pass; resolving it privately",
                    locator
                );
                false
            }
        };

        self.chain.push(locator.clone());
        let result = self.fetch(locator).and_then(|bytes| build(self, &bytes));
        self.chain.pop();

        match result {
            Ok(fragment) if publish => self.resolver_cache.complete(locator, self.pass, fragment),
            Ok(fragment) => Ok(Arc::new(fragment)),
            Err(e) => {
                if publish {
                    self.resolver_cache.abandon(locator, self.pass)?;
                }
                Err(e)
            }
        }
    }

    fn fetch(&self, locator: &SourceLocator) -> Result<Arc<[u8]>> {
        self.fetch_cache.get_or_fetch(locator, || match locator {
            SourceLocator::Repo { coordinate, path } => self
                .fetcher
                .get_file(coordinate, path)?
                .ok_or_else(|| Error::Fetch {
                    locator: locator.to_string(),
                    message: "file not found".to_string(),
                }),
            SourceLocator::Url(url) => self.fetcher.get_url(url),
        })
    }
}

fn kind_mismatch(locator: &SourceLocator, found: &Fragment, expected: &str) -> Error {
    Error::ConfigParse {
        file: locator.to_string(),
        message: format!(
            "referenced as a {} but already resolved as a {}",
            expected,
            found.kind()
        ),
        hint: None,
    }
}

/// Load a pipeline from a single `source` reference outside any trigger file.
///
/// `base` anchors relative references; without it only absolute URLs and
/// `owner/repo/path@ref` references can be loaded.
pub fn load_pipeline_from_source(
    fetcher: &dyn ContentFetcher,
    fetch_cache: &FetchCache,
    resolver_cache: &ResolverCache,
    settings: &Settings,
    base: Option<&SourceLocator>,
    source: &str,
) -> Result<PipelineSpec> {
    let locator = match base {
        Some(base) => base.resolve_reference(source)?,
        None => SourceLocator::parse_absolute(source)?,
    };

    Resolver::new(fetcher, fetch_cache, resolver_cache, settings).resolve_pipeline_at(&locator)
}
