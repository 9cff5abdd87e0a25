//! # Trigger Declaration Format
//!
//! This module defines the YAML documents a repository uses to declare its
//! jobs, and the functions that parse them. It deals only in *raw* content:
//! any task or step may still be a `uses:` reference to content living
//! elsewhere. The [`crate::resolver`] turns raw content into the concrete
//! types of [`crate::job`].
//!
//! ## Documents
//!
//! - **Trigger file** (`.lighthouse/*/triggers.yaml`): lists `presubmits` and
//!   `postsubmits`. Each job names its pipeline either inline (`pipeline:`)
//!   or through a reference (`source:`).
//!
//! - **Pipeline document**: `tasks`, each inline or `{ uses: <ref> }`.
//!
//! - **Task document**: `name`, `params`, `steps`, each step inline or
//!   `{ uses: <ref> }`.
//!
//! - **Step fragment**: either a single step or `{ steps: [...] }`. The steps
//!   are spliced in place of the referencing step.
//!
//! ```yaml
//! presubmits:
//!   - name: lint
//!     always_run: true
//!     source: lint.yaml
//!   - name: unit
//!     pipeline:
//!       tasks:
//!         - uses: jenkins-x/catalog/tasks/rust/test.yaml@v1
//! postsubmits:
//!   - name: release
//!     branches: ["main"]
//!     source: https://example.com/pipelines/release.yaml
//! ```

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::job::{JobKind, Step};
use crate::locator::SourceLocator;

/// A `{ uses: <reference> }` directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Uses {
    pub uses: String,
}

/// Content that is either written inline or loaded from elsewhere
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sourced<T> {
    /// Load the content from the referenced location.
    Reference(Uses),
    /// The content itself.
    Inline(T),
}

impl<T> Sourced<T> {
    pub fn reference(reference: &str) -> Self {
        Sourced::Reference(Uses {
            uses: reference.to_string(),
        })
    }
}

/// Task as written, steps possibly referenced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawTask {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub steps: Vec<Sourced<Step>>,
}

/// Pipeline as written, tasks possibly referenced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPipeline {
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub tasks: Vec<Sourced<RawTask>>,
}

/// Content of a step reference
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum StepFragment {
    Many { steps: Vec<Sourced<Step>> },
    One(Step),
}

/// One job as declared in a trigger file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawJobBase {
    pub name: String,
    pub context: Option<String>,
    pub always_run: bool,
    pub optional: bool,
    pub trigger: Option<String>,
    pub rerun_command: Option<String>,
    pub run_if_changed: Option<String>,
    pub branches: Vec<String>,
    pub skip_branches: Vec<String>,
    pub max_concurrency: Option<u32>,
    pub labels: BTreeMap<String, String>,
    /// Reference to a pipeline document
    pub source: Option<String>,
    /// Inline pipeline document
    pub pipeline: Option<RawPipeline>,
}

impl RawJobBase {
    /// The job's pipeline as a single inline-or-reference value.
    ///
    /// Only valid after [`parse_trigger_file`] has checked that exactly one
    /// of `source` and `pipeline` is set.
    pub fn pipeline_source(&self) -> Sourced<RawPipeline> {
        match (&self.source, &self.pipeline) {
            (Some(source), _) => Sourced::reference(source),
            (None, Some(pipeline)) => Sourced::Inline(pipeline.clone()),
            (None, None) => Sourced::Inline(RawPipeline::default()),
        }
    }
}

/// A parsed trigger file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerFile {
    pub presubmits: Vec<RawJobBase>,
    pub postsubmits: Vec<RawJobBase>,
}

impl TriggerFile {
    /// All jobs tagged with their kind, presubmits first
    pub fn jobs(&self) -> impl Iterator<Item = (JobKind, &RawJobBase)> {
        self.presubmits
            .iter()
            .map(|job| (JobKind::Presubmit, job))
            .chain(self.postsubmits.iter().map(|job| (JobKind::Postsubmit, job)))
    }

    pub fn is_empty(&self) -> bool {
        self.presubmits.is_empty() && self.postsubmits.is_empty()
    }
}

fn parse_error(at: &SourceLocator, message: String, hint: Option<&str>) -> Error {
    Error::ConfigParse {
        file: at.to_string(),
        message,
        hint: hint.map(str::to_string),
    }
}

/// Decode `bytes` as UTF-8 YAML. `Ok(None)` for an empty document.
fn parse_document<T: DeserializeOwned>(bytes: &[u8], at: &SourceLocator) -> Result<Option<T>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| parse_error(at, "content is not valid UTF-8".to_string(), None))?;

    let value: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|e| parse_error(at, e.to_string(), None))?;
    if value.is_null() {
        return Ok(None);
    }

    serde_yaml::from_str(text)
        .map(Some)
        .map_err(|e| parse_error(at, e.to_string(), None))
}

fn require_document<T: DeserializeOwned>(
    bytes: &[u8],
    at: &SourceLocator,
    what: &str,
) -> Result<T> {
    parse_document(bytes, at)?
        .ok_or_else(|| parse_error(at, format!("expected a {} but the document is empty", what), None))
}

/// Parse a trigger file and check each job's required fields.
///
/// An empty file declares no jobs.
pub fn parse_trigger_file(bytes: &[u8], at: &SourceLocator) -> Result<TriggerFile> {
    let file: TriggerFile = parse_document(bytes, at)?.unwrap_or_default();

    for (kind, job) in file.jobs() {
        if job.name.trim().is_empty() {
            return Err(parse_error(
                at,
                format!("a {} is missing its name", kind),
                Some("Every job needs a non-empty 'name:'"),
            ));
        }
        match (&job.source, &job.pipeline) {
            (Some(_), Some(_)) => {
                return Err(parse_error(
                    at,
                    format!("{} '{}' declares both source and pipeline", kind, job.name),
                    Some("Keep exactly one of 'source:' or 'pipeline:'"),
                ))
            }
            (None, None) => {
                return Err(parse_error(
                    at,
                    format!("{} '{}' declares neither source nor pipeline", kind, job.name),
                    Some("Add 'source: <file>' or an inline 'pipeline:'"),
                ))
            }
            (Some(source), None) if source.trim().is_empty() => {
                return Err(parse_error(
                    at,
                    format!("{} '{}' has an empty source", kind, job.name),
                    None,
                ))
            }
            _ => {}
        }
    }

    Ok(file)
}

/// Parse a pipeline document.
pub fn parse_pipeline(bytes: &[u8], at: &SourceLocator) -> Result<RawPipeline> {
    require_document(bytes, at, "pipeline")
}

/// Parse a task document.
pub fn parse_task(bytes: &[u8], at: &SourceLocator) -> Result<RawTask> {
    require_document(bytes, at, "task")
}

/// Parse a step fragment into the steps it contributes.
pub fn parse_step_fragment(bytes: &[u8], at: &SourceLocator) -> Result<Vec<Sourced<Step>>> {
    match require_document::<StepFragment>(bytes, at, "step")? {
        StepFragment::Many { steps } => Ok(steps),
        StepFragment::One(step) => Ok(vec![Sourced::Inline(step)]),
    }
}
