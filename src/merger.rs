//! # Loading and merging trigger configuration
//!
//! [`TriggerLoader::load`] runs the full pipeline for one repository
//! (discover, resolve, validate) without touching shared state.
//! [`TriggerLoader::merge`] additionally swaps the result into the shared
//! [`GlobalConfig`] and keeps [`PluginConfig`] in step with it.
//!
//! A merge either replaces a repository's whole entry or changes nothing:
//! every failure happens before the first write.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::cache::{FetchCache, ResolverCache};
use crate::config::RawJobBase;
use crate::error::{Error, Result};
use crate::fetcher::ContentFetcher;
use crate::job::{Brancher, JobBase, JobKind, Postsubmit, Presubmit, RepoTriggers};
use crate::loader;
use crate::locator::RepoCoordinate;
use crate::resolver::Resolver;
use crate::settings::Settings;
use crate::validate::validate_triggers;

/// Ref used when the caller does not name one
pub const DEFAULT_REF: &str = "HEAD";

fn read<'a, T>(lock: &'a RwLock<T>, context: &str) -> Result<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| Error::LockPoisoned {
        context: context.to_string(),
    })
}

fn write<'a, T>(lock: &'a RwLock<T>, context: &str) -> Result<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| Error::LockPoisoned {
        context: context.to_string(),
    })
}

/// Process-wide trigger configuration, keyed by `owner/repo`
///
/// Each repository's jobs are stored as one `Arc`, so readers always see a
/// repository's presubmits and postsubmits from the same merge.
#[derive(Debug, Default)]
pub struct GlobalConfig {
    repos: RwLock<HashMap<String, Arc<RepoTriggers>>>,
}

impl GlobalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one repository's jobs
    pub fn repo(&self, full_name: &str) -> Result<Option<Arc<RepoTriggers>>> {
        Ok(read(&self.repos, "global config")?.get(full_name).cloned())
    }

    pub fn presubmits(&self, full_name: &str) -> Result<Vec<Presubmit>> {
        Ok(self
            .repo(full_name)?
            .map(|triggers| triggers.presubmits.clone())
            .unwrap_or_default())
    }

    pub fn postsubmits(&self, full_name: &str) -> Result<Vec<Postsubmit>> {
        Ok(self
            .repo(full_name)?
            .map(|triggers| triggers.postsubmits.clone())
            .unwrap_or_default())
    }

    /// Full names of every repository with at least one job, sorted
    pub fn repos(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = read(&self.repos, "global config")?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(read(&self.repos, "global config")?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Replace a repository's entry in a single write.
    ///
    /// An empty trigger set removes the entry. Returns whether the stored
    /// configuration changed.
    pub fn replace_repo(&self, full_name: &str, triggers: RepoTriggers) -> Result<bool> {
        let mut repos = write(&self.repos, "global config")?;
        if triggers.is_empty() {
            return Ok(repos.remove(full_name).is_some());
        }
        if repos.get(full_name).map(|current| **current == triggers) == Some(true) {
            return Ok(false);
        }
        repos.insert(full_name.to_string(), Arc::new(triggers));
        Ok(true)
    }
}

/// The plugin configuration document
///
/// Only `plugins` (plugin names enabled per `owner` or `owner/repo`) is
/// interpreted; every other key is carried through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginSettings {
    #[serde(default)]
    pub plugins: BTreeMap<String, Vec<String>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl PluginSettings {
    fn enable(&mut self, full_name: &str, plugin: &str) -> bool {
        if self.is_enabled(full_name, plugin) {
            return false;
        }
        self.plugins
            .entry(full_name.to_string())
            .or_default()
            .push(plugin.to_string());
        true
    }

    /// Whether `plugin` is enabled for `full_name`, directly or via its owner.
    pub fn is_enabled(&self, full_name: &str, plugin: &str) -> bool {
        let owner = full_name.split('/').next().unwrap_or(full_name);
        [full_name, owner].iter().any(|key| {
            self.plugins
                .get(*key)
                .is_some_and(|enabled| enabled.iter().any(|p| p == plugin))
        })
    }
}

/// Shared, concurrently readable plugin configuration
#[derive(Debug, Default)]
pub struct PluginConfig {
    settings: RwLock<PluginSettings>,
}

impl PluginConfig {
    pub fn new(settings: PluginSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    /// Parse a YAML plugin configuration document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Option<PluginSettings> = serde_yaml::from_str(content)?;
        Ok(Self::new(settings.unwrap_or_default()))
    }

    pub fn snapshot(&self) -> Result<PluginSettings> {
        Ok(read(&self.settings, "plugin config")?.clone())
    }

    pub fn is_enabled(&self, full_name: &str, plugin: &str) -> Result<bool> {
        Ok(read(&self.settings, "plugin config")?.is_enabled(full_name, plugin))
    }

    /// Enable `plugin` for `full_name` unless it is already enabled for the
    /// repository or its owner. Returns whether anything was added.
    pub fn ensure_plugin(&self, full_name: &str, plugin: &str) -> Result<bool> {
        let mut settings = write(&self.settings, "plugin config")?;
        Ok(settings.enable(full_name, plugin))
    }
}

/// Bundles a fetcher, the shared caches and settings for repeated loads
pub struct TriggerLoader<'a> {
    fetcher: &'a dyn ContentFetcher,
    fetch_cache: &'a FetchCache,
    resolver_cache: &'a ResolverCache,
    settings: Settings,
}

impl<'a> TriggerLoader<'a> {
    pub fn new(
        fetcher: &'a dyn ContentFetcher,
        fetch_cache: &'a FetchCache,
        resolver_cache: &'a ResolverCache,
    ) -> Self {
        Self {
            fetcher,
            fetch_cache,
            resolver_cache,
            settings: Settings::default(),
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Load, resolve and validate one repository's jobs.
    ///
    /// An empty `r#ref` means [`DEFAULT_REF`].
    pub fn load(&self, owner: &str, repo: &str, r#ref: &str) -> Result<RepoTriggers> {
        let r#ref = if r#ref.is_empty() { DEFAULT_REF } else { r#ref };
        let coordinate = RepoCoordinate::checked(owner, repo, r#ref)?;
        let full_name = coordinate.full_name();

        let sources =
            loader::load_raw_triggers(self.fetcher, self.fetch_cache, &self.settings, &coordinate)?;

        let mut resolver = Resolver::new(
            self.fetcher,
            self.fetch_cache,
            self.resolver_cache,
            &self.settings,
        );
        let mut triggers = RepoTriggers::default();
        for source in &sources {
            for (kind, raw) in source.file.jobs() {
                let base = resolver.resolve_job(raw, &source.locator)?;
                match kind {
                    JobKind::Presubmit => triggers.presubmits.push(presubmit(raw, base)),
                    JobKind::Postsubmit => triggers.postsubmits.push(postsubmit(raw, base)),
                }
            }
        }

        validate_triggers(&full_name, &triggers)?;
        debug!(
            "Loaded {} presubmits and {} postsubmits from {}",
            triggers.presubmits.len(),
            triggers.postsubmits.len(),
            coordinate
        );
        Ok(triggers)
    }

    /// Load one repository and merge it into the shared configuration.
    ///
    /// Returns whether the global or plugin configuration changed. On error
    /// neither is modified.
    pub fn merge(
        &self,
        global: &GlobalConfig,
        plugins: &PluginConfig,
        owner: &str,
        repo: &str,
        r#ref: &str,
    ) -> Result<bool> {
        let triggers = self.load(owner, repo, r#ref)?;
        let full_name = RepoCoordinate::new(owner, repo, r#ref).full_name();
        let has_jobs = !triggers.is_empty();
        let (presubmits, postsubmits) = (triggers.presubmits.len(), triggers.postsubmits.len());

        // Plugin lock first, so a poisoned lock fails before the global swap.
        let mut plugin_settings = if has_jobs {
            Some(write(&plugins.settings, "plugin config")?)
        } else {
            None
        };
        let mut changed = global.replace_repo(&full_name, triggers)?;
        if let Some(settings) = plugin_settings.as_mut() {
            changed |= settings.enable(&full_name, &self.settings.trigger_plugin);
        }
        drop(plugin_settings);

        info!(
            "Merged {}: {} presubmits, {} postsubmits, changed={}",
            full_name, presubmits, postsubmits, changed
        );
        Ok(changed)
    }
}

fn brancher(raw: &RawJobBase) -> Brancher {
    Brancher {
        branches: raw.branches.clone(),
        skip_branches: raw.skip_branches.clone(),
    }
}

fn presubmit(raw: &RawJobBase, base: JobBase) -> Presubmit {
    let trigger = raw
        .trigger
        .clone()
        .unwrap_or_else(|| Presubmit::default_trigger(&base.name));
    let rerun_command = raw
        .rerun_command
        .clone()
        .unwrap_or_else(|| Presubmit::default_rerun_command(&base.name));
    Presubmit {
        base,
        always_run: raw.always_run,
        optional: raw.optional,
        trigger,
        rerun_command,
        run_if_changed: raw.run_if_changed.clone(),
        brancher: brancher(raw),
    }
}

fn postsubmit(raw: &RawJobBase, base: JobBase) -> Postsubmit {
    Postsubmit {
        base,
        run_if_changed: raw.run_if_changed.clone(),
        brancher: brancher(raw),
    }
}

/// Load, resolve and validate one repository with default settings.
pub fn load_trigger_config(
    fetcher: &dyn ContentFetcher,
    fetch_cache: &FetchCache,
    resolver_cache: &ResolverCache,
    owner: &str,
    repo: &str,
    r#ref: &str,
) -> Result<RepoTriggers> {
    TriggerLoader::new(fetcher, fetch_cache, resolver_cache).load(owner, repo, r#ref)
}

/// Load one repository with default settings and merge it into `global`.
#[allow(clippy::too_many_arguments)]
pub fn merge_triggers(
    global: &GlobalConfig,
    plugins: &PluginConfig,
    fetcher: &dyn ContentFetcher,
    fetch_cache: &FetchCache,
    resolver_cache: &ResolverCache,
    owner: &str,
    repo: &str,
    r#ref: &str,
) -> Result<bool> {
    TriggerLoader::new(fetcher, fetch_cache, resolver_cache).merge(global, plugins, owner, repo, r#ref)
}
