//! # In-Repository Trigger Configuration
//!
//! This library resolves and merges continuous-integration trigger
//! configuration that repositories declare in their own trees. It is used by
//! the `inrepo-triggers` command-line tool but is designed to be embedded in
//! any control plane that needs to know which presubmit and postsubmit jobs a
//! repository wants.
//!
//! ## Quick Example
//!
//! ```
//! use inrepo_triggers::cache::{FetchCache, ResolverCache};
//! use inrepo_triggers::fetcher::MemoryFetcher;
//! use inrepo_triggers::filesystem::MemoryFS;
//! use inrepo_triggers::merger::{merge_triggers, GlobalConfig, PluginConfig};
//!
//! let repo = MemoryFS::new()
//!     .with_file(
//!         ".lighthouse/jenkins-x/triggers.yaml",
//!         "presubmits:\n  - name: lint\n    source: lint.yaml\n",
//!     )
//!     .unwrap()
//!     .with_file(
//!         ".lighthouse/jenkins-x/lint.yaml",
//!         "tasks:\n  - name: lint\n    steps:\n      - image: rust:1.80\n",
//!     )
//!     .unwrap();
//! let fetcher = MemoryFetcher::new().with_repo("myorg", "myrepo", "HEAD", repo);
//!
//! let global = GlobalConfig::new();
//! let plugins = PluginConfig::default();
//! let changed = merge_triggers(
//!     &global,
//!     &plugins,
//!     &fetcher,
//!     &FetchCache::new(),
//!     &ResolverCache::new(),
//!     "myorg",
//!     "myrepo",
//!     "",
//! )
//! .unwrap();
//!
//! assert!(changed);
//! assert_eq!(global.presubmits("myorg/myrepo").unwrap().len(), 1);
//! ```
//!
//! ## Core Concepts
//!
//! - **Locators (`locator`)**: A canonical identity for every piece of
//!   declared content, either a path in a repository at a ref or an absolute
//!   URL. References are resolved relative to the file that contains them.
//! - **Fetching (`fetcher`, `http`, `filesystem`)**: The [`fetcher::ContentFetcher`]
//!   trait is the only way content enters the library. In-memory and on-disk
//!   implementations are provided.
//! - **Declarations (`config`, `job`)**: The on-disk trigger file format and
//!   the fully resolved job types handed to callers.
//! - **Caching (`cache`)**: Raw bytes and resolved fragments are cached per
//!   locator and shared between concurrent loads.
//!
//! ## Execution Flow
//!
//! 1.  **Discovery** (`loader`): find and parse every trigger file under the
//!     repository's trigger directory.
//! 2.  **Resolution** (`resolver`): follow every `source:` and `uses:`
//!     reference, rejecting cycles.
//! 3.  **Validation** (`validate`): reject duplicate jobs and bad patterns.
//! 4.  **Merge** (`merger`): atomically replace the repository's entry in the
//!     shared configuration and report whether anything changed.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod filesystem;
pub mod http;
pub mod job;
pub mod loader;
pub mod locator;
pub mod merger;
pub mod output;
pub mod resolver;
pub mod settings;
pub mod validate;

mod locator_proptest;
