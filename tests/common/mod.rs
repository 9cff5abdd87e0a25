//! Shared test utilities for integration and E2E tests.
//!
//! This module provides fixture repositories, helper functions, and a
//! prelude to reduce duplication across test files.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_triggers("myorg/demo", triggers::SINGLE_INLINE);
//!     fixture.command("load").arg("myorg/demo").assert().success();
//! }
//! ```

use assert_fs::prelude::*;
use std::env;
use std::path::{Path, PathBuf};

use inrepo_triggers::fetcher::DirectoryFetcher;
use inrepo_triggers::http::HttpClient;
use inrepo_triggers::settings::Settings;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::{command_at, fixture_fetcher, fixtures_root, should_skip_network_tests, triggers};
    #[allow(unused_imports)]
    pub use super::TestFixture;
}

/// Trigger file snippets for tests that build repositories on the fly.
#[allow(dead_code)]
pub mod triggers {
    /// One presubmit with an inline pipeline.
    pub const SINGLE_INLINE: &str = r#"
presubmits:
  - name: lint
    pipeline:
      tasks:
        - name: lint
          steps:
            - image: rust:1.80
"#;

    /// One presubmit and one postsubmit loading their pipeline from files.
    pub const WITH_SOURCES: &str = r#"
presubmits:
  - name: pr
    source: pullrequest.yaml
postsubmits:
  - name: release
    source: release.yaml
"#;

    /// A job declaring both `source` and `pipeline`.
    pub const SOURCE_AND_PIPELINE: &str = r#"
presubmits:
  - name: confused
    source: pullrequest.yaml
    pipeline:
      tasks: []
"#;

    /// Invalid YAML for error testing.
    pub const INVALID_YAML: &str = "presubmits: [unclosed\n";

    /// A minimal pipeline document.
    pub const PIPELINE: &str = r#"
tasks:
  - name: build
    steps:
      - image: rust:1.80
"#;
}

/// Directory holding the checked-in fixture repositories.
pub fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/testdata/repos")
}

/// Fetcher serving the checked-in fixture repositories.
#[allow(dead_code)]
pub fn fixture_fetcher() -> DirectoryFetcher {
    let http = HttpClient::from_settings(&Settings::default()).expect("Failed to build HTTP client");
    DirectoryFetcher::new(fixtures_root(), http)
}

/// Check if network tests should be skipped.
///
/// Returns `true` if the `SKIP_NETWORK_TESTS` environment variable is set.
#[allow(dead_code)]
pub fn should_skip_network_tests() -> bool {
    env::var("SKIP_NETWORK_TESTS").is_ok()
}

/// A temporary directory of repository checkouts.
///
/// ```rust,ignore
/// let fixture = TestFixture::new()
///     .with_triggers("myorg/demo", triggers::WITH_SOURCES)
///     .with_file("myorg/demo", ".lighthouse/pullrequest.yaml", triggers::PIPELINE);
/// ```
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

#[allow(dead_code)]
impl TestFixture {
    /// Create a new test fixture with an empty checkout root.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add a file to the repository `full_name`.
    pub fn with_file(self, full_name: &str, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(full_name)
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Add `.lighthouse/triggers.yaml` to the repository `full_name`.
    pub fn with_triggers(self, full_name: &str, content: &str) -> Self {
        self.with_file(full_name, ".lighthouse/triggers.yaml", content)
    }

    /// Create an empty repository directory.
    pub fn with_repo(self, full_name: &str) -> Self {
        self.temp_dir
            .child(full_name)
            .create_dir_all()
            .expect("Failed to create repository directory");
        self
    }

    /// Get the checkout root.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Fetcher serving this fixture's repositories.
    pub fn fetcher(&self) -> DirectoryFetcher {
        let http =
            HttpClient::from_settings(&Settings::default()).expect("Failed to build HTTP client");
        DirectoryFetcher::new(self.path().to_path_buf(), http)
    }

    /// Create a CLI command running `subcommand` against this fixture.
    pub fn command(&self, subcommand: &str) -> assert_cmd::Command {
        command_at(self.path(), subcommand)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a CLI command running `subcommand` against the checkouts in `root`.
#[allow(dead_code)]
pub fn command_at(root: &Path, subcommand: &str) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("inrepo-triggers");
    cmd.env_remove("INREPO_TRIGGERS_CONFIG")
        .env_remove("INREPO_TRIGGERS_ROOT")
        .env_remove("INREPO_TRIGGERS_TRIGGER_DIR")
        .env_remove("INREPO_TRIGGERS_HTTP_TIMEOUT")
        .env_remove("RUST_LOG")
        // Keep a per-user settings file out of the run.
        .env("XDG_CONFIG_HOME", root.join(".no-config"))
        .arg("--color")
        .arg("never")
        .arg(subcommand)
        .arg("--root")
        .arg(root);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_writes_repository_files() {
        let fixture = TestFixture::new().with_triggers("myorg/demo", triggers::SINGLE_INLINE);
        assert!(fixture
            .path()
            .join("myorg/demo/.lighthouse/triggers.yaml")
            .exists());
    }

    #[test]
    fn test_fixtures_root_exists() {
        assert!(fixtures_root().join("myorg/loadtest").is_dir());
    }

    #[test]
    fn test_trigger_snippets_are_valid_yaml() {
        for snippet in [
            triggers::SINGLE_INLINE,
            triggers::WITH_SOURCES,
            triggers::SOURCE_AND_PIPELINE,
            triggers::PIPELINE,
        ] {
            serde_yaml::from_str::<serde_yaml::Value>(snippet).expect("Snippet should be valid YAML");
        }
        assert!(serde_yaml::from_str::<serde_yaml::Value>(triggers::INVALID_YAML).is_err());
    }
}
