//! Trigger file discovery
//!
//! Finds every trigger file a repository declares under the trigger
//! directory and parses it. References inside the files are left for the
//! [`resolver`](crate::resolver).

use log::debug;

use crate::cache::FetchCache;
use crate::config::{self, TriggerFile};
use crate::error::{Error, Result};
use crate::fetcher::ContentFetcher;
use crate::locator::{RepoCoordinate, SourceLocator};
use crate::settings::Settings;

/// A parsed trigger file together with where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSource {
    pub locator: SourceLocator,
    pub file: TriggerFile,
}

/// Repo-relative paths of every trigger file, in sorted order.
///
/// Trigger files live directly in the trigger directory or in one of its
/// immediate subdirectories. A missing directory yields no paths.
pub fn discover_trigger_files(
    fetcher: &dyn ContentFetcher,
    settings: &Settings,
    coordinate: &RepoCoordinate,
) -> Result<Vec<String>> {
    let trigger_dir = settings.trigger_dir.trim_matches('/');
    let Some(entries) = fetcher.list_directory(coordinate, trigger_dir)? else {
        debug!("{} has no {} directory", coordinate, trigger_dir);
        return Ok(Vec::new());
    };

    let mut paths = Vec::new();
    for entry in entries {
        if !entry.is_dir() {
            if settings.is_trigger_file(&entry.name) {
                paths.push(entry.path);
            } else {
                debug!("Skipping {} in {}", entry.path, coordinate);
            }
            continue;
        }

        let children = fetcher
            .list_directory(coordinate, &entry.path)?
            .unwrap_or_default();
        for child in children {
            if !child.is_dir() && settings.is_trigger_file(&child.name) {
                paths.push(child.path);
            }
        }
    }

    paths.sort();
    Ok(paths)
}

/// Read and parse every trigger file of a repository.
pub fn load_raw_triggers(
    fetcher: &dyn ContentFetcher,
    fetch_cache: &FetchCache,
    settings: &Settings,
    coordinate: &RepoCoordinate,
) -> Result<Vec<TriggerSource>> {
    let mut sources = Vec::new();
    for path in discover_trigger_files(fetcher, settings, coordinate)? {
        let locator = coordinate.locator(&path)?;
        let bytes = fetch_cache.get_or_fetch(&locator, || {
            debug!("Fetching trigger file {}", locator);
            fetcher
                .get_file(coordinate, &path)?
                .ok_or_else(|| Error::Fetch {
                    locator: locator.to_string(),
                    message: "listed trigger file disappeared".to_string(),
                })
        })?;
        let file = config::parse_trigger_file(&bytes, &locator)?;
        sources.push(TriggerSource { locator, file });
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::MemoryFetcher;
    use crate::filesystem::MemoryFS;

    const JOB: &str = "presubmits:\n  - name: lint\n    source: lint.yaml\n";

    fn coordinate() -> RepoCoordinate {
        RepoCoordinate::new("myorg", "myrepo", "master")
    }

    fn fetcher(fs: MemoryFS) -> MemoryFetcher {
        MemoryFetcher::new().with_repo("myorg", "myrepo", "master", fs)
    }

    #[test]
    fn test_discover_top_level_and_subdirectories() {
        let fs = MemoryFS::new()
            .with_file(".lighthouse/triggers.yaml", JOB)
            .unwrap()
            .with_file(".lighthouse/jenkins-x/triggers.yaml", JOB)
            .unwrap()
            .with_file(".lighthouse/jenkins-x/lint.yaml", "tasks: []")
            .unwrap()
            .with_file(".lighthouse/other/triggers.yml", JOB)
            .unwrap()
            .with_file(".lighthouse/other/deep/triggers.yaml", JOB)
            .unwrap()
            .with_file("triggers.yaml", JOB)
            .unwrap();

        let paths = discover_trigger_files(&fetcher(fs), &Settings::default(), &coordinate())
            .unwrap();
        assert_eq!(
            paths,
            vec![
                ".lighthouse/jenkins-x/triggers.yaml",
                ".lighthouse/other/triggers.yml",
                ".lighthouse/triggers.yaml",
            ]
        );
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let fs = MemoryFS::new().with_file("README.md", "# hi").unwrap();
        let cache = FetchCache::new();
        let sources =
            load_raw_triggers(&fetcher(fs), &cache, &Settings::default(), &coordinate()).unwrap();
        assert!(sources.is_empty());
    }

    #[test]
    fn test_load_populates_fetch_cache() {
        let fs = MemoryFS::new()
            .with_file(".lighthouse/jenkins-x/triggers.yaml", JOB)
            .unwrap();
        let fetcher = fetcher(fs);
        let cache = FetchCache::new();

        let sources = load_raw_triggers(&fetcher, &cache, &Settings::default(), &coordinate())
            .unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].file.presubmits[0].name, "lint");
        assert!(cache.contains(&sources[0].locator).unwrap());

        load_raw_triggers(&fetcher, &cache, &Settings::default(), &coordinate()).unwrap();
        assert_eq!(
            fetcher.fetch_count("myorg/myrepo/.lighthouse/jenkins-x/triggers.yaml@master"),
            1
        );
    }

    #[test]
    fn test_custom_trigger_dir_and_names() {
        let fs = MemoryFS::new()
            .with_file(".ci/build-triggers.yaml", JOB)
            .unwrap()
            .with_file(".lighthouse/triggers.yaml", JOB)
            .unwrap();
        let settings = Settings {
            trigger_dir: ".ci/".to_string(),
            trigger_file_names: vec!["*-triggers.yaml".to_string()],
            ..Settings::default()
        };
        let paths = discover_trigger_files(&fetcher(fs), &settings, &coordinate()).unwrap();
        assert_eq!(paths, vec![".ci/build-triggers.yaml"]);
    }

    #[test]
    fn test_invalid_file_fails_whole_load() {
        let fs = MemoryFS::new()
            .with_file(".lighthouse/a/triggers.yaml", JOB)
            .unwrap()
            .with_file(".lighthouse/b/triggers.yaml", "presubmits: {not: a list}\n")
            .unwrap();
        let err = load_raw_triggers(
            &fetcher(fs),
            &FetchCache::new(),
            &Settings::default(),
            &coordinate(),
        )
        .unwrap_err();
        match err {
            Error::ConfigParse { file, .. } => {
                assert_eq!(file, "myorg/myrepo/.lighthouse/b/triggers.yaml@master")
            }
            other => panic!("expected parse failure, got {:?}", other),
        }
    }
}
