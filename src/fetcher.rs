//! # Content Fetcher Interface
//!
//! The resolver never talks to a version-control host directly. It goes
//! through the [`ContentFetcher`] trait, which exposes exactly the three
//! capabilities the engine needs:
//!
//! - **`get_file`**: read one file of a repository at a ref.
//! - **`list_directory`**: list the immediate children of a directory.
//! - **`get_url`**: HTTP GET an absolute URL.
//!
//! Absence is reported as `Ok(None)` so that callers can distinguish "no such
//! file" (often fine, e.g. an empty trigger directory) from a transport
//! failure.
//!
//! Two implementations ship with the crate:
//!
//! - **`MemoryFetcher`**: repositories held as in-memory trees plus canned URL
//!   responses. It counts every fetch, which makes caching behaviour
//!   observable in tests.
//! - **`DirectoryFetcher`**: serves `<root>/<owner>/<repo>/<path>` from disk
//!   and delegates URLs to an [`HttpClient`]. The CLI uses it against a
//!   directory of checkouts.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use log::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::filesystem::MemoryFS;
use crate::http::HttpClient;
use crate::locator::{is_valid_name, RepoCoordinate};

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Base name of the entry
    pub name: String,
    /// Repo-relative path of the entry
    pub path: String,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// Trait for retrieving repository content - allows mocking in tests
pub trait ContentFetcher: Send + Sync {
    /// Read a repo-relative file at the coordinate's ref.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    fn get_file(&self, coordinate: &RepoCoordinate, path: &str) -> Result<Option<Vec<u8>>>;

    /// List the immediate children of a repo-relative directory.
    ///
    /// Returns `Ok(None)` when the directory does not exist.
    fn list_directory(
        &self,
        coordinate: &RepoCoordinate,
        path: &str,
    ) -> Result<Option<Vec<DirEntry>>>;

    /// Retrieve an absolute URL. Non-2xx responses are errors.
    fn get_url(&self, url: &Url) -> Result<Vec<u8>>;
}

/// Canned response for a URL served by [`MemoryFetcher`]
#[derive(Debug, Clone)]
enum UrlResponse {
    Body(Vec<u8>),
    Status(u16),
}

/// In-memory fetcher for tests and embedding
///
/// Trees are registered per coordinate. A request for a ref with no
/// registered tree falls back to the tree registered under `HEAD`.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    repos: RwLock<HashMap<RepoCoordinate, MemoryFS>>,
    urls: RwLock<HashMap<String, UrlResponse>>,
    fetches: Mutex<HashMap<String, usize>>,
    total_fetches: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a repository tree.
    pub fn with_repo(self, owner: &str, repo: &str, r#ref: &str, fs: MemoryFS) -> Self {
        self.insert_repo(RepoCoordinate::new(owner, repo, r#ref), fs);
        self
    }

    /// Register a URL answering 200 with `body`.
    pub fn with_url(self, url: &str, body: &str) -> Self {
        self.set_url(url, body);
        self
    }

    /// Register a URL answering with a non-success `status`.
    pub fn with_url_status(self, url: &str, status: u16) -> Self {
        if let Ok(mut urls) = self.urls.write() {
            urls.insert(url.to_string(), UrlResponse::Status(status));
        }
        self
    }

    /// Replace or add a repository tree after construction.
    pub fn insert_repo(&self, coordinate: RepoCoordinate, fs: MemoryFS) {
        if let Ok(mut repos) = self.repos.write() {
            repos.insert(coordinate, fs);
        }
    }

    /// Replace or add a URL body after construction.
    pub fn set_url(&self, url: &str, body: &str) {
        if let Ok(mut urls) = self.urls.write() {
            urls.insert(url.to_string(), UrlResponse::Body(body.as_bytes().to_vec()));
        }
    }

    /// How many times the file or URL identified by `key` was fetched.
    ///
    /// Repository files are keyed as `owner/repo/path@ref`, URLs by their text.
    pub fn fetch_count(&self, key: &str) -> usize {
        self.fetches
            .lock()
            .map(|fetches| fetches.get(key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Total number of `get_file` and `get_url` calls served.
    pub fn total_fetches(&self) -> usize {
        self.total_fetches.load(Ordering::SeqCst)
    }

    fn record(&self, key: String) -> Result<()> {
        self.total_fetches.fetch_add(1, Ordering::SeqCst);
        let mut fetches = self.fetches.lock().map_err(|_| Error::LockPoisoned {
            context: "memory fetcher counters".to_string(),
        })?;
        *fetches.entry(key).or_insert(0) += 1;
        Ok(())
    }

    fn with_tree<T>(
        &self,
        coordinate: &RepoCoordinate,
        f: impl FnOnce(Option<&MemoryFS>) -> T,
    ) -> Result<T> {
        let repos = self.repos.read().map_err(|_| Error::LockPoisoned {
            context: "memory fetcher repositories".to_string(),
        })?;
        let tree = repos.get(coordinate).or_else(|| {
            repos.get(&RepoCoordinate::new(
                &coordinate.owner,
                &coordinate.repo,
                "HEAD",
            ))
        });
        Ok(f(tree))
    }
}

impl ContentFetcher for MemoryFetcher {
    fn get_file(&self, coordinate: &RepoCoordinate, path: &str) -> Result<Option<Vec<u8>>> {
        self.record(format!(
            "{}/{}/{}@{}",
            coordinate.owner, coordinate.repo, path, coordinate.r#ref
        ))?;
        self.with_tree(coordinate, |tree| {
            tree.and_then(|fs| fs.get_file(path)).map(<[u8]>::to_vec)
        })
    }

    fn list_directory(
        &self,
        coordinate: &RepoCoordinate,
        path: &str,
    ) -> Result<Option<Vec<DirEntry>>> {
        self.with_tree(coordinate, |tree| tree.and_then(|fs| fs.list_dir(path)))
    }

    fn get_url(&self, url: &Url) -> Result<Vec<u8>> {
        self.record(url.to_string())?;
        let urls = self.urls.read().map_err(|_| Error::LockPoisoned {
            context: "memory fetcher urls".to_string(),
        })?;
        match urls.get(url.as_str()) {
            Some(UrlResponse::Body(body)) => Ok(body.clone()),
            Some(UrlResponse::Status(status)) => Err(Error::HttpStatus {
                url: url.to_string(),
                status: *status,
            }),
            None => Err(Error::HttpStatus {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Fetcher serving checkouts laid out as `<root>/<owner>/<repo>/...`
///
/// The ref is not used to select content: each directory holds whichever
/// revision was checked out.
pub struct DirectoryFetcher {
    root: PathBuf,
    http: HttpClient,
}

impl DirectoryFetcher {
    pub fn new(root: PathBuf, http: HttpClient) -> Self {
        Self { root, http }
    }

    /// Path on disk for `path` in `coordinate`'s checkout. Never leaves the
    /// checkout.
    fn repo_path(&self, coordinate: &RepoCoordinate, path: &str) -> Result<PathBuf> {
        let outside = || Error::InvalidReference {
            reference: format!("{}/{}", coordinate.full_name(), path),
            message: format!("outside the checkout root {}", self.root.display()),
        };
        if !is_valid_name(&coordinate.owner) || !is_valid_name(&coordinate.repo) {
            return Err(outside());
        }
        let mut full = self.root.join(&coordinate.owner).join(&coordinate.repo);
        for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if segment == ".." || segment.contains('\\') {
                return Err(outside());
            }
            full.push(segment);
        }
        Ok(full)
    }
}

impl ContentFetcher for DirectoryFetcher {
    fn get_file(&self, coordinate: &RepoCoordinate, path: &str) -> Result<Option<Vec<u8>>> {
        let full = self.repo_path(coordinate, path)?;
        debug!("Reading {} for {}", full.display(), coordinate);
        match fs::read(&full) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn list_directory(
        &self,
        coordinate: &RepoCoordinate,
        path: &str,
    ) -> Result<Option<Vec<DirEntry>>> {
        let full = self.repo_path(coordinate, path)?;
        let read_dir = match fs::read_dir(&full) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };

        let prefix = path.trim_matches('/');
        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name == ".git" {
                continue;
            }
            let kind = if entry.file_type()?.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };
            entries.push(DirEntry { name, path, kind });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(Some(entries))
    }

    fn get_url(&self, url: &Url) -> Result<Vec<u8>> {
        self.http.get(url)
    }
}
