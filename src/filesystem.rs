//! In-memory repository tree used by the in-memory fetcher

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::fetcher::{DirEntry, EntryKind};
use crate::locator::normalize_path;

/// In-memory snapshot of a repository tree at one ref
#[derive(Debug, Clone, Default)]
pub struct MemoryFS {
    /// Files stored as normalised path -> content
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryFS {
    /// Create a new empty filesystem
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update a file
    pub fn add_file_content(&mut self, path: &str, content: Vec<u8>) -> Result<()> {
        let normalized = normalize_path(path)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::Fetch {
                locator: path.to_string(),
                message: "not a valid file path".to_string(),
            })?;
        self.files.insert(normalized, content);
        Ok(())
    }

    /// Add a file with string content
    pub fn add_file_string(&mut self, path: &str, content: &str) -> Result<()> {
        self.add_file_content(path, content.as_bytes().to_vec())
    }

    /// Builder-style variant of [`MemoryFS::add_file_string`]
    pub fn with_file(mut self, path: &str, content: &str) -> Result<Self> {
        self.add_file_string(path, content)?;
        Ok(self)
    }

    /// Get a file by path
    pub fn get_file(&self, path: &str) -> Option<&[u8]> {
        let normalized = normalize_path(path)?;
        self.files.get(&normalized).map(Vec::as_slice)
    }

    /// Check if a file exists
    pub fn exists(&self, path: &str) -> bool {
        self.get_file(path).is_some()
    }

    /// List the immediate children of a directory.
    ///
    /// Directories are implied by file paths. Returns `None` when nothing
    /// lives under `dir`, mirroring a missing directory on a real host.
    pub fn list_dir(&self, dir: &str) -> Option<Vec<DirEntry>> {
        let dir = normalize_path(dir)?;
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };

        let mut files = BTreeSet::new();
        let mut dirs = BTreeSet::new();
        for path in self.files.keys() {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((child, _)) => {
                    dirs.insert(child.to_string());
                }
                None => {
                    files.insert(rest.to_string());
                }
            }
        }

        if files.is_empty() && dirs.is_empty() {
            return None;
        }

        let entry = |name: String, kind: EntryKind| DirEntry {
            path: format!("{}{}", prefix, name),
            name,
            kind,
        };
        let mut entries: Vec<DirEntry> = dirs
            .into_iter()
            .map(|name| entry(name, EntryKind::Dir))
            .chain(files.into_iter().map(|name| entry(name, EntryKind::File)))
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Some(entries)
    }

    /// Get the number of files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if filesystem is empty
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
