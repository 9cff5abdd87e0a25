//! Repository coordinates and source locators
//!
//! A [`SourceLocator`] is the canonical identity of a piece of declaration
//! content: either a normalised path inside a repository at a ref, or an
//! absolute URL. Both caches and cycle detection key on it, so two spellings
//! of the same file (`a/./b.yaml`, `a/c/../b.yaml`) must produce equal
//! locators.
//!
//! Reference strings found in declaration data are resolved against the
//! locator of the file containing them:
//!
//! | Form                            | Meaning                                    |
//! |---------------------------------|--------------------------------------------|
//! | `https://host/x.yaml`           | absolute URL                               |
//! | `owner/repo/path/x.yaml@ref`    | file in another repository at `ref`        |
//! | `/path/x.yaml`                  | path from the root of the same repository  |
//! | `x.yaml`, `../shared/x.yaml`    | relative to the containing file's directory |
//!
//! An `@` only marks a ref when it sits in the last segment of a reference
//! with at least `owner/repo/path` before it, so `steps/node@18.yaml` is a
//! relative path. Owner and repository names are never `.` or `..`.

use std::fmt;

use url::Url;

use crate::error::{Error, Result};

/// Identifies a repository tree at a specific ref
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoCoordinate {
    pub owner: String,
    pub repo: String,
    pub r#ref: String,
}

impl RepoCoordinate {
    pub fn new(owner: &str, repo: &str, r#ref: &str) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            r#ref: r#ref.to_string(),
        }
    }

    /// Like [`RepoCoordinate::new`], but rejects owner and repository names
    /// that could address anything outside `owner/repo`.
    pub fn checked(owner: &str, repo: &str, r#ref: &str) -> Result<Self> {
        for name in [owner, repo] {
            if !is_valid_name(name) {
                return Err(Error::InvalidReference {
                    reference: join_full_name(owner, repo),
                    message: format!("'{}' is not a valid owner or repository name", name),
                });
            }
        }
        Ok(Self::new(owner, repo, r#ref))
    }

    /// The `owner/repo` name used as the key in the global configuration.
    pub fn full_name(&self) -> String {
        join_full_name(&self.owner, &self.repo)
    }

    /// Locator for a repo-relative path inside this repository.
    pub fn locator(&self, path: &str) -> Result<SourceLocator> {
        let normalized = normalize_path(path).ok_or_else(|| Error::InvalidReference {
            reference: path.to_string(),
            message: "path escapes the repository root".to_string(),
        })?;
        Ok(SourceLocator::Repo {
            coordinate: self.clone(),
            path: normalized,
        })
    }
}

impl fmt::Display for RepoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.r#ref)
    }
}

/// Join an owner and repository name into `owner/repo`.
pub fn join_full_name(owner: &str, repo: &str) -> String {
    format!("{}/{}", owner, repo)
}

/// Split `owner/repo` into its two halves.
pub fn split_full_name(full_name: &str) -> Result<(String, String)> {
    match full_name.split_once('/') {
        Some((owner, repo)) if is_valid_name(owner) && is_valid_name(repo) => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(Error::InvalidReference {
            reference: full_name.to_string(),
            message: "expected a repository name of the form owner/repo".to_string(),
        }),
    }
}

/// Canonical identity of a piece of declaration content
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceLocator {
    /// A normalised repo-relative path at a coordinate
    Repo {
        coordinate: RepoCoordinate,
        path: String,
    },
    /// An absolute http(s) URL
    Url(Url),
}

impl SourceLocator {
    /// Parse an absolute http(s) URL into a locator.
    pub fn url(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)?;
        check_scheme(raw, &url)?;
        Ok(SourceLocator::Url(url))
    }

    /// Parse a reference that does not depend on its containing file: an
    /// absolute URL or `owner/repo/path@ref`.
    pub fn parse_absolute(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if is_absolute_url(reference) {
            SourceLocator::url(reference)
        } else if reference.contains('@') {
            parse_cross_repo(reference)
        } else {
            Err(Error::InvalidReference {
                reference: reference.to_string(),
                message: "relative reference without a containing file".to_string(),
            })
        }
    }

    pub fn is_url(&self) -> bool {
        matches!(self, SourceLocator::Url(_))
    }

    /// Resolve a reference string found inside the content at `self`.
    pub fn resolve_reference(&self, reference: &str) -> Result<SourceLocator> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(Error::InvalidReference {
                reference: reference.to_string(),
                message: "reference is empty".to_string(),
            });
        }

        if is_absolute_reference(reference) {
            return SourceLocator::parse_absolute(reference);
        }

        match self {
            SourceLocator::Url(base) => {
                let joined = base.join(reference)?;
                check_scheme(reference, &joined)?;
                Ok(SourceLocator::Url(joined))
            }
            SourceLocator::Repo { coordinate, path } => {
                let combined = match reference.strip_prefix('/') {
                    Some(from_root) => from_root.to_string(),
                    None => match parent_dir(path) {
                        "" => reference.to_string(),
                        dir => format!("{}/{}", dir, reference),
                    },
                };
                coordinate.locator(&combined).map_err(|_| Error::InvalidReference {
                    reference: reference.to_string(),
                    message: format!("climbs above the root of {}", coordinate.full_name()),
                })
            }
        }
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocator::Repo { coordinate, path } => write!(
                f,
                "{}/{}/{}@{}",
                coordinate.owner, coordinate.repo, path, coordinate.r#ref
            ),
            SourceLocator::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Whether `name` can be used as an owner or repository name.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

fn is_absolute_reference(reference: &str) -> bool {
    is_absolute_url(reference) || is_cross_repo_reference(reference)
}

/// `owner/repo/path@ref` with the `@` in the last segment and valid owner
/// and repository names. Anything else containing `@` is a relative path.
fn is_cross_repo_reference(reference: &str) -> bool {
    let (location, r#ref) = match reference.rsplit_once('@') {
        Some(split) => split,
        None => return false,
    };
    if r#ref.contains('/') {
        return false;
    }
    let mut parts = location.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), Some(path)) => {
            is_valid_name(owner) && is_valid_name(repo) && !path.is_empty()
        }
        _ => false,
    }
}

fn is_absolute_url(reference: &str) -> bool {
    reference.starts_with("https://") || reference.starts_with("http://")
}

fn check_scheme(raw: &str, url: &Url) -> Result<()> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::InvalidReference {
            reference: raw.to_string(),
            message: format!("unsupported URL scheme '{}'", other),
        }),
    }
}

/// Parse `owner/repo/path@ref`.
fn parse_cross_repo(reference: &str) -> Result<SourceLocator> {
    let invalid = |message: &str| Error::InvalidReference {
        reference: reference.to_string(),
        message: message.to_string(),
    };

    let (location, r#ref) = reference
        .rsplit_once('@')
        .ok_or_else(|| invalid("missing '@ref'"))?;
    if r#ref.is_empty() {
        return Err(invalid("empty ref after '@'"));
    }

    let mut parts = location.splitn(3, '/');
    let owner = parts.next().unwrap_or_default();
    let repo = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();
    if owner.is_empty() || repo.is_empty() || path.is_empty() {
        return Err(invalid("expected owner/repo/path@ref"));
    }

    RepoCoordinate::checked(owner, repo, r#ref)
        .map_err(|_| invalid("invalid owner or repository name"))?
        .locator(path)
        .map_err(|_| invalid("path escapes the repository root"))
}

/// Directory part of a normalised repo-relative path ("" for the root).
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Normalise a repo-relative path.
///
/// Empty and `.` segments are dropped, `..` pops the previous segment and a
/// leading `/` is ignored. Returns `None` when `..` would climb above the root.
pub fn normalize_path(path: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    Some(segments.join("/"))
}
