//! # Error Handling
//!
//! This module defines the centralized error type for trigger resolution and
//! merging. It uses the `thiserror` library to create a single `Error` enum
//! covering every failure mode of a load or merge, each variant carrying
//! enough identity (repository, locator, job name) for an operator to act on.
//!
//! ## Taxonomy
//!
//! - **Fetch failures**: `Fetch`, `HttpStatus`, `Network`. Content could not
//!   be retrieved. No retry happens inside this crate.
//! - **Parse failures**: `ConfigParse`, `InvalidReference`. Declaration
//!   content or a reference string is malformed.
//! - **Cyclic references**: `CycleDetected`, `DepthExceeded`.
//! - **Validation failures**: `DuplicateJob`, `InvalidJob`.
//! - **Infrastructure**: `LockPoisoned`, `Settings`, and the wrapped library
//!   errors (`Io`, `Yaml`, `Regex`, `UrlParse`, `Toml`).
//!
//! An empty trigger directory is never an error.

use thiserror::Error;

use crate::job::JobKind;

/// Main error type for trigger loading and merging
#[derive(Error, Debug)]
pub enum Error {
    /// A trigger file or fetched pipeline fragment could not be parsed.
    ///
    /// `file` is the canonical locator of the offending content.
    #[error("Configuration parsing error in {file}: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        file: String,
        message: String,
        /// Optional hint for how to fix the declaration
        hint: Option<String>,
    },

    /// Content behind a locator is absent or could not be read.
    #[error("Failed to fetch {locator}: {message}")]
    Fetch { locator: String, message: String },

    /// An absolute URL answered with a non-success status.
    #[error("HTTP GET {url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    /// A transport-level failure (connection refused, timeout, TLS).
    #[error("Network operation error: {url} - {message}")]
    Network { url: String, message: String },

    /// A reference chain leads back to one of its own ancestors.
    #[error("Cycle detected in pipeline references: {cycle}")]
    CycleDetected { cycle: String },

    /// A reference chain is deeper than the configured limit.
    #[error("Reference depth {depth} exceeded while resolving {locator}")]
    DepthExceeded { locator: String, depth: usize },

    /// A reference string could not be turned into a locator.
    #[error("Invalid reference '{reference}': {message}")]
    InvalidReference { reference: String, message: String },

    /// Two jobs of the same kind share an identifier within one repository.
    #[error("Duplicate {kind} '{name}' in repository {repo}")]
    DuplicateJob {
        repo: String,
        kind: JobKind,
        name: String,
    },

    /// A job failed a semantic check (bad regex, step without an image).
    #[error("Invalid {kind} '{name}' in repository {repo}: {message}")]
    InvalidJob {
        repo: String,
        kind: JobKind,
        name: String,
        message: String,
    },

    /// Loader settings are unusable.
    #[error("Settings error: {message}")]
    Settings { message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// A TOML settings parsing error.
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

impl Error {
    /// Whether the error came from retrieving content rather than from its shape.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            Error::Fetch { .. } | Error::HttpStatus { .. } | Error::Network { .. }
        )
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
