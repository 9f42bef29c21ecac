//! Error types for mangafetch.
//!
//! Uses `thiserror` for structured error definitions. Most resolution
//! failures are recovered locally and surface to callers as `error`
//! download events rather than as `Err` values.

use std::path::PathBuf;
use thiserror::Error;

/// A single HTTP GET that did not produce a usable body.
///
/// Non-2xx statuses, timeouts and transport errors all collapse into this
/// one outcome. The `reason` is kept for diagnostics only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("fetch failed for {url}: {reason}")]
pub struct FetchFailed {
    pub url: String,
    pub reason: String,
}

impl FetchFailed {
    pub fn new(url: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// Kind of page an extraction ran against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    SearchResults,
    ComicDetail,
    ChapterList,
    ChapterImages,
    AppChapter,
}

impl std::fmt::Display for PageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PageKind::SearchResults => "search results",
            PageKind::ComicDetail => "comic detail",
            PageKind::ChapterList => "chapter list",
            PageKind::ChapterImages => "chapter images",
            PageKind::AppChapter => "app chapter images",
        };
        f.write_str(name)
    }
}

/// A page was fetched but no selector strategy yielded data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no {page} extracted (tried: {})", strategies.join(", "))]
pub struct ParseFailure {
    pub page: PageKind,
    /// Strategies attempted, in order.
    pub strategies: Vec<&'static str>,
}

impl ParseFailure {
    pub fn new(page: PageKind, strategies: &[&'static str]) -> Self {
        Self {
            page,
            strategies: strategies.to_vec(),
        }
    }
}

/// Failures that end a chapter resolution and are reported to the caller.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Comic id, slot or chapter id could not be derived.
    #[error("could not resolve {0}")]
    IdentityUnresolved(&'static str),

    /// Every strategy was exhausted without a usable image list.
    #[error("no images found for chapter: {0}")]
    NoImages(String),

    /// The output directory could not be created.
    #[error("failed to create directory {}: {source}", path.display())]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single image that could not be saved.
#[derive(Error, Debug)]
pub enum SaveError {
    #[error(transparent)]
    Fetch(#[from] FetchFailed),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error type for the structured (JSON API) catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// HTTP request failed
    #[error(transparent)]
    Fetch(#[from] FetchFailed),

    /// Response body was not the expected JSON
    #[error("Failed to parse API response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The API answered with an error result
    #[error("API error: {0}")]
    Api(String),

    /// URL could not be built
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: &str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_failure_lists_strategies() {
        let err = ParseFailure::new(PageKind::ChapterImages, &["legacy class", "cdn scan"]);
        assert_eq!(
            err.to_string(),
            "no chapter images extracted (tried: legacy class, cdn scan)"
        );
    }

    #[test]
    fn test_fetch_failed_display() {
        let err = FetchFailed::new("https://example.com/a", "HTTP 404");
        assert_eq!(err.to_string(), "fetch failed for https://example.com/a: HTTP 404");
    }
}
