//! Error types for filter-list handling and request-pipeline registration.

use thiserror::Error;

/// Errors raised while fetching or reading a single filter list.
///
/// All variants are recoverable at the session level: the caller keeps the
/// previous cache (or none) and carries on with the other lists.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("HTTP error fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("too many redirects fetching {url}")]
    Redirect { url: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FilterError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// Raised by a host pipeline that refuses a matcher registration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("matcher '{0}' has no URL patterns")]
    EmptyPatterns(String),

    #[error("browsing context '{0}' is not available")]
    ContextUnavailable(String),

    #[error("pipeline rejected matcher '{name}': {reason}")]
    Rejected { name: String, reason: String },
}
