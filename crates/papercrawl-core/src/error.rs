//! Error taxonomy for the crawl pipeline
//!
//! Two families:
//! - [`ConfigError`]: fatal. Raised before any unit of work is processed, or
//!   mid-run when the failure ledger can no longer be written.
//! - [`StageError`]: raised by a stage collaborator for one identifier. The
//!   orchestrator turns these into failure-ledger entries, never into a run abort.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Coarse classification of a [`StageError`].
///
/// The retry policy decides retryability by kind, and the failure ledger
/// records the kind next to the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Identifier or version does not exist upstream
    NotFound,
    /// Network hiccup, timeout, or 5xx
    Transient,
    /// Upstream asked us to slow down (HTTP 429)
    RateLimited,
    /// Archive cannot be decompressed or unpacked
    CorruptArchive,
    /// Local filesystem error
    Io,
    /// Upstream answered with a payload we cannot interpret
    Malformed,
}

impl ErrorKind {
    /// Kinds retried by the default policy.
    pub const DEFAULT_RETRYABLE: &'static [ErrorKind] = &[Self::Transient, Self::RateLimited];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::Transient => "transient",
            Self::RateLimited => "rate-limited",
            Self::CorruptArchive => "corrupt-archive",
            Self::Io => "io",
            Self::Malformed => "malformed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error from running one stage for one identifier.
#[derive(Debug)]
pub enum StageError {
    NotFound(String),
    Transient(String),
    RateLimited {
        /// `Retry-After` hint from the server, if it sent one
        retry_after: Option<Duration>,
        message: String,
    },
    CorruptArchive(String),
    Io(std::io::Error),
    Malformed(String),
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Transient(msg) => write!(f, "transient: {msg}"),
            Self::RateLimited {
                retry_after: Some(d),
                message,
            } => write!(f, "rate limited (retry after {}s): {message}", d.as_secs()),
            Self::RateLimited {
                retry_after: None,
                message,
            } => write!(f, "rate limited: {message}"),
            Self::CorruptArchive(msg) => write!(f, "corrupt archive: {msg}"),
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::Malformed(msg) => write!(f, "malformed response: {msg}"),
        }
    }
}

impl std::error::Error for StageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Transient(_) => ErrorKind::Transient,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::CorruptArchive(_) => ErrorKind::CorruptArchive,
            Self::Io(_) => ErrorKind::Io,
            Self::Malformed(_) => ErrorKind::Malformed,
        }
    }

    /// Server-provided minimum wait before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Classify a non-success HTTP status.
    ///
    /// 404/410 are permanent; 429 is rate limiting; 5xx is transient.
    /// Any other 4xx means the request itself is wrong and will not improve on retry.
    pub fn from_status(status: u16, retry_after: Option<Duration>, context: &str) -> Self {
        match status {
            404 | 410 => Self::NotFound(format!("{context}: HTTP {status}")),
            429 => Self::RateLimited {
                retry_after,
                message: format!("{context}: HTTP 429"),
            },
            500..=599 => Self::Transient(format!("{context}: HTTP {status}")),
            _ => Self::NotFound(format!("{context}: HTTP {status} (permanent)")),
        }
    }
}

/// Fatal configuration error; aborts the run.
#[derive(Debug)]
pub enum ConfigError {
    InvalidRange { from: i64, to: i64, reason: String },
    InvalidIdentifier(String),
    InvalidInterval(String),
    InvalidRetryPolicy(String),
    UnwritableRoot {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRange { from, to, reason } => {
                write!(f, "invalid range [{from}, {to}]: {reason}")
            }
            Self::InvalidIdentifier(msg) => write!(f, "invalid identifier: {msg}"),
            Self::InvalidInterval(msg) => write!(f, "invalid rate-limit interval: {msg}"),
            Self::InvalidRetryPolicy(msg) => write!(f, "invalid retry policy: {msg}"),
            Self::UnwritableRoot { path, source } => {
                write!(f, "output root {} is not writable: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::UnwritableRoot { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind as IoKind;

    fn retried_by_default(err: &StageError) -> bool {
        ErrorKind::DEFAULT_RETRYABLE.contains(&err.kind())
    }

    #[test]
    fn status_404_is_not_found() {
        let err = StageError::from_status(404, None, "e-print");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!retried_by_default(&err));
    }

    #[test]
    fn status_410_is_not_found() {
        assert_eq!(
            StageError::from_status(410, None, "x").kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn status_429_keeps_retry_after() {
        let err = StageError::from_status(429, Some(Duration::from_secs(7)), "api");
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert!(retried_by_default(&err));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn status_503_is_transient() {
        let err = StageError::from_status(503, None, "api");
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(retried_by_default(&err));
    }

    #[test]
    fn status_403_is_permanent() {
        assert!(!retried_by_default(&StageError::from_status(403, None, "api")));
    }

    #[test]
    fn io_error_not_retryable_by_default() {
        let err = StageError::from(std::io::Error::new(IoKind::PermissionDenied, "nope"));
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(!retried_by_default(&err));
        assert!(format!("{err}").contains("IO:"));
    }

    #[test]
    fn corrupt_archive_not_retryable() {
        assert!(!retried_by_default(&StageError::CorruptArchive("bad gzip".into())));
    }

    #[test]
    fn config_error_display_range() {
        let err = ConfigError::InvalidRange {
            from: 5,
            to: 1,
            reason: "from > to".into(),
        };
        assert_eq!(err.to_string(), "invalid range [5, 1]: from > to");
    }

    #[test]
    fn kind_names_are_distinct() {
        let kinds = [
            ErrorKind::NotFound,
            ErrorKind::Transient,
            ErrorKind::RateLimited,
            ErrorKind::CorruptArchive,
            ErrorKind::Io,
            ErrorKind::Malformed,
        ];
        let names: std::collections::HashSet<_> = kinds.iter().map(|k| k.as_str()).collect();
        assert_eq!(names.len(), kinds.len());
    }
}
