//! Error types for subscription operations.
//!
//! Two failure families matter to callers:
//!
//! - [`StorageError`]: the record store is unavailable or returned something
//!   it cannot decode. Fatal to the operation that triggered it.
//! - [`PlatformError`]: a chat-platform call failed. Recovered locally by the
//!   reconciler (logged, action skipped) and never shown to end users.
//!
//! Policy results such as "nothing to cancel" are not errors; they are
//! reported through [`crate::lifecycle::Outcome`].

use std::fmt;

/// Failure of the persistent record store.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The database rejected or failed a statement.
    #[error("database error: {0}")]
    Database(String),
    /// A stored row could not be decoded into a record.
    #[error("corrupt record: {0}")]
    Corrupt(String),
    /// The store could not be reached (poisoned lock, aborted worker, ...).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::FromSqlConversionFailure(_, _, inner) => {
                StorageError::Corrupt(inner.to_string())
            }
            rusqlite::Error::InvalidColumnType(idx, name, ty) => {
                StorageError::Corrupt(format!("column {} ({}) has type {}", idx, name, ty))
            }
            other => StorageError::Database(other.to_string()),
        }
    }
}

/// Coarse classification of a [`PlatformError`], used as a log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformErrorKind {
    Transport,
    Timeout,
    RateLimited,
    NotFound,
    Api,
    Decode,
}

impl PlatformErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::NotFound => "not_found",
            Self::Api => "api",
            Self::Decode => "decode",
        }
    }
}

impl fmt::Display for PlatformErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a chat-platform call.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// Network-level failure (connection refused, reset, DNS, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The request did not complete in time.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// Platform method that timed out
        operation: String,
        /// Configured timeout in milliseconds
        timeout_ms: u64,
    },

    /// The platform throttled us.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds the platform asked us to wait
        retry_after_secs: u64,
    },

    /// The user or chat is unknown to the platform.
    #[error("not found: {0}")]
    NotFound(String),

    /// The platform answered with an error.
    #[error("platform error {code}: {description}")]
    Api {
        /// Error code reported by the platform
        code: i64,
        /// Human-readable description from the platform
        description: String,
    },

    /// The response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl PlatformError {
    pub fn kind(&self) -> PlatformErrorKind {
        match self {
            Self::Transport(_) => PlatformErrorKind::Transport,
            Self::Timeout { .. } => PlatformErrorKind::Timeout,
            Self::RateLimited { .. } => PlatformErrorKind::RateLimited,
            Self::NotFound(_) => PlatformErrorKind::NotFound,
            Self::Api { .. } => PlatformErrorKind::Api,
            Self::Decode(_) => PlatformErrorKind::Decode,
        }
    }

    /// Whether retrying the same call later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout { .. } | Self::RateLimited { .. }
        )
    }
}

/// Crate-level error for operations that can fail in more than one way.
#[derive(thiserror::Error, Debug)]
pub enum SubscriptionError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_error_kind() {
        let err = PlatformError::RateLimited {
            retry_after_secs: 3,
        };
        assert_eq!(err.kind(), PlatformErrorKind::RateLimited);
        assert!(err.is_transient());

        let err = PlatformError::Api {
            code: 400,
            description: "Bad Request: chat not found".to_string(),
        };
        assert_eq!(err.kind().to_string(), "api");
        assert!(!err.is_transient());
    }

    #[test]
    fn test_rusqlite_conversion() {
        let err: StorageError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, StorageError::Database(_)));
    }

    #[test]
    fn test_subscription_error_wraps_storage() {
        let err: SubscriptionError = StorageError::Unavailable("lock poisoned".into()).into();
        assert_eq!(err.to_string(), "storage unavailable: lock poisoned");
    }
}
