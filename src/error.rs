//! Error types for polling the backend.
//!
//! Transport and HTTP failures are retried by the fetch primitive and surface
//! as `SourceUnavailable` once the budget is spent. None of these reach the
//! rendering layer as errors; the aggregator records them per source.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport error calling {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("{endpoint} returned HTTP {status}")]
    Http { endpoint: String, status: u16 },

    #[error("malformed payload from {endpoint}: {reason}")]
    MalformedPayload { endpoint: String, reason: String },

    #[error("{endpoint} unavailable after {attempts} attempt(s): {last}")]
    SourceUnavailable {
        endpoint: String,
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },

    #[error("request abandoned")]
    Cancelled,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Http { .. } => ErrorKind::Http,
            Self::MalformedPayload { .. } => ErrorKind::MalformedPayload,
            Self::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Transport and non-2xx failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Http { .. })
    }

    /// Kind of the innermost failure.
    pub fn root_kind(&self) -> ErrorKind {
        match self {
            Self::SourceUnavailable { last, .. } => last.root_kind(),
            other => other.kind(),
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::SourceUnavailable { attempts, .. } => *attempts,
            Self::Cancelled => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Http,
    MalformedPayload,
    SourceUnavailable,
    Cancelled,
}

/// What the view model keeps about a failed poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceError {
    pub kind: ErrorKind,
    pub cause: ErrorKind,
    pub attempts: u32,
    pub message: String,
}

impl From<&FetchError> for SourceError {
    fn from(err: &FetchError) -> Self {
        Self {
            kind: err.kind(),
            cause: err.root_kind(),
            attempts: err.attempts(),
            message: err.to_string(),
        }
    }
}

/// The scheduler task is gone (shut down or all handles dropped).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("poll scheduler has stopped")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_unavailable_reports_root_cause() {
        let err = FetchError::SourceUnavailable {
            endpoint: "/api/system".to_string(),
            attempts: 3,
            last: Box::new(FetchError::Http {
                endpoint: "/api/system".to_string(),
                status: 502,
            }),
        };
        let recorded = SourceError::from(&err);
        assert_eq!(recorded.kind, ErrorKind::SourceUnavailable);
        assert_eq!(recorded.cause, ErrorKind::Http);
        assert_eq!(recorded.attempts, 3);
        assert!(recorded.message.contains("HTTP 502"));
    }
}
