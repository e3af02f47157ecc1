//! Error taxonomy for the hand-off pipeline.
//!
//! # Architecture overview
//!
//! Every adapter boundary returns `Result<_, HandoffError>`. The variants here
//! are kinds, not specific source failures — per-source detail (which file,
//! which SQL error) is carried in the variant's message rather than as new
//! variants, so call sites can match on a handful of outcomes instead of
//! dozens.
//!
//! # Propagation policy
//!
//! Only `NotFound`, `Enumeration`, and `Locked` are meant to reach a caller.
//! `Transient` failures (one bad line, one unreadable session file during a
//! listing) are swallowed at the point they occur and never constructed here
//! — the adapter logs at `tracing::debug!` and continues. An absent optional
//! collaborator (git binary) is handled the same way: leave the field `None`,
//! don't surface an error.
//!
//! `NotFound` and `Enumeration` look similar but map to different exit codes:
//! `NotFound` is a capture/resume-time failure — a specific session id or a
//! previously captured `.handoff/` doesn't exist — while `Enumeration` is a
//! listing-time failure — a source's storage can be opened but its session
//! list itself can't be produced. Keep them distinct the way `NoAgents` is
//! already split out from both.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("{0}")]
    NoAgents(String),

    #[error("no session found for {0}")]
    NotFound(String),

    #[error("failed to list sessions: {0}")]
    Enumeration(String),

    #[error("malformed session data: {0}")]
    Malformed(String),

    #[error("{source} storage is locked — close {source} and retry")]
    Locked { source: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("sqlite error: {0}")]
    Sqlite(String),

    #[error("{0}")]
    Other(String),
}

impl HandoffError {
    pub fn malformed_path(path: &PathBuf, detail: impl std::fmt::Display) -> Self {
        HandoffError::Malformed(format!("{}: {detail}", path.display()))
    }
}

/// Exit codes used by `main.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    NoAgents = 1,
    EnumerationFailed = 2,
    CaptureFailed = 3,
}

impl HandoffError {
    /// Map this error to the CLI's exit code.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            HandoffError::NoAgents(_) => ExitCode::NoAgents,
            HandoffError::Enumeration(_) => ExitCode::EnumerationFailed,
            HandoffError::NotFound(_) | HandoffError::Malformed(_) | HandoffError::Locked { .. } => ExitCode::CaptureFailed,
            _ => ExitCode::CaptureFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_error_mentions_source() {
        let err = HandoffError::Locked {
            source: "cursor".to_string(),
        };
        assert!(err.to_string().contains("cursor"));
        assert!(err.to_string().contains("close"));
    }

    #[test]
    fn exit_codes_match_taxonomy() {
        assert_eq!(
            HandoffError::NoAgents("x".into()).exit_code(),
            ExitCode::NoAgents
        );
        assert_eq!(
            HandoffError::NotFound("x".into()).exit_code(),
            ExitCode::CaptureFailed
        );
        assert_eq!(
            HandoffError::Enumeration("x".into()).exit_code(),
            ExitCode::EnumerationFailed
        );
        assert_eq!(
            HandoffError::Malformed("x".into()).exit_code(),
            ExitCode::CaptureFailed
        );
    }
}
