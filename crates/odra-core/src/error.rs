use std::fmt;

use thiserror::Error;

use crate::job::JobPhase;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong between submitting an audit and reading its report.
///
/// None of these are fatal to the process: each one is recoverable by a retry
/// or a fresh submission.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Rejected locally, before any network call.
    #[error("invalid audit request: {0}")]
    Validation(String),

    /// Non-2xx response or connection failure.
    #[error("transport error{}: {message}", format_status(.status))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// Some uploaded documents were not queued. The audit still runs with a narrower scope.
    #[error("{rejected} uploaded document(s) were not queued, {queued} queued")]
    PartialUpload { queued: usize, rejected: usize },

    #[error("report for job {job_id} is unavailable: {reason}")]
    ReportUnavailable { job_id: String, reason: String },

    #[error("audit job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },

    #[error("controller is {actual}, expected {expected}")]
    InvalidPhase {
        expected: &'static str,
        actual: JobPhase,
    },

    #[error("operation cancelled")]
    Cancelled,
}

fn format_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}

impl Error {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::PartialUpload { .. } => ErrorKind::PartialUpload,
            Self::ReportUnavailable { .. } => ErrorKind::ReportUnavailable,
            Self::JobFailed { .. } => ErrorKind::JobFailed,
            Self::InvalidPhase { .. } => ErrorKind::InvalidPhase,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// HTTP status carried by a transport error, if the server answered at all.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

/// Coarse classification handed to observers alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Transport,
    PartialUpload,
    ReportUnavailable,
    JobFailed,
    InvalidPhase,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Transport => "transport",
            Self::PartialUpload => "partial_upload",
            Self::ReportUnavailable => "report_unavailable",
            Self::JobFailed => "job_failed",
            Self::InvalidPhase => "invalid_phase",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_display() {
        let err = Error::transport(Some(500), "API error: Internal Server Error");
        assert_eq!(
            err.to_string(),
            "transport error (HTTP 500): API error: Internal Server Error"
        );

        let err = Error::transport(None, "connection refused");
        assert_eq!(err.to_string(), "transport error: connection refused");
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Error::Validation("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(Error::transport(Some(404), "x").kind(), ErrorKind::Transport);
        assert_eq!(
            Error::PartialUpload { queued: 1, rejected: 1 }.kind(),
            ErrorKind::PartialUpload
        );
        assert_eq!(Error::Cancelled.kind().as_str(), "cancelled");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(Error::transport(Some(202), "x").http_status(), Some(202));
        assert_eq!(Error::Validation("x".into()).http_status(), None);
    }
}
