use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{JobState, JobStatus};

/// A server-tracked audit execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub status: JobStatus,
}

impl Job {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>, state: JobState) -> Self {
        let id = id.into();
        Self {
            status: JobStatus::new(id.clone(), state),
            id,
            created_at,
        }
    }
}

/// Where a lifecycle controller is for its one job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    #[default]
    Idle,
    Submitting,
    Polling,
    Completed,
    Failed,
    Cancelled,
}

impl JobPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Submitting | Self::Polling)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::Polling => "polling",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_carries_initial_status() {
        let job = Job::new("job_42", Utc::now(), JobState::Pending);
        assert_eq!(job.status.job_id, "job_42");
        assert_eq!(job.status.state, JobState::Pending);
        assert_eq!(job.status.progress_percent, 0);
    }

    #[test]
    fn test_phase_classes() {
        assert!(JobPhase::Polling.is_active());
        assert!(!JobPhase::Idle.is_active());
        assert!(JobPhase::Cancelled.is_terminal());
        assert_eq!(JobPhase::default(), JobPhase::Idle);
    }
}
