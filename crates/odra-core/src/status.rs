use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Iteration ceiling the auditor runs to.
pub const MAX_ITERATIONS: u32 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status snapshot. Replaced wholesale on every poll.
///
/// The setters clamp whatever the server reports into range. Progress is
/// taken as reported and never derived from the document counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub state: JobState,
    pub progress_percent: u8,
    pub total_documents: u64,
    pub processed_documents: u64,
    pub metrics: BTreeMap<String, f64>,
    pub current_iteration: u32,
}

impl JobStatus {
    pub fn new(job_id: impl Into<String>, state: JobState) -> Self {
        Self {
            job_id: job_id.into(),
            state,
            progress_percent: 0,
            total_documents: 0,
            processed_documents: 0,
            metrics: BTreeMap::new(),
            current_iteration: 0,
        }
    }

    pub fn with_progress(mut self, percent: i64) -> Self {
        self.progress_percent = percent.clamp(0, 100) as u8;
        self
    }

    /// processed is capped at total.
    pub fn with_documents(mut self, processed: i64, total: i64) -> Self {
        let total = total.max(0) as u64;
        self.total_documents = total;
        self.processed_documents = (processed.max(0) as u64).min(total);
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), clamp_unit(value));
        self
    }

    pub fn with_iteration(mut self, iteration: i64) -> Self {
        self.current_iteration = iteration.clamp(0, MAX_ITERATIONS as i64) as u32;
        self
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn precision(&self) -> Option<f64> {
        self.metric("precision")
    }

    pub fn recall(&self) -> Option<f64> {
        self.metric("recall")
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
