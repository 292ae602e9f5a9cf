pub mod error;
mod health;
mod job;
mod report;
mod request;
mod status;
pub mod timestamp;
mod upload;

pub use health::HealthSnapshot;
pub use job::{Job, JobPhase};
pub use report::{AuditReport, Evidence, Feedback, FeedbackAck, FeedbackKind, ReportMetrics};
pub use request::{AuditRequest, DEFAULT_PRIORITY, MAX_PRIORITY, MIN_PRIORITY};
pub use status::{JobState, JobStatus, MAX_ITERATIONS};
pub use upload::{
    DocumentFile, UPLOADED_DOCS_PREFIX, UploadResult, UploadStatus, partial_failure,
    queued_task_ids,
};
