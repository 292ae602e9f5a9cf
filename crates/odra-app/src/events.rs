use odra_core::JobStatus;
use odra_core::error::ErrorKind;
use tokio::sync::mpsc::UnboundedSender;

/// What the presentation layer subscribes to.
///
/// Callbacks run on the controller's task and must not block.
pub trait JobObserver: Send + Sync {
    fn on_status_update(&self, status: &JobStatus);

    fn on_report_ready(&self, job_id: &str);

    fn on_error(&self, kind: ErrorKind, message: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    StatusUpdate(JobStatus),
    ReportReady(String),
    Error { kind: ErrorKind, message: String },
}

/// Forwards callbacks onto a channel. A dropped receiver is ignored.
impl JobObserver for UnboundedSender<AuditEvent> {
    fn on_status_update(&self, status: &JobStatus) {
        let _ = self.send(AuditEvent::StatusUpdate(status.clone()));
    }

    fn on_report_ready(&self, job_id: &str) {
        let _ = self.send(AuditEvent::ReportReady(job_id.to_string()));
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        let _ = self.send(AuditEvent::Error {
            kind,
            message: message.to_string(),
        });
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl JobObserver for NoopObserver {
    fn on_status_update(&self, _status: &JobStatus) {}

    fn on_report_ready(&self, _job_id: &str) {}

    fn on_error(&self, _kind: ErrorKind, _message: &str) {}
}
