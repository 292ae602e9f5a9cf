//! Scripted backend and recording observer shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use odra_core::error::{Error, ErrorKind, Result};
use odra_core::{
    AuditReport, AuditRequest, DocumentFile, Evidence, Feedback, FeedbackAck, HealthSnapshot, Job,
    JobState, JobStatus, ReportMetrics, UploadResult, UploadStatus,
};
use serde_json::Map;
use tokio::time::Instant;

use crate::events::{AuditEvent, JobObserver};
use crate::transport::AuditApi;

pub(crate) const JOB_ID: &str = "job_1";

pub(crate) fn processing(progress: i64) -> JobStatus {
    JobStatus::new(JOB_ID, JobState::Processing).with_progress(progress)
}

pub(crate) fn completed() -> JobStatus {
    JobStatus::new(JOB_ID, JobState::Completed).with_progress(100)
}

pub(crate) fn failed() -> JobStatus {
    JobStatus::new(JOB_ID, JobState::Failed)
}

pub(crate) fn server_error() -> Error {
    Error::transport(Some(500), "API error: Internal Server Error")
}

pub(crate) fn queued(task_id: &str) -> UploadResult {
    UploadResult::new(Some(task_id.to_string()), UploadStatus::Queued)
}

pub(crate) fn rejected(task_id: &str) -> UploadResult {
    UploadResult::new(Some(task_id.to_string()), UploadStatus::Rejected)
}

pub(crate) fn sample_report() -> AuditReport {
    AuditReport {
        job_id: JOB_ID.to_string(),
        goal: "Find Q4 anomalies".to_string(),
        metrics: ReportMetrics::new(0.9, 0.6, 2),
        evidence: vec![
            Evidence::new("doc_1", "duplicate invoice #4411", 0.92),
            Evidence::new("doc_2", "late approval", 0.41).with_metadata(Map::new()),
        ],
        recommendations: vec!["Tighten approvals".to_string()],
        summary: "Two findings".to_string(),
        generated_at: Utc.with_ymd_and_hms(2024, 11, 2, 8, 15, 30).unwrap(),
    }
}

struct Scripted<T> {
    latency: Duration,
    result: Result<T>,
}

/// In-memory [`AuditApi`] that replays queued responses.
///
/// Polls past the end of the script report `processing` at 0%.
#[derive(Default)]
pub(crate) struct ScriptedApi {
    calls: Mutex<Vec<&'static str>>,
    polls: Mutex<VecDeque<Scripted<JobStatus>>>,
    poll_times: Mutex<Vec<Instant>>,
    uploads: Mutex<Option<Result<Vec<UploadResult>>>>,
    uploaded_files: Mutex<usize>,
    submit_delay: Duration,
    submit_error: Mutex<Option<Error>>,
    submitted: Mutex<Vec<AuditRequest>>,
    reports: Mutex<VecDeque<Result<AuditReport>>>,
    feedback_error: Option<Error>,
    feedback: Mutex<Vec<(String, Feedback)>>,
    health: Mutex<VecDeque<Result<HealthSnapshot>>>,
    health_times: Mutex<Vec<Instant>>,
}

impl ScriptedApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn poll(self, result: Result<JobStatus>) -> Self {
        self.poll_after(Duration::ZERO, result)
    }

    pub(crate) fn poll_after(mut self, latency: Duration, result: Result<JobStatus>) -> Self {
        self.polls
            .get_mut()
            .unwrap()
            .push_back(Scripted { latency, result });
        self
    }

    pub(crate) fn uploads(mut self, result: Result<Vec<UploadResult>>) -> Self {
        *self.uploads.get_mut().unwrap() = Some(result);
        self
    }

    pub(crate) fn submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    /// Fails the next submission only.
    pub(crate) fn submit_error(mut self, err: Error) -> Self {
        *self.submit_error.get_mut().unwrap() = Some(err);
        self
    }

    pub(crate) fn report(mut self, result: Result<AuditReport>) -> Self {
        self.reports.get_mut().unwrap().push_back(result);
        self
    }

    pub(crate) fn feedback_error(mut self, err: Error) -> Self {
        self.feedback_error = Some(err);
        self
    }

    pub(crate) fn health(mut self, result: Result<HealthSnapshot>) -> Self {
        self.health.get_mut().unwrap().push_back(result);
        self
    }

    pub(crate) fn into_arc(self) -> std::sync::Arc<Self> {
        std::sync::Arc::new(self)
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    pub(crate) fn poll_times(&self) -> Vec<Instant> {
        self.poll_times.lock().unwrap().clone()
    }

    pub(crate) fn health_times(&self) -> Vec<Instant> {
        self.health_times.lock().unwrap().clone()
    }

    pub(crate) fn uploaded_file_count(&self) -> usize {
        *self.uploaded_files.lock().unwrap()
    }

    pub(crate) fn submitted(&self) -> Vec<AuditRequest> {
        self.submitted.lock().unwrap().clone()
    }

    pub(crate) fn feedback(&self) -> Vec<(String, Feedback)> {
        self.feedback.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AuditApi for ScriptedApi {
    async fn submit_audit(&self, request: &AuditRequest) -> Result<Job> {
        self.record("submit");
        self.submitted.lock().unwrap().push(request.clone());
        tokio::time::sleep(self.submit_delay).await;

        if let Some(err) = self.submit_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(Job::new(JOB_ID, Utc::now(), JobState::Pending))
    }

    async fn upload_documents(&self, files: Vec<DocumentFile>) -> Result<Vec<UploadResult>> {
        self.record("upload");
        *self.uploaded_files.lock().unwrap() += files.len();

        let scripted = self.uploads.lock().unwrap().clone();
        scripted.unwrap_or_else(|| {
            Ok(files
                .iter()
                .enumerate()
                .map(|(i, _)| queued(&format!("ingest_{i}")))
                .collect())
        })
    }

    async fn poll_status(&self, _job_id: &str) -> Result<JobStatus> {
        self.record("poll");
        self.poll_times.lock().unwrap().push(Instant::now());

        let next = self.polls.lock().unwrap().pop_front();
        match next {
            Some(scripted) => {
                tokio::time::sleep(scripted.latency).await;
                scripted.result
            }
            None => Ok(processing(0)),
        }
    }

    async fn fetch_report(&self, _job_id: &str) -> Result<AuditReport> {
        self.record("report");
        let next = self.reports.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(sample_report()))
    }

    async fn submit_feedback(&self, job_id: &str, feedback: &Feedback) -> Result<FeedbackAck> {
        self.record("feedback");
        self.feedback
            .lock()
            .unwrap()
            .push((job_id.to_string(), feedback.clone()));

        match &self.feedback_error {
            Some(err) => Err(err.clone()),
            None => Ok(FeedbackAck {
                status: "recorded".to_string(),
                feedback_id: Some("fb_1".to_string()),
            }),
        }
    }

    async fn get_health(&self) -> Result<HealthSnapshot> {
        self.record("health");
        self.health_times.lock().unwrap().push(Instant::now());

        let next = self.health.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Ok(HealthSnapshot {
                status: "healthy".to_string(),
                database: Some("connected".to_string()),
                embeddings: None,
                task_queue: None,
                timestamp: None,
                extra: Map::new(),
            })
        })
    }
}

/// Observer that keeps every callback with the (paused) time it arrived.
#[derive(Default)]
pub(crate) struct Recorder {
    events: Mutex<Vec<(Instant, AuditEvent)>>,
}

impl Recorder {
    pub(crate) fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub(crate) fn statuses(&self) -> Vec<JobStatus> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                AuditEvent::StatusUpdate(status) => Some(status),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn report_ready(&self) -> Vec<(Instant, String)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(at, event)| match event {
                AuditEvent::ReportReady(job_id) => Some((*at, job_id.clone())),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn error_kinds(&self) -> Vec<ErrorKind> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                AuditEvent::Error { kind, .. } => Some(kind),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: AuditEvent) {
        self.events.lock().unwrap().push((Instant::now(), event));
    }
}

impl JobObserver for Recorder {
    fn on_status_update(&self, status: &JobStatus) {
        self.push(AuditEvent::StatusUpdate(status.clone()));
    }

    fn on_report_ready(&self, job_id: &str) {
        self.push(AuditEvent::ReportReady(job_id.to_string()));
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        self.push(AuditEvent::Error {
            kind,
            message: message.to_string(),
        });
    }
}
