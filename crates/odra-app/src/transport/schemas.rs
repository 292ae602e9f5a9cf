use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use odra_core::{
    AuditReport, Evidence, FeedbackKind, Job, JobState, JobStatus, ReportMetrics, UploadResult,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobCreateResponse {
    pub job_id: String,
    pub status: JobState,
    #[serde(deserialize_with = "odra_core::timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
}

impl From<JobCreateResponse> for Job {
    fn from(resp: JobCreateResponse) -> Self {
        Job::new(resp.job_id, resp.created_at, resp.status)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobState,
    #[serde(default)]
    pub progress_percent: i64,
    #[serde(default)]
    pub total_documents: i64,
    #[serde(default)]
    pub processed_documents: i64,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub current_iteration: i64,
}

impl From<JobStatusResponse> for JobStatus {
    fn from(resp: JobStatusResponse) -> Self {
        let status = JobStatus::new(resp.job_id, resp.status)
            .with_progress(resp.progress_percent)
            .with_documents(resp.processed_documents, resp.total_documents)
            .with_iteration(resp.current_iteration);

        resp.metrics
            .into_iter()
            .fold(status, |status, (name, value)| status.with_metric(name, value))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceResponse {
    pub doc_id: String,
    pub snippet: String,
    pub relevance_score: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportResponse {
    pub job_id: String,
    pub goal: String,
    #[serde(default)]
    pub status: Option<JobState>,
    #[serde(default)]
    pub total_evidence: Option<u64>,
    #[serde(default)]
    pub precision: f64,
    #[serde(default)]
    pub recall: f64,
    #[serde(default)]
    pub evidence: Vec<EvidenceResponse>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(deserialize_with = "odra_core::timestamp::deserialize")]
    pub generated_at: DateTime<Utc>,
}

impl From<ReportResponse> for AuditReport {
    fn from(resp: ReportResponse) -> Self {
        let evidence: Vec<Evidence> = resp
            .evidence
            .into_iter()
            .map(|item| {
                Evidence::new(item.doc_id, item.snippet, item.relevance_score)
                    .with_metadata(item.metadata)
            })
            .collect();
        let total_evidence = resp.total_evidence.unwrap_or(evidence.len() as u64);

        AuditReport {
            job_id: resp.job_id,
            goal: resp.goal,
            metrics: ReportMetrics::new(resp.precision, resp.recall, total_evidence),
            evidence,
            recommendations: resp.recommendations,
            summary: resp.summary,
            generated_at: resp.generated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadBatchResponse {
    #[serde(default)]
    pub total_files: Option<usize>,
    #[serde(default)]
    pub queued: Option<usize>,
    #[serde(default)]
    pub results: Vec<UploadResult>,
}

/// The backend validates `job_id` in the body as well as in the path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRequest {
    pub job_id: String,
    pub doc_id: String,
    pub feedback: FeedbackKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}
