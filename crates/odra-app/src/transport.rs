mod config;
pub mod schemas;

use async_trait::async_trait;
use log::{debug, info};
use odra_core::error::{Error, Result};
use odra_core::{
    AuditReport, AuditRequest, DocumentFile, Feedback, FeedbackAck, HealthSnapshot, Job, JobStatus,
    UploadResult,
};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::transport::schemas::{
    FeedbackRequest, JobCreateResponse, JobStatusResponse, ReportResponse, UploadBatchResponse,
};

pub use config::{
    ClientConfig, DEFAULT_API_KEY, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT, ENV_API_KEY,
    ENV_BASE_URL, ENV_REQUEST_TIMEOUT,
};
pub(crate) use config::{load_dotenv, parse_var};

pub const API_KEY_HEADER: &str = "X-API-Key";

/// The remote audit service.
///
/// Every failure comes back as [`Error::Transport`]. Nothing here retries or
/// touches local state; that is the controller's job.
#[async_trait]
pub trait AuditApi: Send + Sync {
    async fn submit_audit(&self, request: &AuditRequest) -> Result<Job>;

    /// A batch where only some files are queued is still `Ok`; inspect each result.
    async fn upload_documents(&self, files: Vec<DocumentFile>) -> Result<Vec<UploadResult>>;

    async fn poll_status(&self, job_id: &str) -> Result<JobStatus>;

    async fn fetch_report(&self, job_id: &str) -> Result<AuditReport>;

    async fn submit_feedback(&self, job_id: &str, feedback: &Feedback) -> Result<FeedbackAck>;

    async fn get_health(&self) -> Result<HealthSnapshot>;
}

/// HTTP implementation of [`AuditApi`].
#[derive(Debug, Clone)]
pub struct AuditClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl AuditClient {
    pub fn new(config: ClientConfig) -> std::result::Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(API_KEY_HEADER, &self.config.api_key)
    }

    /// `{base}/{route..}/{job_id}` with the job id encoded as one path segment.
    fn job_url(&self, route: &[&str], job_id: &str) -> Result<Url> {
        if matches!(job_id.trim(), "" | "." | "..") {
            return Err(Error::Validation(format!("invalid job id {job_id:?}")));
        }

        let base = &self.config.base_url;
        let mut url = Url::parse(base)
            .map_err(|err| Error::transport(None, format!("invalid base URL {base}: {err}")))?;
        url.path_segments_mut()
            .map_err(|()| Error::transport(None, format!("base URL {base} cannot carry a path")))?
            .pop_if_empty()
            .extend(route)
            .push(job_id);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(connection_error)?;
        check_status(response).await
    }
}

#[async_trait]
impl AuditApi for AuditClient {
    async fn submit_audit(&self, request: &AuditRequest) -> Result<Job> {
        request.validate()?;

        let url = self.config.url("/audit/run");
        let response = self.send(self.authed(self.http.post(url)).json(request)).await?;
        let job: Job = read_json::<JobCreateResponse>(response).await?.into();

        info!(
            "Submitted audit job {} (priority {}, scope {:?})",
            job.id, request.priority, request.scope
        );
        Ok(job)
    }

    async fn upload_documents(&self, files: Vec<DocumentFile>) -> Result<Vec<UploadResult>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let count = files.len();
        let form = files.into_iter().fold(Form::new(), |form, file| {
            form.part("files", Part::bytes(file.bytes).file_name(file.name))
        });

        let url = self.config.url("/ingest/batch");
        let response = self.send(self.authed(self.http.post(url)).multipart(form)).await?;
        let batch: UploadBatchResponse = read_json(response).await?;

        info!(
            "Uploaded {} document(s), {} queued",
            count,
            batch
                .queued
                .unwrap_or_else(|| odra_core::queued_task_ids(&batch.results).len())
        );
        Ok(batch.results)
    }

    async fn poll_status(&self, job_id: &str) -> Result<JobStatus> {
        let url = self.job_url(&["audit", "status"], job_id)?;
        let response = self.send(self.authed(self.http.get(url))).await?;
        Ok(read_json::<JobStatusResponse>(response).await?.into())
    }

    async fn fetch_report(&self, job_id: &str) -> Result<AuditReport> {
        let url = self.job_url(&["audit", "report"], job_id)?;
        let response = self.send(self.authed(self.http.get(url))).await?;

        // The backend answers 202 while the job is still running.
        if response.status() == StatusCode::ACCEPTED {
            return Err(Error::transport(
                Some(StatusCode::ACCEPTED.as_u16()),
                format!("report for job {job_id} is not ready yet"),
            ));
        }

        Ok(read_json::<ReportResponse>(response).await?.into())
    }

    async fn submit_feedback(&self, job_id: &str, feedback: &Feedback) -> Result<FeedbackAck> {
        let body = FeedbackRequest {
            job_id: job_id.to_string(),
            doc_id: feedback.doc_id.clone(),
            feedback: feedback.feedback,
            comment: feedback.comment.clone(),
        };

        let url = self.job_url(&["audit", "feedback"], job_id)?;
        let response = self.send(self.authed(self.http.post(url)).json(&body)).await?;
        read_json(response).await
    }

    async fn get_health(&self) -> Result<HealthSnapshot> {
        let url = self.config.url("/health");
        let response = self.send(self.http.get(url)).await?;
        read_json(response).await
    }
}

fn connection_error(err: reqwest::Error) -> Error {
    Error::transport(err.status().map(|status| status.as_u16()), err.to_string())
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    debug!("{} returned {}: {}", url, status, body);

    Err(Error::transport(
        Some(status.as_u16()),
        format!(
            "API error: {}",
            status.canonical_reason().unwrap_or("unexpected status")
        ),
    ))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(connection_error)?;
    serde_json::from_slice(&bytes).map_err(|err| {
        Error::transport(Some(status.as_u16()), format!("malformed response body: {err}"))
    })
}
