use std::sync::Arc;

use log::{info, warn};
use odra_core::error::{Error, Result};
use odra_core::{AuditReport, Feedback, FeedbackAck, FeedbackKind};

use crate::events::JobObserver;
use crate::transport::AuditApi;

/// Holds the finished report of one job for the viewing session.
///
/// The report is fetched at most once. A failed fetch leaves nothing cached
/// so calling [`ReportAssembler::fetch`] again retries.
pub struct ReportAssembler {
    api: Arc<dyn AuditApi>,
    observer: Arc<dyn JobObserver>,
    job_id: String,
    report: Option<Arc<AuditReport>>,
}

impl ReportAssembler {
    pub fn new(
        api: Arc<dyn AuditApi>,
        observer: Arc<dyn JobObserver>,
        job_id: impl Into<String>,
    ) -> Self {
        Self {
            api,
            observer,
            job_id: job_id.into(),
            report: None,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn report(&self) -> Option<Arc<AuditReport>> {
        self.report.clone()
    }

    pub async fn fetch(&mut self) -> Result<Arc<AuditReport>> {
        if let Some(report) = &self.report {
            return Ok(report.clone());
        }

        match self.api.fetch_report(&self.job_id).await {
            Ok(report) => {
                info!(
                    "Fetched report for job {}: {} evidence item(s), {} recommendation(s)",
                    self.job_id,
                    report.evidence().len(),
                    report.recommendations().len()
                );
                let report = Arc::new(report);
                self.report = Some(report.clone());
                Ok(report)
            }
            Err(err) => {
                let unavailable = Error::ReportUnavailable {
                    job_id: self.job_id.clone(),
                    reason: err.to_string(),
                };
                warn!("{}", unavailable);
                self.observer
                    .on_error(unavailable.kind(), &unavailable.to_string());
                Err(unavailable)
            }
        }
    }

    /// Sends a judgement on one evidence item. Failures are logged and
    /// reported to the observer, never returned.
    pub async fn submit_feedback(
        &self,
        doc_id: &str,
        kind: FeedbackKind,
        comment: Option<&str>,
    ) -> Option<FeedbackAck> {
        let mut feedback = Feedback::new(doc_id, kind);
        if let Some(comment) = comment.filter(|c| !c.trim().is_empty()) {
            feedback = feedback.with_comment(comment);
        }

        match self.api.submit_feedback(&self.job_id, &feedback).await {
            Ok(ack) => {
                info!("Recorded {:?} feedback on {} ({})", kind, doc_id, ack.status);
                Some(ack)
            }
            Err(err) => {
                warn!("Feedback on {} for job {} failed: {}", doc_id, self.job_id, err);
                self.observer.on_error(err.kind(), &err.to_string());
                None
            }
        }
    }
}
