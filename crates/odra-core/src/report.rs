use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::status::clamp_unit;

/// A scored document excerpt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub doc_id: String,
    pub snippet: String,
    pub relevance_score: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Evidence {
    pub fn new(
        doc_id: impl Into<String>,
        snippet: impl Into<String>,
        relevance_score: f64,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            snippet: snippet.into(),
            relevance_score: clamp_unit(relevance_score),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportMetrics {
    pub precision: f64,
    pub recall: f64,
    pub total_evidence: u64,
}

impl ReportMetrics {
    pub fn new(precision: f64, recall: f64, total_evidence: u64) -> Self {
        Self {
            precision: clamp_unit(precision),
            recall: clamp_unit(recall),
            total_evidence,
        }
    }
}

/// The finished audit. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub job_id: String,
    pub goal: String,
    pub metrics: ReportMetrics,
    pub evidence: Vec<Evidence>,
    pub recommendations: Vec<String>,
    pub summary: String,
    pub generated_at: DateTime<Utc>,
}

impl AuditReport {
    pub fn metrics(&self) -> &ReportMetrics {
        &self.metrics
    }

    /// Evidence in server order.
    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    pub fn evidence_for(&self, doc_id: &str) -> Option<&Evidence> {
        self.evidence.iter().find(|item| item.doc_id == doc_id)
    }

    pub fn recommendations(&self) -> &[String] {
        &self.recommendations
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Relevant,
    Irrelevant,
    NeedsReview,
}

/// Human judgement on one piece of evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub doc_id: String,
    pub feedback: FeedbackKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Feedback {
    pub fn new(doc_id: impl Into<String>, feedback: FeedbackKind) -> Self {
        Self {
            doc_id: doc_id.into(),
            feedback,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackAck {
    pub status: String,
    #[serde(default)]
    pub feedback_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> AuditReport {
        AuditReport {
            job_id: "job_1".into(),
            goal: "Find Q4 anomalies".into(),
            metrics: ReportMetrics::new(0.9, 0.6, 2),
            evidence: vec![
                Evidence::new("doc_b", "wire transfer to unknown vendor", 0.92),
                Evidence::new("doc_a", "duplicate invoice", 0.71),
            ],
            recommendations: vec!["Review vendor onboarding".into()],
            summary: "Two anomalies found".into(),
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_evidence_keeps_server_order() {
        let report = report();
        let ids: Vec<&str> = report.evidence().iter().map(|e| e.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["doc_b", "doc_a"]);
        assert_eq!(report.evidence_for("doc_a").unwrap().snippet, "duplicate invoice");
        assert!(report.evidence_for("doc_z").is_none());
    }

    #[test]
    fn test_scores_are_clamped() {
        assert_eq!(Evidence::new("d", "s", 3.0).relevance_score, 1.0);
        let metrics = ReportMetrics::new(-0.5, 1.5, 0);
        assert_eq!((metrics.precision, metrics.recall), (0.0, 1.0));
    }

    #[test]
    fn test_feedback_wire_format() {
        let body = serde_json::to_value(
            Feedback::new("doc_a", FeedbackKind::NeedsReview).with_comment("check totals"),
        )
        .unwrap();
        assert_eq!(body["feedback"], "needs_review");
        assert_eq!(body["comment"], "check totals");

        let body = serde_json::to_value(Feedback::new("doc_a", FeedbackKind::Relevant)).unwrap();
        assert!(body.get("comment").is_none());
    }
}
