use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const UPLOADED_DOCS_PREFIX: &str = "uploaded_docs:";

/// A file to attach to an audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl DocumentFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Queued,
    Rejected,
    Error,
    #[serde(other)]
    Other,
}

/// Per-file outcome of a batch upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    pub status: UploadStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

impl UploadResult {
    pub fn new(task_id: Option<String>, status: UploadStatus) -> Self {
        Self {
            filename: None,
            task_id,
            status,
            error: None,
            size_bytes: None,
        }
    }

    pub fn is_queued(&self) -> bool {
        self.status == UploadStatus::Queued
    }
}

/// Task ids of uploads that reached `queued`, in upload order.
pub fn queued_task_ids(results: &[UploadResult]) -> Vec<&str> {
    results
        .iter()
        .filter(|result| result.is_queued())
        .filter_map(|result| result.task_id.as_deref())
        .collect()
}

pub(crate) fn derive_scope(results: &[UploadResult]) -> Option<String> {
    let ids = queued_task_ids(results);
    if ids.is_empty() {
        return None;
    }
    Some(format!("{UPLOADED_DOCS_PREFIX}{}", ids.join(",")))
}

/// `Some(PartialUpload)` when at least one file did not make it into the queue.
pub fn partial_failure(results: &[UploadResult]) -> Option<Error> {
    let queued = results.iter().filter(|result| result.is_queued()).count();
    let rejected = results.len() - queued;
    (rejected > 0).then_some(Error::PartialUpload { queued, rejected })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_result_parsing() {
        let results: Vec<UploadResult> = serde_json::from_value(serde_json::json!([
            {"filename": "a.txt", "task_id": "ingest_1", "status": "queued", "size_bytes": 12},
            {"filename": "b.bin", "status": "error", "error": "decode failed"},
            {"filename": "c.txt", "task_id": "ingest_3", "status": "deduplicated"}
        ]))
        .unwrap();

        assert_eq!(results[0].status, UploadStatus::Queued);
        assert_eq!(results[1].status, UploadStatus::Error);
        assert_eq!(results[1].task_id, None);
        assert_eq!(results[2].status, UploadStatus::Other);
        assert_eq!(queued_task_ids(&results), vec!["ingest_1"]);
    }

    #[test]
    fn test_partial_failure() {
        let results = vec![
            UploadResult::new(Some("ingest_1".into()), UploadStatus::Queued),
            UploadResult::new(Some("ingest_2".into()), UploadStatus::Rejected),
        ];
        assert_eq!(
            partial_failure(&results),
            Some(Error::PartialUpload { queued: 1, rejected: 1 })
        );
        assert_eq!(partial_failure(&results[..1]), None);
    }

    #[test]
    fn test_queued_without_task_id_is_skipped() {
        let results = vec![UploadResult::new(None, UploadStatus::Queued)];
        assert_eq!(derive_scope(&results), None);
        assert_eq!(partial_failure(&results), None);

        let results = vec![
            UploadResult::new(None, UploadStatus::Queued),
            UploadResult::new(None, UploadStatus::Error),
        ];
        assert_eq!(
            partial_failure(&results),
            Some(Error::PartialUpload { queued: 1, rejected: 1 })
        );
    }
}
