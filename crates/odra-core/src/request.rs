use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::upload::{self, UploadResult};

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;
pub const DEFAULT_PRIORITY: u8 = 5;

/// Body of `POST /audit/run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRequest {
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub priority: u8,
}

impl AuditRequest {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            scope: None,
            priority: DEFAULT_PRIORITY,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.goal.trim().is_empty() {
            return Err(Error::Validation("goal must not be empty".into()));
        }
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.priority) {
            return Err(Error::Validation(format!(
                "priority must be between {MIN_PRIORITY} and {MAX_PRIORITY}, got {}",
                self.priority
            )));
        }
        Ok(())
    }

    /// Caller-supplied scope, ignoring blank strings.
    pub fn explicit_scope(&self) -> Option<&str> {
        self.scope.as_deref().filter(|scope| !scope.trim().is_empty())
    }

    /// Resolves the scope that is actually sent.
    ///
    /// An explicit scope always wins. Without one, the queued upload task ids
    /// become `uploaded_docs:<id>,<id>`. With neither, the scope is omitted.
    pub fn with_effective_scope(mut self, uploads: &[UploadResult]) -> Self {
        self.scope = match self.explicit_scope() {
            Some(scope) => Some(scope.to_string()),
            None => upload::derive_scope(uploads),
        };
        self
    }
}
