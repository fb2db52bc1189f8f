//! Public output types for cooly command responses.
//!
//! Multi-host operations report one [`ItemOutcome`] per host plus a
//! [`BulkSummary`], wrapped in a [`BulkResult`].

use serde::Serialize;

/// Standardized bulk execution result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResult<T: Serialize> {
    pub action: String,
    pub results: Vec<ItemOutcome<T>>,
    pub summary: BulkSummary,
}

/// Outcome for a single item in a bulk operation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutcome<T: Serialize> {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(flatten)]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error code of the failure, when there was one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Summary of bulk operation results.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BulkSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl<T: Serialize> BulkResult<T> {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            results: Vec::new(),
            summary: BulkSummary {
                total: 0,
                succeeded: 0,
                failed: 0,
            },
        }
    }

    pub fn record_success(&mut self, id: impl Into<String>, result: T) {
        self.summary.total += 1;
        self.summary.succeeded += 1;
        self.results.push(ItemOutcome {
            id: id.into(),
            result: Some(result),
            error: None,
            code: None,
        });
    }

    pub fn record_error(&mut self, id: impl Into<String>, err: &crate::Error) {
        self.summary.total += 1;
        self.summary.failed += 1;
        self.results.push(ItemOutcome {
            id: id.into(),
            result: None,
            error: Some(err.message.clone()),
            code: Some(err.code.as_str().to_string()),
        });
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }
}
