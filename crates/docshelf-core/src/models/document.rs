use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OCR pipeline state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for OcrStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OcrStatus::Pending => write!(f, "Pending"),
            OcrStatus::Processing => write!(f, "Processing"),
            OcrStatus::Completed => write!(f, "Completed"),
            OcrStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    #[serde(rename = "pageCount")]
    pub page_count: Option<u32>,
    pub status: OcrStatus,
    #[serde(rename = "uploadedAt")]
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl DocumentSummary {
    /// Whether the OCR pipeline is finished with this document, in either
    /// direction.
    pub fn is_settled(&self) -> bool {
        matches!(self.status, OcrStatus::Completed | OcrStatus::Failed)
    }
}
