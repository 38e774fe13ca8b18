use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Processing,
    Rejected,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Processing => "processing",
            SessionStatus::Rejected => "rejected",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub candidate_name: Option<String>,
    pub job_posting_text: Option<String>,
    pub job_posting_url: Option<String>,
    pub source_cv_key: Option<String>,
    pub status: String,
    pub posting: Option<Value>,
    pub input_guardrail: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRow {
    /// Documents are only served once every part of the run was persisted.
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed.as_str()
    }
}
