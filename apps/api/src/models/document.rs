use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Released,
    Blocked,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Released => "released",
            DocumentStatus::Blocked => "blocked",
        }
    }
}

/// A generated document. `s3_key` is set only for released documents.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub kind: String,
    pub status: String,
    pub s3_key: Option<String>,
    pub word_count: i32,
    pub output_guardrail: Value,
    pub created_at: DateTime<Utc>,
}

impl DocumentRow {
    pub fn is_released(&self) -> bool {
        self.status == DocumentStatus::Released.as_str()
    }
}
