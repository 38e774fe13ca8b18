use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::generation::prompts::{POSTING_PARSE_PROMPT_TEMPLATE, POSTING_PARSE_SYSTEM};
use crate::llm_client::{complete_json, LlmError, TextModel};

/// Detected tone of a posting. Drives verb selection in the writers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostingTone {
    AggressiveStartup,
    #[default]
    CollaborativeEnterprise,
    ResearchOriented,
    ProductOriented,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub text: String,
    #[serde(default = "default_required")]
    pub is_required: bool,
}

fn default_required() -> bool {
    true
}

/// Structured view of a job posting. Every field tolerates omission by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedJobPosting {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub seniority: Option<String>,
    #[serde(default)]
    pub hard_requirements: Vec<Requirement>,
    #[serde(default)]
    pub nice_to_have: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub tone: PostingTone,
}

impl ParsedJobPosting {
    /// Compact plain-text summary for writer prompts.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        let role = match (&self.title, &self.company) {
            (Some(t), Some(c)) => format!("{t} at {c}"),
            (Some(t), None) => t.clone(),
            (None, Some(c)) => format!("A role at {c}"),
            (None, None) => "Role not stated".to_string(),
        };
        lines.push(format!("Role: {role}"));
        if let Some(seniority) = &self.seniority {
            lines.push(format!("Seniority: {seniority}"));
        }
        if !self.hard_requirements.is_empty() {
            let required: Vec<&str> = self
                .hard_requirements
                .iter()
                .map(|r| r.text.as_str())
                .collect();
            lines.push(format!("Requirements: {}", required.join("; ")));
        }
        if !self.nice_to_have.is_empty() {
            lines.push(format!("Nice to have: {}", self.nice_to_have.join("; ")));
        }
        if !self.keywords.is_empty() {
            lines.push(format!("Keywords: {}", self.keywords.join(", ")));
        }
        lines.join("\n")
    }
}

/// Parses a job posting with the LLM.
pub async fn parse_job_posting(
    text: &str,
    model: &dyn TextModel,
) -> Result<ParsedJobPosting, LlmError> {
    let prompt = POSTING_PARSE_PROMPT_TEMPLATE.replace("{posting_text}", text);
    let parsed: ParsedJobPosting = complete_json(model, &prompt, POSTING_PARSE_SYSTEM).await?;
    debug!(
        "Parsed job posting: title={:?}, {} requirements, tone={:?}",
        parsed.title,
        parsed.hard_requirements.len(),
        parsed.tone
    );
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingModel {
        reply: &'static str,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextModel for RecordingModel {
        async fn complete(&self, prompt: &str, _system: &str) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.to_string())
        }
    }

    #[test]
    fn test_tone_serde() {
        let tone: PostingTone = serde_json::from_str(r#""AggressiveStartup""#).unwrap();
        assert_eq!(tone, PostingTone::AggressiveStartup);
        assert_eq!(PostingTone::default(), PostingTone::CollaborativeEnterprise);
    }

    #[test]
    fn test_full_posting_deserializes() {
        let json = r#"{
            "title": "Senior Rust Engineer",
            "company": "Acme",
            "seniority": "senior",
            "hard_requirements": [
                {"text": "5+ years Rust", "is_required": true},
                {"text": "PostgreSQL"}
            ],
            "nice_to_have": ["Kubernetes"],
            "keywords": ["Rust", "distributed systems"],
            "tone": "ProductOriented"
        }"#;
        let parsed: ParsedJobPosting = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.title.as_deref(), Some("Senior Rust Engineer"));
        assert!(parsed.hard_requirements[1].is_required);
        assert_eq!(parsed.tone, PostingTone::ProductOriented);
    }

    #[test]
    fn test_sparse_posting_uses_defaults() {
        let parsed: ParsedJobPosting = serde_json::from_str(r#"{"title": "Analyst"}"#).unwrap();
        assert!(parsed.keywords.is_empty());
        assert_eq!(parsed.tone, PostingTone::CollaborativeEnterprise);
    }

    #[test]
    fn test_summary() {
        let parsed = ParsedJobPosting {
            title: Some("Data Engineer".to_string()),
            company: Some("Globex".to_string()),
            hard_requirements: vec![Requirement {
                text: "SQL".to_string(),
                is_required: true,
            }],
            keywords: vec!["Airflow".to_string(), "SQL".to_string()],
            ..ParsedJobPosting::default()
        };
        assert_eq!(
            parsed.summary(),
            "Role: Data Engineer at Globex\nRequirements: SQL\nKeywords: Airflow, SQL"
        );
        assert_eq!(ParsedJobPosting::default().summary(), "Role: Role not stated");
    }

    #[tokio::test]
    async fn test_parse_job_posting_fills_prompt() {
        let model = RecordingModel {
            reply: "```json\n{\"title\": \"Platform Engineer\", \"tone\": \"AggressiveStartup\"}\n```",
            prompts: Mutex::new(Vec::new()),
        };
        let parsed = parse_job_posting("We need a platform engineer", &model)
            .await
            .unwrap();
        assert_eq!(parsed.title.as_deref(), Some("Platform Engineer"));
        assert!(model.prompts.lock().unwrap()[0].contains("We need a platform engineer"));
    }

    #[tokio::test]
    async fn test_parse_job_posting_rejects_non_json() {
        let model = RecordingModel {
            reply: "I could not parse that.",
            prompts: Mutex::new(Vec::new()),
        };
        let result = parse_job_posting("text", &model).await;
        assert!(matches!(result, Err(LlmError::Parse(_))));
    }
}
