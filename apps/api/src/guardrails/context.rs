use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of generated document. Output guardrails calibrate their rules by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Cv,
    CoverLetter,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Cv => "cv",
            DocumentKind::CoverLetter => "cover_letter",
        }
    }
}

/// Job posting as supplied by the candidate. Either part may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub text: Option<String>,
    pub url: Option<String>,
}

/// Typed material the built-in guardrails read from. Anything that does not
/// fit here goes into `GuardrailContext::metadata`.
#[derive(Debug, Clone, Default)]
pub struct ValidationSubject {
    pub job_posting: Option<JobPosting>,
    pub source_cv: Option<String>,
    pub document_kind: Option<DocumentKind>,
}

/// Everything a guardrail sees for one validation call. Built fresh per call.
#[derive(Debug, Clone)]
pub struct GuardrailContext {
    pub input: String,
    pub output: Option<String>,
    pub agent_name: String,
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub subject: ValidationSubject,
    pub metadata: HashMap<String, Value>,
}

impl GuardrailContext {
    /// Context for the input stage.
    pub fn new(agent_name: impl Into<String>, session_id: Uuid, input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: None,
            agent_name: agent_name.into(),
            session_id,
            timestamp: Utc::now(),
            subject: ValidationSubject::default(),
            metadata: HashMap::new(),
        }
    }

    /// Derives an output-stage context for `agent_name`'s produced document.
    /// Input text, session, subject and metadata carry over; timestamp is fresh.
    pub fn for_output(
        &self,
        agent_name: impl Into<String>,
        kind: DocumentKind,
        output: impl Into<String>,
    ) -> Self {
        let mut ctx = self.clone();
        ctx.agent_name = agent_name.into();
        ctx.output = Some(output.into());
        ctx.subject.document_kind = Some(kind);
        ctx.timestamp = Utc::now();
        ctx
    }

    pub fn with_job_posting(mut self, posting: JobPosting) -> Self {
        self.subject.job_posting = Some(posting);
        self
    }

    pub fn with_source_cv(mut self, cv_text: impl Into<String>) -> Self {
        self.subject.source_cv = Some(cv_text.into());
        self
    }

    pub fn with_document_kind(mut self, kind: DocumentKind) -> Self {
        self.subject.document_kind = Some(kind);
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The text an output guardrail should inspect: the output if present,
    /// the input otherwise.
    pub fn output_or_input(&self) -> &str {
        self.output.as_deref().unwrap_or(&self.input)
    }

    /// Source CV text, falling back to the raw input.
    pub fn source_cv(&self) -> &str {
        self.subject.source_cv.as_deref().unwrap_or(&self.input)
    }
}
