//! Tailoring pipeline: input guardrails → posting parse → document writers →
//! output guardrails. Nothing here touches storage.

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::posting_parser::{parse_job_posting, ParsedJobPosting};
use crate::generation::prompts::{
    COVER_LETTER_PROMPT_TEMPLATE, COVER_LETTER_SYSTEM, CV_PROMPT_TEMPLATE, CV_WRITER_SYSTEM,
};
use crate::generation::tone::guidance_for;
use crate::guardrails::{DocumentKind, GuardrailContext, GuardrailResult, GuardrailService, JobPosting};
use crate::llm_client::prompts::{render_template, COMPLIANCE_INSTRUCTION, GROUNDING_INSTRUCTION};
use crate::llm_client::{strip_code_fences, TextModel};

/// Agent name of the input stage.
pub const TAILOR_AGENT: &str = "tailor";

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TailorRequest {
    pub session_id: Uuid,
    pub candidate_name: Option<String>,
    pub cv_text: String,
    pub job_posting: JobPosting,
    /// Requested kinds in output order. Duplicates are ignored.
    pub documents: Vec<DocumentKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDocument {
    pub kind: DocumentKind,
    pub content: String,
    pub guardrail: GuardrailResult,
}

impl GeneratedDocument {
    pub fn released(&self) -> bool {
        self.guardrail.allow_execution
    }
}

#[derive(Debug, Clone)]
pub enum TailorOutcome {
    /// Input guardrails denied the request. No LLM call was made.
    Rejected(GuardrailResult),
    Completed {
        posting: ParsedJobPosting,
        input_guardrail: GuardrailResult,
        documents: Vec<GeneratedDocument>,
    },
}

/// Agent name used for a document kind's output stage.
pub fn writer_agent(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Cv => "cv-writer",
        DocumentKind::CoverLetter => "cover-letter-writer",
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Runs the tailoring pipeline for one session.
///
/// Steps:
/// 1. input guardrails over CV + posting; denied → `Rejected`
/// 2. parse the posting (skipped when only a URL was supplied)
/// 3. per requested kind, concurrently: write with the LLM, then run output guardrails
pub async fn tailor_documents(
    guardrails: &GuardrailService,
    model: &dyn TextModel,
    request: &TailorRequest,
) -> Result<TailorOutcome, AppError> {
    let kinds = dedup_kinds(&request.documents);
    if kinds.is_empty() {
        return Err(AppError::Validation(
            "At least one document kind must be requested".to_string(),
        ));
    }

    // Step 1: Input guardrails
    let input_ctx = GuardrailContext::new(TAILOR_AGENT, request.session_id, &request.cv_text)
        .with_source_cv(&request.cv_text)
        .with_job_posting(request.job_posting.clone())
        .with_metadata(
            "requested_documents",
            kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
        );

    let input_guardrail = guardrails.execute_input_guardrails(&input_ctx).await;
    if !input_guardrail.allow_execution {
        info!(
            "Session {} rejected by input guardrails: {}",
            request.session_id,
            input_guardrail.message.as_deref().unwrap_or("no message")
        );
        return Ok(TailorOutcome::Rejected(input_guardrail));
    }

    // Step 2: Parse posting
    let posting = match non_empty(request.job_posting.text.as_deref()) {
        Some(text) => parse_job_posting(text, model)
            .await
            .map_err(|e| AppError::Llm(format!("Job posting parsing failed: {e}")))?,
        None => {
            warn!(
                "Session {}: no posting text, writing against the URL only",
                request.session_id
            );
            ParsedJobPosting::default()
        }
    };
    info!(
        "Session {}: posting parsed (title={:?}, tone={:?})",
        request.session_id, posting.title, posting.tone
    );

    // Step 3: Write and gate every requested document
    let documents = join_all(
        kinds
            .iter()
            .map(|&kind| write_and_gate(guardrails, model, request, &input_ctx, &posting, kind)),
    )
    .await
    .into_iter()
    .collect::<Result<Vec<_>, _>>()?;

    let released = documents.iter().filter(|d| d.released()).count();
    info!(
        "Session {}: {} of {} documents released",
        request.session_id,
        released,
        documents.len()
    );

    Ok(TailorOutcome::Completed {
        posting,
        input_guardrail,
        documents,
    })
}

async fn write_and_gate(
    guardrails: &GuardrailService,
    model: &dyn TextModel,
    request: &TailorRequest,
    input_ctx: &GuardrailContext,
    posting: &ParsedJobPosting,
    kind: DocumentKind,
) -> Result<GeneratedDocument, AppError> {
    let (system, prompt) = build_writer_prompt(kind, request, posting);

    let reply = model
        .complete(&prompt, system)
        .await
        .map_err(|e| AppError::Llm(format!("{} generation failed: {e}", kind.as_str())))?;
    let content = strip_code_fences(&reply).to_string();
    if content.is_empty() {
        return Err(AppError::Llm(format!(
            "{} generation returned an empty document",
            kind.as_str()
        )));
    }

    let output_ctx = input_ctx.for_output(writer_agent(kind), kind, content.as_str());
    let guardrail = guardrails.execute_output_guardrails(&output_ctx).await;
    if !guardrail.allow_execution {
        warn!(
            "Session {}: {} blocked by output guardrails: {}",
            request.session_id,
            kind.as_str(),
            guardrail.message.as_deref().unwrap_or("no message")
        );
    }

    Ok(GeneratedDocument {
        kind,
        content,
        guardrail,
    })
}

fn build_writer_prompt(
    kind: DocumentKind,
    request: &TailorRequest,
    posting: &ParsedJobPosting,
) -> (&'static str, String) {
    let (system, template) = match kind {
        DocumentKind::Cv => (CV_WRITER_SYSTEM, CV_PROMPT_TEMPLATE),
        DocumentKind::CoverLetter => (COVER_LETTER_SYSTEM, COVER_LETTER_PROMPT_TEMPLATE),
    };

    let mut posting_summary = posting.summary();
    if let Some(url) = non_empty(request.job_posting.url.as_deref()) {
        posting_summary.push_str(&format!("\nPosting URL: {url}"));
    }

    let candidate_name = non_empty(request.candidate_name.as_deref())
        .unwrap_or("(use the name shown in the CV)");

    let tone_guidance = guidance_for(posting.tone).render();
    let prompt = render_template(
        template,
        &[
            ("grounding_instruction", GROUNDING_INSTRUCTION),
            ("compliance_instruction", COMPLIANCE_INSTRUCTION),
            ("tone_guidance", tone_guidance.as_str()),
            ("candidate_name", candidate_name),
            ("posting_summary", posting_summary.as_str()),
            ("source_cv", request.cv_text.as_str()),
        ],
    );

    (system, prompt)
}

fn dedup_kinds(kinds: &[DocumentKind]) -> Vec<DocumentKind> {
    let mut out = Vec::with_capacity(kinds.len());
    for kind in kinds {
        if !out.contains(kind) {
            out.push(*kind);
        }
    }
    out
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::prompts::POSTING_PARSE_SYSTEM;
    use crate::guardrails::{build_guardrail_service, ServiceOptions, ViolationType};
    use crate::llm_client::LlmError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CV: &str = "Jane Doe\nBackend Engineer\n\nExperience\n\
        Acme Payments (2018 - present): built settlement services in Rust and PostgreSQL, \
        cut batch latency by 40% and mentored three engineers.\n\n\
        Education\nBSc Computer Science, University of Leeds, 2014 - 2017\n\n\
        Skills\nRust, PostgreSQL, Docker, AWS";

    const POSTING: &str = "Senior Backend Engineer at Globex. We are looking for an engineer \
        to join our payments team. Responsibilities: build Rust services. Requirements: \
        PostgreSQL and AWS experience.";

    const POSTING_JSON: &str = r#"{"title": "Senior Backend Engineer", "company": "Globex",
        "hard_requirements": [{"text": "PostgreSQL"}], "keywords": ["Rust"], "tone": "ProductOriented"}"#;

    /// A clean document of roughly 220 words with no repeated lines.
    fn document(intro: &str) -> String {
        let mut lines = vec![intro.to_string()];
        for i in 1..=24 {
            lines.push(format!(
                "Delivered settlement improvement number {i} for the payments platform."
            ));
        }
        lines.join("\n")
    }

    /// Routes on the system prompt; counts every call.
    struct ScriptedModel {
        cv: String,
        cover_letter: String,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(cv: String, cover_letter: String) -> Self {
            Self {
                cv,
                cover_letter,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TextModel for ScriptedModel {
        async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(!prompt.contains("{source_cv}"), "unfilled placeholder");
            if system == POSTING_PARSE_SYSTEM {
                Ok(POSTING_JSON.to_string())
            } else if system == CV_WRITER_SYSTEM {
                Ok(self.cv.clone())
            } else if system == COVER_LETTER_SYSTEM {
                Ok(self.cover_letter.clone())
            } else {
                Err(LlmError::EmptyContent)
            }
        }
    }

    fn request(documents: Vec<DocumentKind>) -> TailorRequest {
        TailorRequest {
            session_id: Uuid::new_v4(),
            candidate_name: Some("Jane Doe".to_string()),
            cv_text: CV.to_string(),
            job_posting: JobPosting {
                text: Some(POSTING.to_string()),
                url: Some("https://jobs.globex.example/123".to_string()),
            },
            documents,
        }
    }

    async fn service() -> GuardrailService {
        build_guardrail_service(ServiceOptions::default(), None).await
    }

    #[tokio::test]
    async fn test_both_documents_released() {
        let model = ScriptedModel::new(
            document("Jane Doe, backend engineer working in Rust."),
            document("Dear Globex hiring team, I build Rust services on AWS."),
        );
        let outcome = tailor_documents(
            &service().await,
            &model,
            &request(vec![DocumentKind::Cv, DocumentKind::CoverLetter]),
        )
        .await
        .unwrap();

        let TailorOutcome::Completed {
            posting,
            input_guardrail,
            documents,
        } = outcome
        else {
            panic!("expected completed outcome");
        };
        assert!(input_guardrail.allow_execution);
        assert_eq!(posting.company.as_deref(), Some("Globex"));
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].kind, DocumentKind::Cv);
        assert_eq!(documents[1].kind, DocumentKind::CoverLetter);
        assert!(documents.iter().all(GeneratedDocument::released));
        // posting parse + two writers
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_input_rejection_skips_the_model() {
        let model = ScriptedModel::new(String::new(), String::new());
        let mut req = request(vec![DocumentKind::Cv]);
        req.job_posting = JobPosting::default();

        let outcome = tailor_documents(&service().await, &model, &req)
            .await
            .unwrap();

        let TailorOutcome::Rejected(result) = outcome else {
            panic!("expected rejection");
        };
        assert!(!result.allow_execution);
        assert_eq!(result.violation_type, Some(ViolationType::InvalidJobPosting));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fabricating_document_is_blocked_alone() {
        let model = ScriptedModel::new(
            document("Jane Doe, backend engineer working in Rust."),
            document("Dear Globex hiring team, I am a Kafka and TensorFlow expert."),
        );
        let outcome = tailor_documents(
            &service().await,
            &model,
            &request(vec![DocumentKind::Cv, DocumentKind::CoverLetter]),
        )
        .await
        .unwrap();

        let TailorOutcome::Completed { documents, .. } = outcome else {
            panic!("expected completed outcome");
        };
        assert!(documents[0].released());
        assert!(!documents[1].released());
        assert_eq!(
            documents[1].guardrail.violation_type,
            Some(ViolationType::FabricatedContent)
        );
    }

    #[tokio::test]
    async fn test_duplicate_kinds_are_generated_once() {
        let model = ScriptedModel::new(document("Jane Doe, Rust engineer."), String::new());
        let outcome = tailor_documents(
            &service().await,
            &model,
            &request(vec![DocumentKind::Cv, DocumentKind::Cv]),
        )
        .await
        .unwrap();
        let TailorOutcome::Completed { documents, .. } = outcome else {
            panic!("expected completed outcome");
        };
        assert_eq!(documents.len(), 1);
    }

    #[tokio::test]
    async fn test_url_only_posting_skips_parsing() {
        let model = ScriptedModel::new(document("Jane Doe, Rust engineer."), String::new());
        let mut req = request(vec![DocumentKind::Cv]);
        req.job_posting.text = None;

        let outcome = tailor_documents(&service().await, &model, &req)
            .await
            .unwrap();
        let TailorOutcome::Completed { posting, .. } = outcome else {
            panic!("expected completed outcome");
        };
        assert_eq!(posting, ParsedJobPosting::default());
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_writer_reply_is_an_error() {
        let model = ScriptedModel::new("```\n```".to_string(), String::new());
        let result =
            tailor_documents(&service().await, &model, &request(vec![DocumentKind::Cv])).await;
        assert!(matches!(result, Err(AppError::Llm(_))));
    }

    #[tokio::test]
    async fn test_no_requested_documents_is_invalid() {
        let model = ScriptedModel::new(String::new(), String::new());
        let result = tailor_documents(&service().await, &model, &request(vec![])).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_writer_prompt_is_fully_filled() {
        let req = request(vec![DocumentKind::CoverLetter]);
        let (system, prompt) =
            build_writer_prompt(DocumentKind::CoverLetter, &req, &ParsedJobPosting::default());
        assert_eq!(system, COVER_LETTER_SYSTEM);
        assert!(!prompt.contains('{'));
        assert!(prompt.contains("Posting URL: https://jobs.globex.example/123"));
        assert!(prompt.contains("CANDIDATE NAME: Jane Doe"));
    }

    #[test]
    fn test_posting_text_cannot_pull_in_the_cv() {
        let mut req = request(vec![DocumentKind::CoverLetter]);
        req.job_posting.url = Some("https://jobs.globex.example/{source_cv}".to_string());
        let posting = ParsedJobPosting {
            title: Some("Engineer {source_cv}".to_string()),
            ..ParsedJobPosting::default()
        };

        let (_, prompt) = build_writer_prompt(DocumentKind::CoverLetter, &req, &posting);
        assert_eq!(prompt.matches("Acme Payments").count(), 1);
        assert!(prompt.contains("Role: Engineer {source_cv}"));
        assert!(prompt.contains("Posting URL: https://jobs.globex.example/{source_cv}"));
    }
}
