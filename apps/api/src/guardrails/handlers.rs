use std::collections::HashMap;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::AppError;
use crate::guardrails::{
    DocumentKind, EnforcementMode, GuardrailContext, GuardrailResult, JobPosting,
    RegisteredGuardrail, Stage,
};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct GuardrailListResponse {
    pub mode: EnforcementMode,
    pub fail_fast: bool,
    pub timeout_secs: u64,
    pub input: Vec<RegisteredGuardrail>,
    pub output: Vec<RegisteredGuardrail>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub stage: Stage,
    /// CV text for the input stage, the document for the output stage.
    pub text: String,
    #[serde(default)]
    pub source_cv: Option<String>,
    #[serde(default)]
    pub job_posting_text: Option<String>,
    #[serde(default)]
    pub job_posting_url: Option<String>,
    #[serde(default)]
    pub document_kind: Option<DocumentKind>,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// GET /api/v1/guardrails
pub async fn handle_list_guardrails(
    State(state): State<AppState>,
) -> Json<GuardrailListResponse> {
    let options = state.guardrails.options();
    Json(GuardrailListResponse {
        mode: options.mode,
        fail_fast: options.fail_fast,
        timeout_secs: options.timeout.as_secs(),
        input: state.guardrails.input_guardrails().await,
        output: state.guardrails.output_guardrails().await,
    })
}

/// POST /api/v1/guardrails/validate
///
/// Dry-runs one stage over ad-hoc text. Violations are returned as a 200
/// result; nothing is generated or stored.
pub async fn handle_validate(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<GuardrailResult>, AppError> {
    let stage = request.stage;
    if stage == Stage::Output {
        if request.text.trim().is_empty() {
            return Err(AppError::Validation(
                "text (the document to validate) cannot be empty".to_string(),
            ));
        }
        if request.source_cv.as_deref().map_or(true, |cv| cv.trim().is_empty()) {
            return Err(AppError::Validation(
                "source_cv is required to validate a generated document".to_string(),
            ));
        }
    }

    let context = build_context(request);
    let result = match stage {
        Stage::Input => state.guardrails.execute_input_guardrails(&context).await,
        Stage::Output => state.guardrails.execute_output_guardrails(&context).await,
    };
    Ok(Json(result))
}

fn build_context(request: ValidateRequest) -> GuardrailContext {
    let session_id = request.session_id.unwrap_or_else(Uuid::new_v4);
    let agent = request
        .agent_name
        .unwrap_or_else(|| "guardrail-validate".to_string());

    let mut context = match request.stage {
        Stage::Input => {
            let source_cv = request.source_cv.unwrap_or_else(|| request.text.clone());
            GuardrailContext::new(agent, session_id, request.text).with_source_cv(source_cv)
        }
        Stage::Output => {
            let mut ctx = GuardrailContext::new(
                agent,
                session_id,
                request.source_cv.clone().unwrap_or_default(),
            )
            .with_output(request.text);
            if let Some(cv) = request.source_cv {
                ctx = ctx.with_source_cv(cv);
            }
            ctx
        }
    };

    if request.job_posting_text.is_some() || request.job_posting_url.is_some() {
        context = context.with_job_posting(JobPosting {
            text: request.job_posting_text,
            url: request.job_posting_url,
        });
    }
    if let Some(kind) = request.document_kind {
        context = context.with_document_kind(kind);
    }
    for (key, value) in request.metadata {
        context = context.with_metadata(key, value);
    }
    context
}
