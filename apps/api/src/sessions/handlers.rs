use anyhow::anyhow;
use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::documents::{extract_text, DocumentFormat};
use crate::errors::AppError;
use crate::generation::generator::{
    tailor_documents, GeneratedDocument, TailorOutcome, TailorRequest,
};
use crate::generation::posting_parser::ParsedJobPosting;
use crate::guardrails::{DocumentKind, GuardrailResult, JobPosting};
use crate::models::document::{DocumentRow, DocumentStatus};
use crate::models::session::{SessionRow, SessionStatus};
use crate::sessions::store::{
    document_key, finish_session, get_document, get_object, get_session, insert_document,
    insert_session, list_documents, put_object, source_cv_key, NewDocument, NewSession,
    SessionOutcome,
};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct CvUpload {
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Bytes,
}

#[derive(Debug, Default)]
struct SessionForm {
    cv: Option<CvUpload>,
    job_posting_text: Option<String>,
    job_posting_url: Option<String>,
    candidate_name: Option<String>,
    documents: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub kind: String,
    pub status: String,
    pub word_count: i32,
    /// Present only for released documents.
    pub download_url: Option<String>,
    pub guardrail: Value,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub status: String,
    pub candidate_name: Option<String>,
    pub job_posting_url: Option<String>,
    pub posting: Option<Value>,
    pub input_guardrail: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub documents: Vec<DocumentSummary>,
}

impl SessionResponse {
    fn from_rows(session: SessionRow, documents: Vec<DocumentRow>) -> Self {
        let downloadable = session.is_completed();
        let documents = documents
            .into_iter()
            .map(|d| DocumentSummary {
                download_url: (downloadable && d.is_released()).then(|| {
                    format!("/api/v1/sessions/{}/documents/{}", d.session_id, d.id)
                }),
                id: d.id,
                kind: d.kind,
                status: d.status,
                word_count: d.word_count,
                guardrail: d.output_guardrail,
            })
            .collect();

        Self {
            id: session.id,
            status: session.status,
            candidate_name: session.candidate_name,
            job_posting_url: session.job_posting_url,
            posting: session.posting,
            input_guardrail: session.input_guardrail,
            error: session.error,
            created_at: session.created_at,
            documents,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/sessions
///
/// Multipart fields: `cv` (file), `job_posting_text`, `job_posting_url`,
/// `candidate_name`, `documents` (`cv`, `cover_letter` or `both`).
/// Input-guardrail rejections answer 422 with the aggregate result.
pub async fn handle_create_session(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let form = read_form(multipart).await?;
    let documents = parse_document_selection(form.documents.as_deref())?;
    let upload = form
        .cv
        .ok_or_else(|| AppError::Validation("cv file is required".to_string()))?;

    let format = DocumentFormat::detect(upload.file_name.as_deref(), upload.content_type.as_deref())?;
    let cv_bytes = upload.bytes.clone();
    let cv_text = tokio::task::spawn_blocking(move || extract_text(format, &cv_bytes))
        .await
        .map_err(|e| AppError::Internal(anyhow!("CV extraction task failed: {e}")))??;

    let session_id = Uuid::new_v4();
    insert_session(
        &state.db,
        &NewSession {
            id: session_id,
            candidate_name: form.candidate_name.as_deref(),
            job_posting_text: form.job_posting_text.as_deref(),
            job_posting_url: form.job_posting_url.as_deref(),
        },
    )
    .await?;

    let request = TailorRequest {
        session_id,
        candidate_name: form.candidate_name,
        cv_text,
        job_posting: JobPosting {
            text: form.job_posting_text,
            url: form.job_posting_url,
        },
        documents,
    };

    let outcome = match tailor_documents(&state.guardrails, state.llm.as_ref(), &request).await {
        Ok(outcome) => outcome,
        Err(e) => return Err(fail_session(&state, session_id, e).await),
    };

    match outcome {
        TailorOutcome::Rejected(result) => {
            let report = to_json(&result)?;
            finish_session(
                &state.db,
                session_id,
                &SessionOutcome {
                    status: SessionStatus::Rejected,
                    source_cv_key: None,
                    posting: None,
                    input_guardrail: Some(&report),
                    error: None,
                },
            )
            .await?;
            Err(AppError::GuardrailBlocked(
                result.with_detail("session_id", session_id.to_string()),
            ))
        }
        TailorOutcome::Completed {
            posting,
            input_guardrail,
            documents,
        } => {
            if let Err(e) = persist_completed(
                &state,
                session_id,
                format,
                upload.bytes,
                &posting,
                &input_guardrail,
                &documents,
            )
            .await
            {
                return Err(fail_session(&state, session_id, e).await);
            }

            let session = get_session(&state.db, session_id).await?;
            let rows = list_documents(&state.db, session_id).await?;
            Ok((
                StatusCode::CREATED,
                Json(SessionResponse::from_rows(session, rows)),
            ))
        }
    }
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = get_session(&state.db, session_id).await?;
    let documents = list_documents(&state.db, session_id).await?;
    Ok(Json(SessionResponse::from_rows(session, documents)))
}

/// GET /api/v1/sessions/:id/documents/:document_id
///
/// Streams a released document. Blocked documents answer 422 with the
/// output guardrail result that blocked them.
pub async fn handle_download_document(
    State(state): State<AppState>,
    Path((session_id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, AppError> {
    let session = get_session(&state.db, session_id).await?;
    ensure_downloadable(&session)?;
    let document = get_document(&state.db, session_id, document_id).await?;

    if !document.is_released() {
        let result: GuardrailResult = serde_json::from_value(document.output_guardrail)
            .map_err(|e| AppError::Internal(anyhow!("Stored guardrail report is invalid: {e}")))?;
        return Err(AppError::GuardrailBlocked(result));
    }

    let key = document.s3_key.ok_or_else(|| {
        AppError::Internal(anyhow!("Released document {document_id} has no object key"))
    })?;
    let body = get_object(&state.s3, &state.config.s3_bucket, &key).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.md\"", document.kind),
            ),
        ],
        body,
    )
        .into_response())
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

/// Documents of a failed run may be partially persisted and are never served.
fn ensure_downloadable(session: &SessionRow) -> Result<(), AppError> {
    if session.is_completed() {
        return Ok(());
    }
    Err(AppError::NotFound(format!(
        "Session {} has no downloadable documents (status '{}')",
        session.id, session.status
    )))
}

async fn read_form(mut multipart: Multipart) -> Result<SessionForm, AppError> {
    let mut form = SessionForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "cv" => {
                let file_name = field.file_name().map(String::from);
                let content_type = field.content_type().map(String::from);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Could not read cv upload: {e}")))?;
                form.cv = Some(CvUpload {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            "job_posting_text" | "job_posting_url" | "candidate_name" | "documents" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Could not read {name}: {e}")))?;
                let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());
                match name.as_str() {
                    "job_posting_text" => form.job_posting_text = value,
                    "job_posting_url" => form.job_posting_url = value,
                    "candidate_name" => form.candidate_name = value,
                    _ => form.documents = value,
                }
            }
            other => warn!("Ignoring unknown multipart field '{other}'"),
        }
    }

    Ok(form)
}

/// `cv`, `cover_letter` or `both` (the default).
fn parse_document_selection(value: Option<&str>) -> Result<Vec<DocumentKind>, AppError> {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("both") => Ok(vec![DocumentKind::Cv, DocumentKind::CoverLetter]),
        Some("cv") => Ok(vec![DocumentKind::Cv]),
        Some("cover_letter" | "cover-letter") => Ok(vec![DocumentKind::CoverLetter]),
        Some(other) => Err(AppError::Validation(format!(
            "documents must be 'cv', 'cover_letter' or 'both', got '{other}'"
        ))),
    }
}

async fn persist_completed(
    state: &AppState,
    session_id: Uuid,
    format: DocumentFormat,
    cv_bytes: Bytes,
    posting: &ParsedJobPosting,
    input_guardrail: &GuardrailResult,
    documents: &[GeneratedDocument],
) -> Result<(), AppError> {
    let bucket = &state.config.s3_bucket;

    let cv_key = source_cv_key(session_id, format.extension());
    put_object(
        &state.s3,
        bucket,
        &cv_key,
        cv_bytes.to_vec(),
        format.content_type(),
    )
    .await?;

    for document in documents {
        let document_id = Uuid::new_v4();
        let kind = document.kind.as_str();
        let report = to_json(&document.guardrail)?;

        let (status, key) = if document.released() {
            let key = document_key(session_id, document_id, kind);
            put_object(
                &state.s3,
                bucket,
                &key,
                document.content.clone().into_bytes(),
                "text/markdown; charset=utf-8",
            )
            .await?;
            (DocumentStatus::Released, Some(key))
        } else {
            (DocumentStatus::Blocked, None)
        };

        insert_document(
            &state.db,
            &NewDocument {
                id: document_id,
                session_id,
                kind,
                status,
                s3_key: key.as_deref(),
                word_count: document.content.split_whitespace().count() as i32,
                output_guardrail: &report,
            },
        )
        .await?;
    }

    let posting = to_json(posting)?;
    let input_report = to_json(input_guardrail)?;
    finish_session(
        &state.db,
        session_id,
        &SessionOutcome {
            status: SessionStatus::Completed,
            source_cv_key: Some(&cv_key),
            posting: Some(&posting),
            input_guardrail: Some(&input_report),
            error: None,
        },
    )
    .await?;

    info!(
        "Session {session_id} completed with {} documents",
        documents.len()
    );
    Ok(())
}

/// Marks the session failed and hands back the original error.
async fn fail_session(state: &AppState, session_id: Uuid, error: AppError) -> AppError {
    let message = error.to_string();
    let outcome = SessionOutcome {
        status: SessionStatus::Failed,
        source_cv_key: None,
        posting: None,
        input_guardrail: None,
        error: Some(&message),
    };
    if let Err(e) = finish_session(&state.db, session_id, &outcome).await {
        warn!("Could not mark session {session_id} failed: {e}");
    }
    error
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::Internal(anyhow!("Failed to serialize report: {e}")))
}
