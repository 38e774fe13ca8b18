// Only released documents and the CVs of accepted sessions reach S3.

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use serde_json::Value;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::document::{DocumentRow, DocumentStatus};
use crate::models::session::{SessionRow, SessionStatus};

pub struct NewSession<'a> {
    pub id: Uuid,
    pub candidate_name: Option<&'a str>,
    pub job_posting_text: Option<&'a str>,
    pub job_posting_url: Option<&'a str>,
}

pub struct NewDocument<'a> {
    pub id: Uuid,
    pub session_id: Uuid,
    pub kind: &'a str,
    pub status: DocumentStatus,
    pub s3_key: Option<&'a str>,
    pub word_count: i32,
    pub output_guardrail: &'a Value,
}

/// Final state written when a pipeline run ends.
pub struct SessionOutcome<'a> {
    pub status: SessionStatus,
    pub source_cv_key: Option<&'a str>,
    pub posting: Option<&'a Value>,
    pub input_guardrail: Option<&'a Value>,
    pub error: Option<&'a str>,
}

pub fn source_cv_key(session_id: Uuid, extension: &str) -> String {
    format!("sessions/{session_id}/source.{extension}")
}

pub fn document_key(session_id: Uuid, document_id: Uuid, kind: &str) -> String {
    format!("sessions/{session_id}/{document_id}-{kind}.md")
}

pub async fn insert_session(pool: &PgPool, session: &NewSession<'_>) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO sessions (id, candidate_name, job_posting_text, job_posting_url, status)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(session.id)
    .bind(session.candidate_name)
    .bind(session.job_posting_text)
    .bind(session.job_posting_url)
    .bind(SessionStatus::Processing.as_str())
    .execute(pool)
    .await?;

    info!("Created session {}", session.id);
    Ok(())
}

pub async fn finish_session(
    pool: &PgPool,
    session_id: Uuid,
    outcome: &SessionOutcome<'_>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE sessions
        SET status = $2, source_cv_key = $3, posting = $4, input_guardrail = $5,
            error = $6, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(session_id)
    .bind(outcome.status.as_str())
    .bind(outcome.source_cv_key)
    .bind(outcome.posting)
    .bind(outcome.input_guardrail)
    .bind(outcome.error)
    .execute(pool)
    .await?;

    info!(
        "Session {session_id} finished with status {}",
        outcome.status.as_str()
    );
    Ok(())
}

pub async fn insert_document(pool: &PgPool, document: &NewDocument<'_>) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO documents
            (id, session_id, kind, status, s3_key, word_count, output_guardrail)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(document.id)
    .bind(document.session_id)
    .bind(document.kind)
    .bind(document.status.as_str())
    .bind(document.s3_key)
    .bind(document.word_count)
    .bind(document.output_guardrail)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_session(pool: &PgPool, session_id: Uuid) -> Result<SessionRow, AppError> {
    sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE id = $1")
        .bind(session_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))
}

pub async fn list_documents(pool: &PgPool, session_id: Uuid) -> Result<Vec<DocumentRow>, AppError> {
    Ok(sqlx::query_as::<_, DocumentRow>(
        "SELECT * FROM documents WHERE session_id = $1 ORDER BY created_at, kind",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?)
}

pub async fn get_document(
    pool: &PgPool,
    session_id: Uuid,
    document_id: Uuid,
) -> Result<DocumentRow, AppError> {
    sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE id = $1 AND session_id = $2")
        .bind(document_id)
        .bind(session_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Document {document_id} not found in session {session_id}"
            ))
        })
}

pub async fn put_object(
    s3: &S3Client,
    bucket: &str,
    key: &str,
    body: Vec<u8>,
    content_type: &str,
) -> Result<(), AppError> {
    s3.put_object()
        .bucket(bucket)
        .key(key)
        .body(ByteStream::from(body))
        .content_type(content_type)
        .send()
        .await
        .map_err(|e| AppError::S3(format!("upload of {key} failed: {e}")))?;

    info!("Uploaded s3://{bucket}/{key}");
    Ok(())
}

pub async fn get_object(s3: &S3Client, bucket: &str, key: &str) -> Result<Bytes, AppError> {
    let object = s3
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| AppError::S3(format!("download of {key} failed: {e}")))?;

    let data = object
        .body
        .collect()
        .await
        .map_err(|e| AppError::S3(format!("reading {key} failed: {e}")))?;
    Ok(data.into_bytes())
}
