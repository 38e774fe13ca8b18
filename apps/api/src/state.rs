use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use sqlx::PgPool;

use crate::config::Config;
use crate::guardrails::GuardrailService;
use crate::llm_client::TextModel;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub s3: S3Client,
    /// The LLM used for posting parsing and document writing. `LlmClient` in production.
    pub llm: Arc<dyn TextModel>,
    pub config: Config,
    /// Input and output guardrails, built once at startup.
    pub guardrails: Arc<GuardrailService>,
}
