use thiserror::Error;

use crate::llm_client::LlmError;

/// A guardrail could not complete its check. The service turns every one of
/// these into a deny result; they never reach the caller as errors.
#[derive(Debug, Error)]
pub enum GuardrailError {
    #[error("LLM verification failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Context is missing required field: {0}")]
    MissingField(&'static str),

    #[error("{0}")]
    Internal(String),
}
