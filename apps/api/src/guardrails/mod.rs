// Guardrails: prioritized validators that gate LLM work. Input guardrails run
// before generation, output guardrails over every generated document.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

pub mod compliance;
pub mod context;
pub mod cv_content;
pub mod document_quality;
pub mod error;
pub mod handlers;
pub mod job_posting;
pub mod privacy;
mod prompts;
pub mod result;
pub mod service;
pub mod truthfulness;

pub use context::{DocumentKind, GuardrailContext, JobPosting};
pub use error::GuardrailError;
pub use result::{GuardrailResult, ViolationType};
pub use service::{EnforcementMode, GuardrailService, RegisteredGuardrail, ServiceOptions, Stage};

use crate::llm_client::TextModel;
use compliance::ComplianceGuardrail;
use cv_content::CvContentGuardrail;
use document_quality::DocumentQualityGuardrail;
use job_posting::JobPostingGuardrail;
use privacy::PrivacyGuardrail;
use truthfulness::TruthfulnessGuardrail;

/// A named, prioritized validation step.
///
/// Lower priorities run first. Implementations must be stateless or
/// synchronize their own state: the service may call guardrails sharing a
/// priority concurrently.
#[async_trait]
pub trait Guardrail: Send + Sync {
    /// Stable name used in logs and result details.
    fn name(&self) -> &str;

    fn priority(&self) -> i32;

    async fn validate(&self, context: &GuardrailContext)
        -> Result<GuardrailResult, GuardrailError>;
}

/// Marker for guardrails that may run before generation.
pub trait InputGuardrail: Guardrail {}

/// Marker for guardrails that may run over generated documents.
pub trait OutputGuardrail: Guardrail {}

/// Builds the service with the built-in guardrail set.
///
/// `verifier` attaches LLM claim verification to the truthfulness guardrail.
pub async fn build_guardrail_service(
    options: ServiceOptions,
    verifier: Option<Arc<dyn TextModel>>,
) -> GuardrailService {
    let service = GuardrailService::new(options);

    service
        .register_input_guardrail(JobPostingGuardrail::default())
        .await;
    service
        .register_input_guardrail(CvContentGuardrail::default())
        .await;
    service
        .register_input_guardrail(PrivacyGuardrail::default())
        .await;

    let truthfulness = match verifier {
        Some(model) => TruthfulnessGuardrail::default().with_verifier(model),
        None => TruthfulnessGuardrail::default(),
    };
    service.register_output_guardrail(truthfulness).await;
    service
        .register_output_guardrail(DocumentQualityGuardrail::default())
        .await;
    service
        .register_output_guardrail(PrivacyGuardrail::default())
        .await;
    service
        .register_output_guardrail(ComplianceGuardrail::default())
        .await;

    info!(
        "Guardrail service ready (mode={}, fail_fast={}, timeout={}s)",
        service.options().mode.as_str(),
        service.options().fail_fast,
        service.options().timeout.as_secs()
    );

    service
}
