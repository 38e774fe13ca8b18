use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category of a guardrail violation. Carried on a tripped result so callers
/// can branch on the kind of problem without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    InvalidJobPosting,
    InsufficientContent,
    PromptInjection,
    FabricatedContent,
    LowQuality,
    PrivacyRisk,
    ComplianceRisk,
    /// The guardrail itself errored, panicked or timed out.
    GuardrailFailure,
}

/// Outcome of a single guardrail invocation, or the aggregate of a whole stage.
///
/// Violations are data: a tripped result is still an `Ok` value. Errors are
/// reserved for guardrails that could not run at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub tripwire_triggered: bool,
    pub violation_type: Option<ViolationType>,
    pub message: Option<String>,
    #[serde(default)]
    pub details: HashMap<String, Value>,
    pub allow_execution: bool,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl Default for GuardrailResult {
    fn default() -> Self {
        Self::pass()
    }
}

impl GuardrailResult {
    /// A passing result: no tripwire, execution allowed.
    pub fn pass() -> Self {
        Self {
            tripwire_triggered: false,
            violation_type: None,
            message: None,
            details: HashMap::new(),
            allow_execution: true,
            recommendations: Vec::new(),
        }
    }

    /// A tripped result that denies execution.
    pub fn tripwire(violation_type: ViolationType, message: impl Into<String>) -> Self {
        Self {
            tripwire_triggered: true,
            violation_type: Some(violation_type),
            message: Some(message.into()),
            details: HashMap::new(),
            allow_execution: false,
            recommendations: Vec::new(),
        }
    }

    /// Deny result for a guardrail that could not complete its check.
    pub fn failure(guardrail: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::tripwire(
            ViolationType::GuardrailFailure,
            format!("Guardrail '{guardrail}' failed: {reason}"),
        )
        .with_detail("failed_guardrail", guardrail)
        .with_recommendation(format!(
            "Guardrail '{guardrail}' could not validate this content. Retry the request later."
        ))
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendations.push(recommendation.into());
        self
    }

    pub fn with_recommendations<I, S>(mut self, recommendations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recommendations
            .extend(recommendations.into_iter().map(Into::into));
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn is_failure(&self) -> bool {
        self.violation_type == Some(ViolationType::GuardrailFailure)
    }
}
