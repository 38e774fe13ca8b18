use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::guardrails::{
    Guardrail, GuardrailContext, GuardrailError, GuardrailResult, OutputGuardrail, ViolationType,
};

pub const NAME: &str = "compliance";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectedAttribute {
    Age,
    MaritalStatus,
    Religion,
    Gender,
    Health,
    Nationality,
}

impl ProtectedAttribute {
    pub const ALL: [ProtectedAttribute; 6] = [
        ProtectedAttribute::Age,
        ProtectedAttribute::MaritalStatus,
        ProtectedAttribute::Religion,
        ProtectedAttribute::Gender,
        ProtectedAttribute::Health,
        ProtectedAttribute::Nationality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtectedAttribute::Age => "age",
            ProtectedAttribute::MaritalStatus => "marital_status",
            ProtectedAttribute::Religion => "religion",
            ProtectedAttribute::Gender => "gender",
            ProtectedAttribute::Health => "health",
            ProtectedAttribute::Nationality => "nationality",
        }
    }

    fn pattern(&self) -> &'static Regex {
        match self {
            ProtectedAttribute::Age => &*AGE,
            ProtectedAttribute::MaritalStatus => &*MARITAL_STATUS,
            ProtectedAttribute::Religion => &*RELIGION,
            ProtectedAttribute::Gender => &*GENDER,
            ProtectedAttribute::Health => &*HEALTH,
            ProtectedAttribute::Nationality => &*NATIONALITY,
        }
    }
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("compliance pattern is valid")
}

static AGE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)\b(?:age\s*:\s*\d{2}|aged\s+\d{2}|\d{2}[\s-]*(?:years?|yrs?)[\s-]+old)\b")
});
static MARITAL_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)\b(?:marital\s+status|married\s+with|single\s+(?:mother|father|parent)|divorced|widowed)\b")
});
static RELIGION: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)\b(?:religion\s*:|religious\s+beliefs?|devout\s+\w+|practi[cs]ing\s+(?:christian|muslim|jew|jewish|hindu|catholic|sikh|buddhist))")
});
static GENDER: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(?:gender\s*:|sex\s*:\s*(?:male|female|m|f)\b)"));
static HEALTH: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)\b(?:pregnan(?:t|cy)|(?:my|registered)\s+disabilit(?:y|ies)|medical\s+condition|health\s*:)")
});
static NATIONALITY: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)\b(?:nationality\s*:|ethnicity\s*:|ethnic\s+origin|race\s*:)")
});

/// Protected attributes referenced in `text`, in `attributes` order.
pub fn detect(text: &str, attributes: &[ProtectedAttribute]) -> Vec<ProtectedAttribute> {
    attributes
        .iter()
        .copied()
        .filter(|a| a.pattern().is_match(text))
        .collect()
}

#[derive(Debug, Clone)]
pub struct ComplianceRules {
    pub attributes: Vec<ProtectedAttribute>,
}

impl Default for ComplianceRules {
    fn default() -> Self {
        Self {
            attributes: ProtectedAttribute::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComplianceGuardrail {
    rules: ComplianceRules,
    priority: i32,
}

impl Default for ComplianceGuardrail {
    fn default() -> Self {
        Self::new(ComplianceRules::default())
    }
}

impl ComplianceGuardrail {
    pub fn new(rules: ComplianceRules) -> Self {
        Self {
            rules,
            priority: 40,
        }
    }
}

#[async_trait]
impl Guardrail for ComplianceGuardrail {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn validate(
        &self,
        context: &GuardrailContext,
    ) -> Result<GuardrailResult, GuardrailError> {
        let found = detect(context.output_or_input(), &self.rules.attributes);
        if found.is_empty() {
            return Ok(GuardrailResult::pass());
        }

        let labels: Vec<&str> = found.iter().map(ProtectedAttribute::as_str).collect();
        Ok(GuardrailResult::tripwire(
            ViolationType::ComplianceRisk,
            format!("Document references protected characteristics: {}", labels.join(", ")),
        )
        .with_recommendations(
            labels
                .iter()
                .map(|l| format!("Remove references to {}", l.replace('_', " "))),
        )
        .with_detail("categories", labels))
    }
}

impl OutputGuardrail for ComplianceGuardrail {}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn run(text: &str) -> GuardrailResult {
        let ctx = GuardrailContext::new("tailor", Uuid::new_v4(), "").with_output(text);
        ComplianceGuardrail::default().validate(&ctx).await.unwrap()
    }

    #[test]
    fn test_detect_each_attribute() {
        let cases = [
            ("Age: 34", ProtectedAttribute::Age),
            ("a 52-year-old engineer", ProtectedAttribute::Age),
            ("Married with two children", ProtectedAttribute::MaritalStatus),
            ("Religion: Catholic", ProtectedAttribute::Religion),
            ("Gender: female", ProtectedAttribute::Gender),
            ("I am currently pregnant", ProtectedAttribute::Health),
            ("Nationality: French", ProtectedAttribute::Nationality),
        ];
        for (text, expected) in cases {
            assert_eq!(
                detect(text, &ProtectedAttribute::ALL),
                vec![expected],
                "{text}"
            );
        }
    }

    #[test]
    fn test_ordinary_career_text_is_clean() {
        let text = "Christian Smith. 8 years of experience leading platform teams. \
            Built accessibility tooling for public services. Health-tech start-up, 2019-2024.";
        assert!(detect(text, &ProtectedAttribute::ALL).is_empty());
    }

    #[tokio::test]
    async fn test_protected_reference_trips() {
        let r = run("Senior engineer, aged 45, divorced.").await;
        assert_eq!(r.violation_type, Some(ViolationType::ComplianceRisk));
        assert_eq!(
            r.details["categories"],
            serde_json::json!(["age", "marital_status"])
        );
        assert_eq!(r.recommendations[1], "Remove references to marital status");
    }

    #[tokio::test]
    async fn test_disabled_attribute_is_ignored() {
        let guardrail = ComplianceGuardrail::new(ComplianceRules {
            attributes: vec![ProtectedAttribute::Religion],
        });
        let ctx = GuardrailContext::new("tailor", Uuid::new_v4(), "").with_output("Age: 30");
        let r = guardrail.validate(&ctx).await.unwrap();
        assert!(!r.tripwire_triggered);
    }
}
