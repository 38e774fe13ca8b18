use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

use crate::guardrails::{
    Guardrail, GuardrailContext, GuardrailError, GuardrailResult, InputGuardrail, ViolationType,
};

pub const NAME: &str = "cv-content";

/// Section headings a CV normally has. Matched case-insensitively.
const SECTION_HEADINGS: &[&str] = &[
    "experience",
    "employment",
    "work history",
    "education",
    "skills",
    "projects",
    "certifications",
    "qualifications",
    "summary",
    "profile",
];

static INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)ignore\s+(all\s+)?(previous|prior|above)\s+(instructions|prompts?)",
        r"(?i)disregard\s+(all\s+)?(previous|prior|above)",
        r"(?i)you\s+are\s+now\s+(a|an|the)\b",
        r"(?i)\bsystem\s+prompt\b",
        r"(?i)reveal\s+(your|the)\s+(instructions|prompt)",
        r"(?i)</?\s*(system|assistant)\s*>",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("injection pattern is valid"))
    .collect()
});

#[derive(Debug, Clone)]
pub struct CvContentRules {
    pub min_chars: usize,
    pub max_chars: usize,
    pub min_sections: usize,
}

impl Default for CvContentRules {
    fn default() -> Self {
        Self {
            min_chars: 200,
            max_chars: 60_000,
            min_sections: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CvContentGuardrail {
    rules: CvContentRules,
    priority: i32,
}

impl Default for CvContentGuardrail {
    fn default() -> Self {
        Self::new(CvContentRules::default())
    }
}

impl CvContentGuardrail {
    pub fn new(rules: CvContentRules) -> Self {
        Self {
            rules,
            priority: 20,
        }
    }
}

/// Returns the section headings found in `text`, in `SECTION_HEADINGS` order.
pub fn detect_sections(text: &str) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    SECTION_HEADINGS
        .iter()
        .copied()
        .filter(|h| lower.contains(h))
        .collect()
}

#[async_trait]
impl Guardrail for CvContentGuardrail {
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
        let cv = context.source_cv().trim();
        let chars = cv.chars().count();

        if cv.is_empty() {
            return Ok(
                GuardrailResult::tripwire(ViolationType::InsufficientContent, "CV is empty")
                    .with_recommendation(
                        "Upload a CV as PDF, Word or plain text with selectable text",
                    ),
            );
        }

        if chars < self.rules.min_chars {
            return Ok(GuardrailResult::tripwire(
                ViolationType::InsufficientContent,
                format!(
                    "CV is too short ({chars} characters, minimum {})",
                    self.rules.min_chars
                ),
            )
            .with_recommendation(
                "Upload your full CV; scanned images without a text layer cannot be read",
            )
            .with_detail("chars", chars));
        }

        if chars > self.rules.max_chars {
            return Ok(GuardrailResult::tripwire(
                ViolationType::InsufficientContent,
                format!(
                    "CV is too long ({chars} characters, maximum {})",
                    self.rules.max_chars
                ),
            )
            .with_recommendation("Trim the CV to your professional history")
            .with_detail("chars", chars));
        }

        let injections = INJECTION_PATTERNS
            .iter()
            .filter(|p| p.is_match(cv))
            .count();
        if injections > 0 {
            return Ok(GuardrailResult::tripwire(
                ViolationType::PromptInjection,
                "CV contains instructions aimed at the AI writer",
            )
            .with_recommendation("Remove any text addressed to the AI rather than to employers")
            .with_detail("pattern_matches", injections));
        }

        let sections = detect_sections(cv);
        if sections.len() < self.rules.min_sections {
            return Ok(GuardrailResult::tripwire(
                ViolationType::InsufficientContent,
                format!(
                    "CV has too few recognisable sections ({} found, minimum {})",
                    sections.len(),
                    self.rules.min_sections
                ),
            )
            .with_recommendation("Add headed sections such as Experience, Education and Skills")
            .with_detail("sections", sections));
        }

        Ok(GuardrailResult::pass()
            .with_detail("chars", chars)
            .with_detail("sections", sections))
    }
}

impl InputGuardrail for CvContentGuardrail {}
