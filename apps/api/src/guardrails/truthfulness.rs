//! Fabricated skills and inflated years of experience, checked against the
//! source CV. An attached verifier also asks the LLM for unsupported claims.

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use regex::Regex;
use serde::Deserialize;

use crate::guardrails::prompts::{TRUTHFULNESS_PROMPT_TEMPLATE, TRUTHFULNESS_SYSTEM};
use crate::guardrails::{
    Guardrail, GuardrailContext, GuardrailError, GuardrailResult, OutputGuardrail, ViolationType,
};
use crate::llm_client::prompts::render_template;
use crate::llm_client::{complete_json, TextModel};

pub const NAME: &str = "truthfulness";

/// Skills checked for fabrication, lowercase. Ambiguous short words ("go",
/// "r") are left out on purpose.
const KNOWN_SKILLS: &[&str] = &[
    "rust", "python", "java", "javascript", "typescript", "golang", "c++", "c#", "kotlin",
    "swift", "scala", "ruby", "php", "elixir", "haskell", "sql", "postgresql", "mysql",
    "mongodb", "redis", "kafka", "rabbitmq", "elasticsearch", "docker", "kubernetes",
    "terraform", "ansible", "aws", "azure", "gcp", "react", "angular", "vue", "django",
    "flask", "spring boot", "node.js", "graphql", "grpc", "spark", "hadoop", "airflow",
    "tensorflow", "pytorch", "pandas", "machine learning", "tableau", "power bi",
    "salesforce", "sap", "figma", "jenkins", "linux", "scrum", "six sigma", "pmp", "cissp",
    "cpa", "prince2", "itil",
];

/// Alternative spellings that count as evidence for a skill.
const SKILL_ALIASES: &[(&str, &[&str])] = &[
    ("postgresql", &["postgres"]),
    ("kubernetes", &["k8s"]),
    ("golang", &["go lang"]),
    ("gcp", &["google cloud"]),
    ("aws", &["amazon web services"]),
    ("javascript", &["ecmascript"]),
    ("node.js", &["nodejs"]),
    ("machine learning", &["ml engineer", "ml models"]),
];

static YEARS_CLAIM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\+?\s*(?:years?|yrs?)\b").expect("years pattern is valid")
});
static CALENDAR_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19[5-9]\d|20\d\d)\b").expect("year pattern is valid"));
static ONGOING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(present|current|now|today|ongoing)\b").expect("ongoing pattern is valid")
});

/// True when `term` occurs in `haystack` delimited by non-alphanumeric chars.
/// Both arguments must already be lowercase.
fn contains_term(haystack: &str, term: &str) -> bool {
    haystack.match_indices(term).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + term.len()..].chars().next();
        !before.is_some_and(|c| c.is_alphanumeric()) && !after.is_some_and(|c| c.is_alphanumeric())
    })
}

fn cv_mentions(cv_lower: &str, skill: &str) -> bool {
    contains_term(cv_lower, skill)
        || SKILL_ALIASES
            .iter()
            .filter(|(s, _)| *s == skill)
            .flat_map(|(_, aliases)| aliases.iter())
            .any(|alias| contains_term(cv_lower, alias))
}

/// Skills named in `document` that `source_cv` never mentions, in vocabulary order.
pub fn unsupported_skills(source_cv: &str, document: &str) -> Vec<&'static str> {
    let cv = source_cv.to_lowercase();
    let doc = document.to_lowercase();
    KNOWN_SKILLS
        .iter()
        .copied()
        .filter(|skill| contains_term(&doc, skill) && !cv_mentions(&cv, skill))
        .collect()
}

fn year_claims(text: &str) -> BTreeSet<u32> {
    YEARS_CLAIM
        .captures_iter(text)
        .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse().ok()))
        .collect()
}

/// Years between the earliest and latest calendar year the CV mentions,
/// counting "present" as the current year.
fn career_span_years(source_cv: &str) -> u32 {
    let mut years: Vec<u32> = CALENDAR_YEAR
        .captures_iter(source_cv)
        .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse().ok()))
        .collect();
    if ONGOING.is_match(source_cv) {
        years.push(Utc::now().year() as u32);
    }
    match (years.iter().min(), years.iter().max()) {
        (Some(min), Some(max)) => max - min,
        _ => 0,
    }
}

/// "N years" claims in `document` that the CV cannot back up.
pub fn unsupported_year_claims(source_cv: &str, document: &str) -> Vec<u32> {
    let stated = year_claims(source_cv);
    let ceiling = stated
        .iter()
        .copied()
        .max()
        .unwrap_or(0)
        .max(career_span_years(source_cv));

    year_claims(document)
        .into_iter()
        .filter(|n| !stated.contains(n) && *n > ceiling)
        .collect()
}

#[derive(Debug, Deserialize)]
struct VerifierVerdict {
    #[serde(default)]
    unsupported_claims: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TruthfulnessRules {
    /// Unsupported skills tolerated before tripping.
    pub max_unsupported_skills: usize,
    pub check_experience_years: bool,
}

impl Default for TruthfulnessRules {
    fn default() -> Self {
        Self {
            max_unsupported_skills: 0,
            check_experience_years: true,
        }
    }
}

#[derive(Clone)]
pub struct TruthfulnessGuardrail {
    rules: TruthfulnessRules,
    priority: i32,
    verifier: Option<Arc<dyn TextModel>>,
}

impl Default for TruthfulnessGuardrail {
    fn default() -> Self {
        Self::new(TruthfulnessRules::default())
    }
}

impl TruthfulnessGuardrail {
    pub fn new(rules: TruthfulnessRules) -> Self {
        Self {
            rules,
            priority: 10,
            verifier: None,
        }
    }

    pub fn with_verifier(mut self, model: Arc<dyn TextModel>) -> Self {
        self.verifier = Some(model);
        self
    }

    async fn verify_with_model(
        &self,
        model: &dyn TextModel,
        source_cv: &str,
        document: &str,
    ) -> Result<Vec<String>, GuardrailError> {
        let prompt = render_template(
            TRUTHFULNESS_PROMPT_TEMPLATE,
            &[("source_cv", source_cv), ("document", document)],
        );
        let verdict: VerifierVerdict =
            complete_json(model, &prompt, TRUTHFULNESS_SYSTEM).await?;
        Ok(verdict
            .unsupported_claims
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect())
    }
}

#[async_trait]
impl Guardrail for TruthfulnessGuardrail {
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
        let document = context
            .output
            .as_deref()
            .ok_or(GuardrailError::MissingField("output"))?;
        let source_cv = context
            .subject
            .source_cv
            .as_deref()
            .ok_or(GuardrailError::MissingField("source_cv"))?;

        let skills = unsupported_skills(source_cv, document);
        let years = if self.rules.check_experience_years {
            unsupported_year_claims(source_cv, document)
        } else {
            Vec::new()
        };
        let claims = match &self.verifier {
            Some(model) => {
                self.verify_with_model(model.as_ref(), source_cv, document)
                    .await?
            }
            None => Vec::new(),
        };

        let mut problems = Vec::new();
        let mut recommendations = Vec::new();

        if skills.len() > self.rules.max_unsupported_skills {
            problems.push(format!(
                "skills not found in the CV: {}",
                skills.join(", ")
            ));
            recommendations.push(format!(
                "Remove or evidence these skills before use: {}",
                skills.join(", ")
            ));
        }
        if !years.is_empty() {
            let listed: Vec<String> = years.iter().map(|n| format!("{n} years")).collect();
            problems.push(format!(
                "experience claims the CV does not support: {}",
                listed.join(", ")
            ));
            recommendations
                .push("State experience durations exactly as they appear in the CV".to_string());
        }
        if !claims.is_empty() {
            problems.push(format!("{} unsupported claim(s) found on review", claims.len()));
            recommendations.extend(claims.iter().map(|c| format!("Unsupported claim: {c}")));
        }

        let verified = self.verifier.is_some();
        if problems.is_empty() {
            return Ok(GuardrailResult::pass().with_detail("llm_verified", verified));
        }

        Ok(GuardrailResult::tripwire(
            ViolationType::FabricatedContent,
            format!("Document contains {}", problems.join("; ")),
        )
        .with_recommendations(recommendations)
        .with_detail("unsupported_skills", skills)
        .with_detail("unsupported_year_claims", years)
        .with_detail("unsupported_claims", claims)
        .with_detail("llm_verified", verified))
    }
}

impl OutputGuardrail for TruthfulnessGuardrail {}
