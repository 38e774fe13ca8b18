use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::guardrails::{
    DocumentKind, Guardrail, GuardrailContext, GuardrailError, GuardrailResult, OutputGuardrail,
    ViolationType,
};

pub const NAME: &str = "document-quality";

static PLACEHOLDERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\[(?:your|candidate|company|employer|hiring manager|job title|role|insert|name|date)[^\]]{0,40}\]",
        r"(?i)\blorem ipsum\b",
        r"\{\{[^}]*\}\}",
        r"\b(?:TODO|TBD|XXX)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("placeholder pattern is valid"))
    .collect()
});

static MODEL_ARTIFACTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"```",
        r"(?i)\bas an ai\b",
        r"(?i)\blanguage model\b",
        r"(?i)^\s*(?:sure|certainly)[,!]\s+here",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("artifact pattern is valid"))
    .collect()
});

#[derive(Debug, Clone)]
pub struct DocumentQualityRules {
    pub cv_words: RangeInclusive<usize>,
    pub cover_letter_words: RangeInclusive<usize>,
    /// Lines shorter than this are ignored by the repetition check.
    pub min_repeated_line_chars: usize,
}

impl Default for DocumentQualityRules {
    fn default() -> Self {
        Self {
            cv_words: 150..=1200,
            cover_letter_words: 150..=600,
            min_repeated_line_chars: 20,
        }
    }
}

impl DocumentQualityRules {
    fn word_bounds(&self, kind: DocumentKind) -> &RangeInclusive<usize> {
        match kind {
            DocumentKind::Cv => &self.cv_words,
            DocumentKind::CoverLetter => &self.cover_letter_words,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentQualityGuardrail {
    rules: DocumentQualityRules,
    priority: i32,
}

impl Default for DocumentQualityGuardrail {
    fn default() -> Self {
        Self::new(DocumentQualityRules::default())
    }
}

impl DocumentQualityGuardrail {
    pub fn new(rules: DocumentQualityRules) -> Self {
        Self {
            rules,
            priority: 20,
        }
    }
}

/// Lines (lowercased, trimmed) that occur more than once, in first-seen order.
fn repeated_lines(text: &str, min_chars: usize) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut order = Vec::new();
    for line in text.lines() {
        let line = line.trim().to_lowercase();
        if line.chars().count() < min_chars {
            continue;
        }
        let count = seen.entry(line.clone()).or_insert(0);
        *count += 1;
        if *count == 2 {
            order.push(line);
        }
    }
    order
}

fn count_matches(patterns: &[Regex], text: &str) -> usize {
    patterns.iter().map(|p| p.find_iter(text).count()).sum()
}

#[async_trait]
impl Guardrail for DocumentQualityGuardrail {
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
        let text = context.output_or_input();
        let kind = context.subject.document_kind.unwrap_or(DocumentKind::Cv);
        let words = text.split_whitespace().count();
        let bounds = self.rules.word_bounds(kind);

        let mut problems: Vec<String> = Vec::new();
        let mut recommendations: Vec<String> = Vec::new();

        if words < *bounds.start() {
            problems.push(format!(
                "{} is too short ({words} words, minimum {})",
                kind.as_str(),
                bounds.start()
            ));
            recommendations.push("Regenerate with more detail from the CV".to_string());
        } else if words > *bounds.end() {
            problems.push(format!(
                "{} is too long ({words} words, maximum {})",
                kind.as_str(),
                bounds.end()
            ));
            recommendations.push("Condense to the most relevant experience".to_string());
        }

        let placeholders = count_matches(&PLACEHOLDERS, text);
        if placeholders > 0 {
            problems.push(format!("{placeholders} unfilled placeholder(s)"));
            recommendations.push("Replace template placeholders with real content".to_string());
        }

        let artifacts = count_matches(&MODEL_ARTIFACTS, text);
        if artifacts > 0 {
            problems.push(format!("{artifacts} formatting or assistant artifact(s)"));
            recommendations
                .push("Remove code fences and assistant commentary from the document".to_string());
        }

        let repeated = repeated_lines(text, self.rules.min_repeated_line_chars);
        if !repeated.is_empty() {
            problems.push(format!("{} repeated line(s)", repeated.len()));
            recommendations.push("Remove duplicated lines".to_string());
        }

        if problems.is_empty() {
            return Ok(GuardrailResult::pass()
                .with_detail("document_kind", kind.as_str())
                .with_detail("words", words));
        }

        Ok(GuardrailResult::tripwire(
            ViolationType::LowQuality,
            format!("Document quality issues: {}", problems.join("; ")),
        )
        .with_recommendations(recommendations)
        .with_detail("document_kind", kind.as_str())
        .with_detail("words", words)
        .with_detail("placeholders", placeholders)
        .with_detail("artifacts", artifacts)
        .with_detail("repeated_lines", repeated.len()))
    }
}

impl OutputGuardrail for DocumentQualityGuardrail {}
