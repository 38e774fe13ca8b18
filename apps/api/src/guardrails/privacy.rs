// Result details carry categories and counts only, never matched values.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::guardrails::{
    Guardrail, GuardrailContext, GuardrailError, GuardrailResult, InputGuardrail,
    OutputGuardrail, ViolationType,
};

pub const NAME: &str = "privacy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiCategory {
    NationalId,
    PaymentCard,
    BankAccount,
    Passport,
    DateOfBirth,
    ContactDetails,
}

impl PiiCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiCategory::NationalId => "national_id",
            PiiCategory::PaymentCard => "payment_card",
            PiiCategory::BankAccount => "bank_account",
            PiiCategory::Passport => "passport",
            PiiCategory::DateOfBirth => "date_of_birth",
            PiiCategory::ContactDetails => "contact_details",
        }
    }

    fn recommendation(&self) -> &'static str {
        match self {
            PiiCategory::NationalId => "Remove national ID / social security numbers",
            PiiCategory::PaymentCard => "Remove payment card numbers",
            PiiCategory::BankAccount => "Remove bank account numbers (IBAN)",
            PiiCategory::Passport => "Remove passport numbers",
            PiiCategory::DateOfBirth => "Remove your date of birth",
            PiiCategory::ContactDetails => "Remove email addresses from this document",
        }
    }
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("privacy pattern is valid")
}

static SSN: LazyLock<Regex> = LazyLock::new(|| compile(r"\b\d{3}-\d{2}-\d{4}\b"));
static UK_NINO: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b[A-CEGHJ-PR-TW-Z]{2} ?\d{2} ?\d{2} ?\d{2} ?[A-D]\b")
});
static CARD_CANDIDATE: LazyLock<Regex> = LazyLock::new(|| compile(r"\b(?:\d[ -]?){12,18}\d\b"));
static IBAN: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b[A-Z]{2}\d{2}(?: ?[A-Z0-9]{4}){2,7}(?: ?[A-Z0-9]{1,4})?\b")
});
static PASSPORT: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)\bpassport\s*(?:no\.?|number|#)?\s*:?\s*[A-Z]{0,2}\d{6,9}\b")
});
static DATE_OF_BIRTH: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(?:date\s+of\s+birth|born\s+on|dob)\b"));
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"));

/// Luhn checksum over the digits of `candidate`.
fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// Counts matches per enabled category.
pub fn scan(text: &str, categories: &[PiiCategory]) -> BTreeMap<PiiCategory, usize> {
    let mut found = BTreeMap::new();

    for &category in categories {
        let count = match category {
            PiiCategory::NationalId => {
                SSN.find_iter(text).count() + UK_NINO.find_iter(text).count()
            }
            PiiCategory::PaymentCard => CARD_CANDIDATE
                .find_iter(text)
                .filter(|m| luhn_valid(m.as_str()))
                .count(),
            PiiCategory::BankAccount => IBAN.find_iter(text).count(),
            PiiCategory::Passport => PASSPORT.find_iter(text).count(),
            PiiCategory::DateOfBirth => DATE_OF_BIRTH.find_iter(text).count(),
            PiiCategory::ContactDetails => EMAIL.find_iter(text).count(),
        };
        if count > 0 {
            found.insert(category, count);
        }
    }

    found
}

#[derive(Debug, Clone)]
pub struct PrivacyRules {
    pub categories: Vec<PiiCategory>,
}

impl Default for PrivacyRules {
    fn default() -> Self {
        Self {
            categories: vec![
                PiiCategory::NationalId,
                PiiCategory::PaymentCard,
                PiiCategory::BankAccount,
                PiiCategory::Passport,
                PiiCategory::DateOfBirth,
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct PrivacyGuardrail {
    rules: PrivacyRules,
    priority: i32,
}

impl Default for PrivacyGuardrail {
    fn default() -> Self {
        Self::new(PrivacyRules::default())
    }
}

impl PrivacyGuardrail {
    pub fn new(rules: PrivacyRules) -> Self {
        Self {
            rules,
            priority: 30,
        }
    }
}

#[async_trait]
impl Guardrail for PrivacyGuardrail {
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
        let text = match context.output.as_deref() {
            Some(output) => output,
            None => context.source_cv(),
        };

        let found = scan(text, &self.rules.categories);
        if found.is_empty() {
            return Ok(GuardrailResult::pass());
        }

        let labels: Vec<&str> = found.keys().map(PiiCategory::as_str).collect();
        let counts: serde_json::Map<String, serde_json::Value> = found
            .iter()
            .map(|(c, n)| (c.as_str().to_string(), serde_json::Value::from(*n)))
            .collect();

        Ok(GuardrailResult::tripwire(
            ViolationType::PrivacyRisk,
            format!("Sensitive personal data detected: {}", labels.join(", ")),
        )
        .with_recommendations(found.keys().map(|c| c.recommendation()))
        .with_detail("categories", serde_json::Value::Object(counts)))
    }
}

impl InputGuardrail for PrivacyGuardrail {}
impl OutputGuardrail for PrivacyGuardrail {}
