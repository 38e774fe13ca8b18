use async_trait::async_trait;
use reqwest::Url;

use crate::guardrails::{
    Guardrail, GuardrailContext, GuardrailError, GuardrailResult, InputGuardrail, ViolationType,
};

pub const NAME: &str = "job-posting";

/// Phrases typical of job postings. A posting must contain at least
/// `min_markers` distinct ones.
const POSTING_MARKERS: &[&str] = &[
    "responsibilit",
    "requirement",
    "qualification",
    "experience",
    "skills",
    "role",
    "position",
    "we are looking",
    "you will",
    "apply",
    "salary",
    "benefits",
    "team",
];

#[derive(Debug, Clone)]
pub struct JobPostingRules {
    pub min_chars: usize,
    pub max_chars: usize,
    pub min_markers: usize,
    pub require_url: bool,
    pub allowed_schemes: Vec<String>,
}

impl Default for JobPostingRules {
    fn default() -> Self {
        Self {
            min_chars: 80,
            max_chars: 30_000,
            min_markers: 2,
            require_url: false,
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobPostingGuardrail {
    rules: JobPostingRules,
    priority: i32,
}

impl Default for JobPostingGuardrail {
    fn default() -> Self {
        Self::new(JobPostingRules::default())
    }
}

impl JobPostingGuardrail {
    pub fn new(rules: JobPostingRules) -> Self {
        Self {
            rules,
            priority: 10,
        }
    }

    fn check_url(&self, url: &str, problems: &mut Vec<Problem>) {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                problems.push(Problem {
                    violation: ViolationType::InvalidJobPosting,
                    message: format!("Job posting URL is not well-formed ({e})"),
                    recommendation: "Paste the full posting URL, including https://".to_string(),
                });
                return;
            }
        };

        if !self
            .rules
            .allowed_schemes
            .iter()
            .any(|s| s == parsed.scheme())
        {
            problems.push(Problem {
                violation: ViolationType::InvalidJobPosting,
                message: format!("Job posting URL uses unsupported scheme '{}'", parsed.scheme()),
                recommendation: "Use an http or https link to the posting".to_string(),
            });
        }

        let host_ok = parsed
            .host_str()
            .map(|h| h.contains('.') && !h.starts_with('.') && !h.ends_with('.'))
            .unwrap_or(false);
        if !host_ok {
            problems.push(Problem {
                violation: ViolationType::InvalidJobPosting,
                message: "Job posting URL has no valid host".to_string(),
                recommendation: "Link to the posting on the employer's site or a job board"
                    .to_string(),
            });
        }
    }

    fn check_text(&self, text: &str, problems: &mut Vec<Problem>) {
        let chars = text.chars().count();

        if chars < self.rules.min_chars {
            problems.push(Problem {
                violation: ViolationType::InsufficientContent,
                message: format!(
                    "Job posting text is too short ({chars} characters, minimum {})",
                    self.rules.min_chars
                ),
                recommendation: "Paste the full job description, including responsibilities and requirements".to_string(),
            });
            return;
        }

        if chars > self.rules.max_chars {
            problems.push(Problem {
                violation: ViolationType::InvalidJobPosting,
                message: format!(
                    "Job posting text is too long ({chars} characters, maximum {})",
                    self.rules.max_chars
                ),
                recommendation: "Paste only the job description, not the whole page".to_string(),
            });
            return;
        }

        let markers = count_markers(text);
        if markers < self.rules.min_markers {
            problems.push(Problem {
                violation: ViolationType::InvalidJobPosting,
                message: "Text does not look like a job posting".to_string(),
                recommendation:
                    "Include the role description, responsibilities and required skills"
                        .to_string(),
            });
        }
    }
}

struct Problem {
    violation: ViolationType,
    message: String,
    recommendation: String,
}

fn count_markers(text: &str) -> usize {
    let lower = text.to_lowercase();
    POSTING_MARKERS
        .iter()
        .filter(|m| lower.contains(*m))
        .count()
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

#[async_trait]
impl Guardrail for JobPostingGuardrail {
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
        let posting = context.subject.job_posting.as_ref();
        let text = posting.and_then(|p| non_empty(p.text.as_ref()));
        let url = posting.and_then(|p| non_empty(p.url.as_ref()));

        if text.is_none() && url.is_none() {
            return Ok(GuardrailResult::tripwire(
                ViolationType::InvalidJobPosting,
                "No job posting supplied",
            )
            .with_recommendation("Provide the job posting text or a link to it"));
        }

        let mut problems = Vec::new();

        match url {
            Some(url) => self.check_url(url, &mut problems),
            None if self.rules.require_url => problems.push(Problem {
                violation: ViolationType::InvalidJobPosting,
                message: "A job posting URL is required".to_string(),
                recommendation: "Add a link to the original posting".to_string(),
            }),
            None => {}
        }

        if let Some(text) = text {
            self.check_text(text, &mut problems);
        }

        let Some(first) = problems.first() else {
            return Ok(GuardrailResult::pass()
                .with_detail("has_url", url.is_some())
                .with_detail("text_chars", text.map(|t| t.chars().count()).unwrap_or(0)));
        };

        let message = problems
            .iter()
            .map(|p| p.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");

        Ok(GuardrailResult::tripwire(first.violation, message)
            .with_recommendations(problems.iter().map(|p| p.recommendation.clone()))
            .with_detail("problem_count", problems.len()))
    }
}

impl InputGuardrail for JobPostingGuardrail {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrails::JobPosting;
    use uuid::Uuid;

    const POSTING: &str = "Senior Backend Engineer. We are looking for an engineer to join our \
        platform team. Responsibilities: design and operate Rust services. Requirements: 5+ years \
        of backend experience, strong SQL skills.";

    fn ctx(text: Option<&str>, url: Option<&str>) -> GuardrailContext {
        GuardrailContext::new("tailor", Uuid::new_v4(), "").with_job_posting(JobPosting {
            text: text.map(String::from),
            url: url.map(String::from),
        })
    }

    async fn run(ctx: &GuardrailContext) -> GuardrailResult {
        JobPostingGuardrail::default().validate(ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_valid_text_and_url_pass() {
        let r = run(&ctx(Some(POSTING), Some("https://jobs.example.com/123"))).await;
        assert!(!r.tripwire_triggered, "{:?}", r.message);
        assert_eq!(r.details["has_url"], true);
    }

    #[tokio::test]
    async fn test_url_only_passes() {
        let r = run(&ctx(None, Some("https://careers.example.org/roles/42"))).await;
        assert!(!r.tripwire_triggered);
    }

    #[tokio::test]
    async fn test_missing_posting_trips() {
        let no_posting = GuardrailContext::new("tailor", Uuid::new_v4(), "");
        let r = run(&no_posting).await;
        assert!(r.tripwire_triggered);
        assert_eq!(r.violation_type, Some(ViolationType::InvalidJobPosting));

        let blank = run(&ctx(Some("   "), Some(""))).await;
        assert!(blank.tripwire_triggered);
    }

    #[tokio::test]
    async fn test_malformed_url_trips() {
        let r = run(&ctx(Some(POSTING), Some("not a url"))).await;
        assert!(r.tripwire_triggered);
        assert!(r.message.unwrap().contains("not well-formed"));
    }

    #[tokio::test]
    async fn test_non_http_scheme_trips() {
        let r = run(&ctx(None, Some("ftp://jobs.example.com/posting.txt"))).await;
        assert!(r.tripwire_triggered);
        assert!(r.message.unwrap().contains("scheme 'ftp'"));
    }

    #[tokio::test]
    async fn test_hostless_url_trips() {
        let r = run(&ctx(None, Some("https://localhost/job"))).await;
        assert!(r.tripwire_triggered);
        assert!(r.message.unwrap().contains("no valid host"));
    }

    #[tokio::test]
    async fn test_short_text_is_insufficient() {
        let r = run(&ctx(Some("Rust dev wanted"), None)).await;
        assert_eq!(r.violation_type, Some(ViolationType::InsufficientContent));
    }

    #[tokio::test]
    async fn test_text_without_posting_markers_trips() {
        let prose = "Once upon a time in a faraway kingdom there lived a dragon who loved \
            baking bread every morning before sunrise, humming quietly.";
        let r = run(&ctx(Some(prose), None)).await;
        assert!(r.tripwire_triggered);
        assert!(r.message.unwrap().contains("does not look like a job posting"));
    }

    #[tokio::test]
    async fn test_multiple_problems_are_all_reported() {
        let r = run(&ctx(Some("too short"), Some("nonsense"))).await;
        assert_eq!(r.details["problem_count"], 2);
        assert_eq!(r.recommendations.len(), 2);
        // URL problems are checked first
        assert_eq!(r.violation_type, Some(ViolationType::InvalidJobPosting));
    }

    #[tokio::test]
    async fn test_require_url_rule() {
        let guardrail = JobPostingGuardrail::new(JobPostingRules {
            require_url: true,
            ..JobPostingRules::default()
        });
        let r = guardrail.validate(&ctx(Some(POSTING), None)).await.unwrap();
        assert!(r.tripwire_triggered);
    }

    #[test]
    fn test_count_markers_is_case_insensitive() {
        assert_eq!(count_markers("RESPONSIBILITIES and Requirements"), 2);
    }
}
