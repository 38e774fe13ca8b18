// LLM prompts used by guardrails.

/// System prompt for claim verification. Forces JSON-only output.
pub const TRUTHFULNESS_SYSTEM: &str = "You are a meticulous fact-checker for job application \
    documents. You compare a generated document against the candidate's original CV and \
    list every claim in the document that the CV does not support. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Claim verification prompt. Replace `{source_cv}` and `{document}` before sending.
pub const TRUTHFULNESS_PROMPT_TEMPLATE: &str = r#"Compare the GENERATED DOCUMENT against the ORIGINAL CV.

List every factual claim in the generated document that the original CV does not support:
invented employers, job titles, dates, degrees, certifications, skills, tools, metrics or
responsibilities. Rephrasing and summarising supported facts is fine. Statements of interest
or motivation ("I am excited to ...") are not factual claims.

Return a JSON object with this EXACT schema:
{
  "unsupported_claims": ["short quote or paraphrase of each unsupported claim"]
}
Return an empty array if every claim is supported.

ORIGINAL CV:
{source_cv}

GENERATED DOCUMENT:
{document}"#;
