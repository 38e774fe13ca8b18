// All LLM prompt constants for the Generation module.
// Reuses cross-cutting fragments from llm_client::prompts.

/// System prompt for job posting parsing. Forces JSON-only output.
pub const POSTING_PARSE_SYSTEM: &str = "You are an expert recruiter who reads job postings \
    and extracts what the employer is looking for. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Posting parse prompt. Replace `{posting_text}` before sending.
pub const POSTING_PARSE_PROMPT_TEMPLATE: &str = r#"Parse the following job posting.

Return a JSON object with this EXACT schema (no extra fields):
{
  "title": "Senior Backend Engineer",
  "company": "Acme Ltd",
  "seniority": "senior",
  "hard_requirements": [
    {"text": "5+ years backend development", "is_required": true}
  ],
  "nice_to_have": ["Kubernetes experience"],
  "keywords": ["Rust", "PostgreSQL", "distributed systems"],
  "tone": "CollaborativeEnterprise"
}

Use null for "title", "company" or "seniority" when the posting does not say.

TONE OPTIONS (pick exactly one):
- "AggressiveStartup": fast-paced language such as "own", "drive", "move fast"
- "CollaborativeEnterprise": team-oriented language such as "partner", "collaborate"
- "ResearchOriented": academic language such as "investigate", "publish", "evaluate"
- "ProductOriented": shipping focus such as "ship", "launch", "user experience"

HARD REQUIREMENTS: explicit must-haves ("required", "must have", minimum years).
NICE TO HAVE: "preferred", "bonus", "a plus".
SENIORITY: "junior", "mid", "senior", "staff", "principal", "director" or null.

JOB POSTING:
{posting_text}"#;

/// System prompt for the CV writer. Output is the document itself.
pub const CV_WRITER_SYSTEM: &str = "You are an expert CV writer. You rewrite a candidate's \
    CV so it targets a specific job posting, using only facts from the original CV. \
    Respond with the finished CV in Markdown and nothing else: no preamble, no notes, \
    no code fences.";

/// CV prompt. Replace every `{placeholder}` before sending.
pub const CV_PROMPT_TEMPLATE: &str = r#"Rewrite the candidate's CV for the job below.

{grounding_instruction}

{compliance_instruction}

TONE:
{tone_guidance}

STRUCTURE:
- Name line, then a 2-3 sentence profile aimed at the role
- Experience (most relevant first), Education, Skills
- Between 250 and 900 words
- Reorder and rephrase for relevance; drop what does not help this application

CANDIDATE NAME: {candidate_name}

TARGET JOB:
{posting_summary}

ORIGINAL CV:
{source_cv}"#;

/// System prompt for the cover letter writer. Output is the letter itself.
pub const COVER_LETTER_SYSTEM: &str = "You are an expert cover letter writer. You write \
    concise, specific cover letters grounded in the candidate's CV. \
    Respond with the finished letter in plain text and nothing else: no preamble, \
    no notes, no placeholders, no code fences.";

/// Cover letter prompt. Replace every `{placeholder}` before sending.
pub const COVER_LETTER_PROMPT_TEMPLATE: &str = r#"Write a cover letter from the candidate for the job below.

{grounding_instruction}

{compliance_instruction}

TONE:
{tone_guidance}

STRUCTURE:
- Greeting addressed to the hiring team (do not invent a person's name)
- Three or four short paragraphs connecting the candidate's CV to the requirements
- Sign off with the candidate's name
- Between 200 and 450 words

CANDIDATE NAME: {candidate_name}

TARGET JOB:
{posting_summary}

CANDIDATE CV:
{source_cv}"#;
