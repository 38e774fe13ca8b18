// Shared prompt fragments. Each module that calls the LLM keeps its own
// prompts.rs alongside it and pulls cross-cutting fragments from here.

/// Appended to every document-writing prompt.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Every claim must be traceable to the candidate's CV below. \
    Do NOT invent employers, job titles, dates, degrees, skills, certifications or metrics. \
    If the CV does not support a claim the job posting asks for, leave it out; \
    never imply experience the candidate does not have.";

/// Keeps protected-attribute details out of generated documents.
pub const COMPLIANCE_INSTRUCTION: &str = "\
    Do NOT mention age, date of birth, marital status, religion, gender, health, \
    disability, ethnicity or nationality, even if the CV contains them. \
    Do NOT include national ID numbers, bank details or photos.";

/// Fills `{name}` placeholders in a single pass. Inserted values are never
/// rescanned, so user text containing `{source_cv}` stays literal. Braces
/// that do not name a value are kept as they are.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
