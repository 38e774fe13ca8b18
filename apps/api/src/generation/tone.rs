use crate::generation::posting_parser::PostingTone;

#[derive(Debug, Clone, PartialEq)]
pub struct ToneGuidance {
    pub preferred_verbs: &'static [&'static str],
    pub avoid_verbs: &'static [&'static str],
    pub register: &'static str,
}

pub fn guidance_for(tone: PostingTone) -> ToneGuidance {
    match tone {
        PostingTone::AggressiveStartup => ToneGuidance {
            preferred_verbs: &["Built", "Shipped", "Drove", "Launched", "Led", "Owned"],
            avoid_verbs: &["assisted", "helped", "participated in"],
            register: "direct and energetic, short sentences",
        },
        PostingTone::CollaborativeEnterprise => ToneGuidance {
            preferred_verbs: &["Partnered with", "Contributed to", "Enabled", "Collaborated on"],
            avoid_verbs: &["spearheaded", "single-handedly", "disrupted"],
            register: "measured and professional, team outcomes first",
        },
        PostingTone::ResearchOriented => ToneGuidance {
            preferred_verbs: &["Investigated", "Designed and evaluated", "Published", "Analysed"],
            avoid_verbs: &["moved fast", "disrupted", "hustled"],
            register: "precise and evidence-led",
        },
        PostingTone::ProductOriented => ToneGuidance {
            preferred_verbs: &["Shipped", "Delivered", "Improved", "Launched"],
            avoid_verbs: &["researched", "proposed"],
            register: "outcome-focused, user impact first",
        },
    }
}

impl ToneGuidance {
    /// One-paragraph instruction embedded in writer prompts.
    pub fn render(&self) -> String {
        format!(
            "Write in a {} register. Prefer verbs such as {}. Avoid {}. \
             Only use an ownership verb when the CV shows the candidate owned the work.",
            self.register,
            self.preferred_verbs.join(", "),
            self.avoid_verbs.join(", ")
        )
    }
}
