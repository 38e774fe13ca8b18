// Document generation: posting parsing, tone calibration and the tailoring pipeline.
// All LLM calls go through the llm_client TextModel trait.

pub mod generator;
pub mod posting_parser;
pub mod prompts;
pub mod tone;
