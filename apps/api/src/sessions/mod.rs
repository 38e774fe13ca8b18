// Sessions: one candidate, one job posting and the documents generated for them.

pub mod handlers;
pub mod store;
