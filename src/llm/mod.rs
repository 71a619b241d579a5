pub mod client;
pub mod prompts;
pub mod structured;

pub use client::{CompletionModel, LlmClient};
pub use prompts::{generate_answer, generate_question, generate_sql};
pub use structured::{GeneratedAnswer, GeneratedQuery, GeneratedQuestion};
