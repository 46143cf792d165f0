//! Authorlink Decider - identity decisions over candidate profiles
//!
//! Renders a mention's paper and its candidates for an LLM, asks the
//! [`DecisionOracle`](authorlink_core::DecisionOracle) for a decision in one
//! or two stages, and normalizes the answer into an entity ID or NIL.
//!
//! Author: hephaex@gmail.com

pub mod context;
pub mod llm;
pub mod oracle;
pub mod parse;
pub mod prompt;
pub mod strategy;

pub use context::{render_paper_context, similarity_query};
pub use llm::{create_llm_client, OllamaClient, OpenAiClient};
pub use oracle::LlmOracle;
pub use parse::{normalize_identifier, parse_fields, parse_tiers, ResponseFields, TierAssignment};
pub use prompt::{decision_prompt, grading_prompt, PromptBuilder};
pub use strategy::{DecisionStrategy, PreparedDecision};
