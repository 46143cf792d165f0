//! Decision oracle backed by an LLM client

use std::sync::Arc;

use async_trait::async_trait;
use authorlink_core::{
    DecisionOracle, DecisionRequest, GradingRequest, LinkError, LlmClient, OracleDecision, Result,
};
use tracing::debug;

use crate::parse::parse_fields;
use crate::prompt::{decision_prompt, grading_prompt};

/// Longest raw answer excerpt carried in a malformed-response error
const ERROR_EXCERPT_CHARS: usize = 200;

/// [`DecisionOracle`] that prompts an LLM and parses its labeled answer
pub struct LlmOracle {
    client: Arc<dyn LlmClient>,
    name: String,
}

impl LlmOracle {
    pub fn new(client: Arc<dyn LlmClient>, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
        }
    }
}

#[async_trait]
impl DecisionOracle for LlmOracle {
    async fn decide(&self, request: &DecisionRequest) -> Result<OracleDecision> {
        let prompt = decision_prompt(request);
        let response = self.client.generate(&prompt).await?;
        debug!(oracle = %self.name, chars = response.len(), "Decision response received");

        let fields = parse_fields(&response);
        let identifier = fields.best_id.ok_or_else(|| {
            LinkError::MalformedResponse(format!(
                "missing best_id in: {}",
                response.chars().take(ERROR_EXCERPT_CHARS).collect::<String>()
            ))
        })?;

        Ok(OracleDecision {
            identifier,
            rationale: fields.reasoning.unwrap_or_default(),
            confidence: fields.confidence,
        })
    }

    async fn grade(&self, request: &GradingRequest) -> Result<String> {
        let prompt = grading_prompt(request);
        let response = self.client.generate(&prompt).await?;
        debug!(oracle = %self.name, chars = response.len(), "Grading response received");

        // Tier parsing is lenient, so an unlabeled answer is passed through whole
        Ok(parse_fields(&response).results.unwrap_or(response))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
