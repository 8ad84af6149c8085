//! Belief inference: what the player thinks the opponent holds.

use super::language_opinion;
use crate::prompts::belief_prompt;
use async_trait::async_trait;
use limp_core::{
    AgentContext, AgentError, AgentOpinion, AgentParams, LanguageModel, PerceptionOutput,
    QuestionPrompt, ReasoningAgent, RegistryError,
};
use std::sync::Arc;

pub const NAME: &str = "tom_belief";

pub struct TomBelief {
    language: Arc<dyn LanguageModel>,
}

pub fn build(ctx: &AgentContext, _params: &AgentParams) -> Result<Box<dyn ReasoningAgent>, RegistryError> {
    Ok(Box::new(TomBelief {
        language: ctx.require_language(NAME)?,
    }))
}

#[async_trait]
impl ReasoningAgent for TomBelief {
    fn capability(&self) -> &str {
        NAME
    }

    async fn reason(
        &self,
        question: &QuestionPrompt,
        perception: &PerceptionOutput,
    ) -> Result<AgentOpinion, AgentError> {
        let prompt = belief_prompt(question, perception);
        language_opinion(NAME, self.language.as_ref(), &prompt, question, &["belief_analysis"]).await
    }
}
