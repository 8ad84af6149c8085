//! Social-goal inference: what the player wants the opponent to do.

use super::language_opinion;
use crate::prompts::social_prompt;
use async_trait::async_trait;
use limp_core::{
    AgentContext, AgentError, AgentOpinion, AgentParams, LanguageModel, PerceptionOutput,
    QuestionPrompt, ReasoningAgent, RegistryError,
};
use std::sync::Arc;

pub const NAME: &str = "tom_social";

pub struct TomSocial {
    language: Arc<dyn LanguageModel>,
}

pub fn build(ctx: &AgentContext, _params: &AgentParams) -> Result<Box<dyn ReasoningAgent>, RegistryError> {
    Ok(Box::new(TomSocial {
        language: ctx.require_language(NAME)?,
    }))
}

#[async_trait]
impl ReasoningAgent for TomSocial {
    fn capability(&self) -> &str {
        NAME
    }

    async fn reason(
        &self,
        question: &QuestionPrompt,
        perception: &PerceptionOutput,
    ) -> Result<AgentOpinion, AgentError> {
        let prompt = social_prompt(question, perception);
        language_opinion(
            NAME,
            self.language.as_ref(),
            &prompt,
            question,
            &["inferred_social_goal", "reasoning"],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::SOCIAL_MARKER;
    use crate::reasoning::test_support::intent_prompt;
    use limp_core::fakes::{Reply, ScriptedLanguage};
    use limp_core::{PerceptionMeta, ProtocolMode};

    fn perception() -> PerceptionOutput {
        PerceptionOutput {
            episode_id: "ep".to_string(),
            protocol: ProtocolMode::Player,
            hero: None,
            meta: PerceptionMeta::default(),
            timeline: Default::default(),
            enabled_agents: vec![],
            failures: vec![],
        }
    }

    #[tokio::test]
    async fn reply_becomes_opinion() {
        let lm = Arc::new(ScriptedLanguage::new().on(
            SOCIAL_MARKER,
            Reply::text(
                r#"{"option_scores": {"A": 0.1, "B": 0.8, "C": 0.1}, "inferred_social_goal": "get paid", "reasoning": "strong line", "confidence": 0.9}"#,
            ),
        ));
        let ctx = AgentContext::new().with_language(lm.clone());
        let agent = build(&ctx, &AgentParams::new()).unwrap();
        let op = agent.reason(&intent_prompt(None), &perception()).await.unwrap();
        assert_eq!(op.agent, NAME);
        assert!((op.option_scores["B"] - 0.8).abs() < 1e-9);
        assert_eq!(op.confidence, 0.9);
        assert_eq!(op.rationale, "get paid strong line");
        let prompts = lm.prompts();
        assert!(prompts[0].contains("A) Bluff"));
        assert!(prompts[0].contains("Alice raise 3000"));
    }

    #[tokio::test]
    async fn malformed_reply_is_an_error() {
        let lm = Arc::new(ScriptedLanguage::new().otherwise(Reply::text(r#"{"reasoning": "?"}"#)));
        let ctx = AgentContext::new().with_language(lm);
        let agent = build(&ctx, &AgentParams::new()).unwrap();
        let err = agent
            .reason(&intent_prompt(None), &perception())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponse(_)));
    }
}
