//! Per-frame phase classification by community-card count.

use crate::json;
use crate::prompts::PHASE_PROMPT;
use async_trait::async_trait;
use limp_core::agent::unsupported;
use limp_core::{
    AgentContext, AgentError, AgentParams, PerceptionAgent, PerceptionReport, PerceptionRequest,
    PhaseReading, PhaseType, VisionModel,
};
use limp_core::domain::error::RegistryError;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub const NAME: &str = "phase_segmenter";

#[derive(Debug, Deserialize)]
struct PhaseReply {
    #[serde(default)]
    community_cards: Option<Value>,
    #[serde(default)]
    showdown: Option<bool>,
    #[serde(default)]
    phase: Option<String>,
}

impl PhaseReply {
    fn reading(&self) -> PhaseReading {
        let count = self
            .community_cards
            .as_ref()
            .and_then(json::amount)
            .filter(|n| *n >= 0.0)
            .map(|n| n as usize);
        let phase = if self.showdown.unwrap_or(false) {
            PhaseType::Showdown
        } else if let Some(n) = count {
            PhaseType::from_board_count(n)
        } else {
            self.phase
                .as_deref()
                .map(PhaseType::parse_label)
                .unwrap_or(PhaseType::Unknown)
        };
        PhaseReading {
            phase,
            community_cards: count,
        }
    }
}

pub struct PhaseSegmenter {
    vision: Arc<dyn VisionModel>,
}

pub fn build(ctx: &AgentContext, _params: &AgentParams) -> Result<Box<dyn PerceptionAgent>, RegistryError> {
    Ok(Box::new(PhaseSegmenter {
        vision: ctx.require_vision(NAME)?,
    }))
}

#[async_trait]
impl PerceptionAgent for PhaseSegmenter {
    fn capability(&self) -> &str {
        NAME
    }

    async fn perceive(&self, request: PerceptionRequest) -> Result<PerceptionReport, AgentError> {
        let kind = request.kind();
        let PerceptionRequest::ClassifyPhase { frame } = request else {
            return Err(unsupported(NAME, kind));
        };
        let text = self.vision.describe(&frame.path, PHASE_PROMPT).await?;
        let reply: PhaseReply = json::extract(&text)?;
        Ok(PerceptionReport::Phase(reply.reading()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use limp_core::fakes::{Reply, ScriptedVision};
    use limp_core::FrameRef;

    fn frame(i: usize) -> FrameRef {
        FrameRef {
            index: i,
            timestamp: i as f64,
            path: format!("frames/frame_{:04}.jpg", i + 1).into(),
        }
    }

    async fn classify(reply: &str) -> PhaseReading {
        let vision = Arc::new(ScriptedVision::new().otherwise(Reply::text(reply)));
        let ctx = AgentContext::new().with_vision(vision);
        let agent = build(&ctx, &AgentParams::new()).unwrap();
        match agent
            .perceive(PerceptionRequest::ClassifyPhase { frame: frame(0) })
            .await
            .unwrap()
        {
            PerceptionReport::Phase(r) => r,
            other => panic!("unexpected report {other:?}"),
        }
    }

    #[tokio::test]
    async fn card_count_maps_to_phase() {
        assert_eq!(classify(r#"{"community_cards": 0}"#).await.phase, PhaseType::PreFlop);
        assert_eq!(classify(r#"{"community_cards": 3}"#).await.phase, PhaseType::Flop);
        assert_eq!(classify(r#"{"community_cards": "5"}"#).await.phase, PhaseType::River);
        assert_eq!(classify(r#"{"community_cards": 2}"#).await.phase, PhaseType::Unknown);
    }

    #[tokio::test]
    async fn showdown_overrides_count() {
        let r = classify(r#"{"community_cards": 5, "showdown": true}"#).await;
        assert_eq!(r.phase, PhaseType::Showdown);
        assert_eq!(r.community_cards, Some(5));
    }

    #[tokio::test]
    async fn wrong_request_is_rejected() {
        let ctx = AgentContext::new().with_vision(Arc::new(ScriptedVision::new()));
        let agent = build(&ctx, &AgentParams::new()).unwrap();
        let err = agent
            .perceive(PerceptionRequest::ParseBoard {
                frame: frame(0),
                phase: PhaseType::Flop,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::UnsupportedRequest { .. }));
    }

    #[test]
    fn requires_vision_model() {
        assert!(build(&AgentContext::new(), &AgentParams::new()).is_err());
    }
}
