//! Body-language analysis over the frames of one decision.

use crate::json;
use crate::prompts::cues_prompt;
use async_trait::async_trait;
use limp_core::agent::{bounded, param_bool, param_usize, unsupported};
use limp_core::{
    AgentContext, AgentError, AgentParams, BehavioralCues, BehavioralSummary, PerceptionAgent,
    PerceptionReport, PerceptionRequest, RegistryError, VisionModel,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const NAME: &str = "cue_analyzer";

const FIDGET_HANDS: [&str; 2] = ["playing with chips", "touching face"];

pub struct CueAnalyzer {
    vision: Arc<dyn VisionModel>,
    max_frames: usize,
    facial_emotion: bool,
    call_timeout: Option<Duration>,
}

pub fn build(ctx: &AgentContext, params: &AgentParams) -> Result<Box<dyn PerceptionAgent>, RegistryError> {
    Ok(Box::new(CueAnalyzer {
        vision: ctx.require_vision(NAME)?,
        max_frames: param_usize(params, "max_frames", 3).max(1),
        facial_emotion: param_bool(params, "facial_emotion", true),
        call_timeout: ctx.call_timeout,
    }))
}

/// Most frequent value; ties go to the value seen first.
fn dominant(values: &[&str]) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for v in values {
        let count = values.iter().filter(|x| *x == v).count();
        match best {
            Some((_, c)) if c >= count => {}
            _ => best = Some((*v, count)),
        }
    }
    best.map(|(v, _)| v.to_string())
}

fn changed(values: &[&str]) -> bool {
    values.windows(2).any(|w| w[0] != w[1])
}

fn field<'a>(
    cues: &'a [BehavioralCues],
    get: impl Fn(&'a BehavioralCues) -> Option<&'a String>,
) -> Vec<&'a str> {
    cues.iter().filter_map(get).map(String::as_str).collect()
}

pub fn summarize(cues: &[BehavioralCues]) -> BehavioralSummary {
    let postures = field(cues, |c| c.posture.as_ref());
    let hands = field(cues, |c| c.hands.as_ref());
    let gazes = field(cues, |c| c.gaze.as_ref());
    let emotions = field(cues, |c| c.facial_emotion.as_ref());

    BehavioralSummary {
        dominant_posture: dominant(&postures),
        posture_changed: changed(&postures),
        dominant_hands: dominant(&hands),
        fidgeting_detected: hands
            .iter()
            .any(|h| FIDGET_HANDS.iter().any(|f| h.eq_ignore_ascii_case(f))),
        dominant_gaze: dominant(&gazes),
        dominant_emotion: dominant(&emotions),
        emotion_changed: changed(&emotions),
        frame_count: cues.len(),
    }
}

#[async_trait]
impl PerceptionAgent for CueAnalyzer {
    fn capability(&self) -> &str {
        NAME
    }

    async fn perceive(&self, request: PerceptionRequest) -> Result<PerceptionReport, AgentError> {
        let kind = request.kind();
        let PerceptionRequest::AnalyzeCues { player, frames, .. } = request else {
            return Err(unsupported(NAME, kind));
        };
        if frames.is_empty() {
            return Err(AgentError::MissingInput(format!("no frames for {player}")));
        }

        // Frames closest to the action carry the decision.
        let window = &frames[frames.len().saturating_sub(self.max_frames)..];
        let prompt = cues_prompt(&player);
        let mut cues = Vec::with_capacity(window.len());
        let mut last_error = None;
        for frame in window {
            let parsed = match bounded(self.call_timeout, self.vision.describe(&frame.path, &prompt)).await {
                Ok(text) => json::extract::<BehavioralCues>(&text),
                Err(e) => Err(e),
            };
            match parsed {
                Ok(mut c) => {
                    if !self.facial_emotion {
                        c.facial_emotion = None;
                    }
                    cues.push(c);
                }
                Err(e) => {
                    debug!(frame = frame.index, player = %player, error = %e, "cue frame skipped");
                    last_error = Some(e);
                }
            }
        }
        match (cues.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(PerceptionReport::Cues(summarize(&cues))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use limp_core::fakes::{Reply, ScriptedVision};
    use limp_core::FrameRef;

    fn cue(posture: &str, hands: &str, emotion: &str) -> BehavioralCues {
        BehavioralCues {
            posture: Some(posture.to_string()),
            hands: Some(hands.to_string()),
            gaze: None,
            occlusion: None,
            facial_emotion: Some(emotion.to_string()),
        }
    }

    #[test]
    fn summary_tracks_dominance_and_changes() {
        let s = summarize(&[
            cue("Leaning back", "On table", "Tense"),
            cue("Leaning back", "Playing with chips", "Tense"),
            cue("Neutral", "On table", "Tense"),
        ]);
        assert_eq!(s.dominant_posture.as_deref(), Some("Leaning back"));
        assert!(s.posture_changed);
        assert!(s.fidgeting_detected);
        assert_eq!(s.dominant_hands.as_deref(), Some("On table"));
        assert!(!s.emotion_changed);
        assert_eq!(s.frame_count, 3);
    }

    #[test]
    fn dominance_tie_keeps_first_seen() {
        assert_eq!(dominant(&["B", "A", "A", "B"]).as_deref(), Some("B"));
        assert_eq!(dominant(&[]), None);
    }

    #[tokio::test]
    async fn analyses_only_the_last_frames() {
        let vision = Arc::new(ScriptedVision::new().otherwise(Reply::text(
            r#"{"posture": "Leaning forward", "gaze": "Looking at board", "facial_emotion": "Confident"}"#,
        )));
        let ctx = AgentContext::new().with_vision(vision.clone());
        let mut params = AgentParams::new();
        params.insert("max_frames".to_string(), serde_json::json!(2));
        params.insert("facial_emotion".to_string(), serde_json::json!(false));
        let agent = build(&ctx, &params).unwrap();

        let frames: Vec<FrameRef> = (0..5)
            .map(|i| FrameRef {
                index: i,
                timestamp: i as f64,
                path: format!("frame_{i}.jpg").into(),
            })
            .collect();
        let report = agent
            .perceive(PerceptionRequest::AnalyzeCues {
                player: "Alice".to_string(),
                timestamp: 4.0,
                frames,
            })
            .await
            .unwrap();
        let PerceptionReport::Cues(summary) = report else {
            panic!("expected cues");
        };
        assert_eq!(summary.frame_count, 2);
        assert_eq!(summary.dominant_emotion, None);
        let calls = vision.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].0.to_string_lossy().contains("frame_3"));
        assert!(calls[0].1.contains("Alice"));
    }
}
