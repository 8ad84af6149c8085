//! Annotation pipeline: privileged sources in, [`GroundTruth`] out.
//!
//! Reads the narration audio and the optional metadata file. Nothing here
//! is reachable from the perception or reasoning pipelines; the only
//! consumer is the QA generator.

use crate::stage::{with_timeout, CallLimits};
use limp_core::obs::{emit_agent_failed, emit_stage_completed};
use limp_core::{
    AgentContext, AgentFailure, AgentRegistry, AnnotationAgent, AnnotationReport,
    AnnotationRequest, Availability, ConfigurationError, GroundTruth, Namespace,
    PrivilegedMetadata, ResolvedConfig,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::info;

pub const AUDIO_GROUND_TRUTH: &str = "audio_ground_truth";
pub const HIDDEN_CARDS: &str = "hidden_cards";

pub const ANNOTATION_ORDER: [&str; 2] = [AUDIO_GROUND_TRUTH, HIDDEN_CARDS];

/// Transcription and fact extraction share one budget of this many calls.
const NARRATION_CALLS: u32 = 2;

pub struct AnnotationPipeline {
    narration: Option<Box<dyn AnnotationAgent>>,
    hidden_cards: Option<Box<dyn AnnotationAgent>>,
    limits: CallLimits,
}

impl std::fmt::Debug for AnnotationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationPipeline")
            .field("narration", &self.narration.is_some())
            .field("hidden_cards", &self.hidden_cards.is_some())
            .finish()
    }
}

impl AnnotationPipeline {
    pub fn build(
        registry: &AgentRegistry,
        config: &ResolvedConfig,
        ctx: &AgentContext,
    ) -> Result<Self, ConfigurationError> {
        let build = |name: &str| -> Result<Option<Box<dyn AnnotationAgent>>, ConfigurationError> {
            if !config.is_enabled(name) {
                return Ok(None);
            }
            if !registry.contains(Namespace::Annotation, name) {
                return Err(ConfigurationError::UnregisteredAgent {
                    name: name.to_string(),
                });
            }
            Ok(Some(registry.build_annotation(name, ctx, &config.params(name))?))
        };
        Ok(Self {
            narration: build(AUDIO_GROUND_TRUTH)?,
            hidden_cards: build(HIDDEN_CARDS)?,
            limits: CallLimits::from_config(config),
        })
    }

    fn narration_timeout(&self) -> Duration {
        self.limits.timeout * NARRATION_CALLS
    }

    /// Ground truth for one episode. Unrecoverable fields are marked
    /// unavailable; agent errors come back as failures.
    pub async fn run(
        &self,
        episode_id: &str,
        audio: Option<&Path>,
        metadata: Option<&PrivilegedMetadata>,
    ) -> (GroundTruth, Vec<AgentFailure>) {
        let started = Instant::now();
        let mut failures = Vec::new();
        let mut gt = GroundTruth::empty(episode_id, "no audio track");
        let mut narrated: BTreeMap<String, Vec<String>> = BTreeMap::new();

        match (&self.narration, audio) {
            (None, _) => {
                gt.transcript = Availability::unavailable(format!("{AUDIO_GROUND_TRUTH} disabled"));
            }
            (Some(_), None) => {}
            (Some(agent), Some(audio)) => {
                let request = AnnotationRequest::Narration {
                    audio: audio.to_path_buf(),
                };
                match with_timeout(self.narration_timeout(), agent.annotate(request)).await {
                    Ok(AnnotationReport::Narration(report)) => {
                        gt.transcript = Availability::Available(report.transcript);
                        gt.narration = report.events;
                        gt.winner = report.facts.winner;
                        gt.key_moments = report.facts.key_moments;
                        narrated = report.facts.hole_cards;
                    }
                    Ok(_) => {
                        let error = "agent returned a report other than narration";
                        gt.transcript = Availability::unavailable(error);
                        push(&mut failures, AUDIO_GROUND_TRUTH, "audio", error);
                    }
                    Err(e) => {
                        gt.transcript = Availability::unavailable(e.to_string());
                        push(&mut failures, AUDIO_GROUND_TRUTH, "audio", e);
                    }
                }
            }
        }

        if let Some(agent) = &self.hidden_cards {
            let request = AnnotationRequest::HiddenCards {
                metadata: metadata.cloned(),
                narrated,
            };
            match with_timeout(self.limits.timeout, agent.annotate(request)).await {
                Ok(AnnotationReport::HiddenCards(players)) => gt.players = players,
                Ok(_) => push(
                    &mut failures,
                    HIDDEN_CARDS,
                    "players",
                    "agent returned a report other than hidden cards",
                ),
                Err(e) => push(&mut failures, HIDDEN_CARDS, "players", e),
            }
        }

        let units = usize::from(self.narration.is_some() && audio.is_some())
            + usize::from(self.hidden_cards.is_some());
        emit_stage_completed(
            "annotation",
            units,
            failures.len(),
            started.elapsed().as_millis() as u64,
        );
        info!(
            episode_id = %episode_id,
            narrated_events = gt.narration.len(),
            players = gt.players.len(),
            transcript = gt.transcript.is_available(),
            "Annotation finished"
        );
        (gt, failures)
    }
}

fn push(failures: &mut Vec<AgentFailure>, capability: &str, unit: &str, error: impl ToString) {
    let error = error.to_string();
    emit_agent_failed(capability, unit, &error);
    failures.push(AgentFailure::new(capability, unit, error));
}
