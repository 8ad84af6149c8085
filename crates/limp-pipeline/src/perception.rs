//! Perception pipeline: frames in, [`PerceptionOutput`] out.
//!
//! Enabled agents run in a fixed order. Each stage only sees raw frames and
//! what earlier stages produced:
//!
//! 1. `phase_segmenter` reads a phase per sampled frame; readings are
//!    stabilized and cut into half-open segments.
//! 2. `action_detector` runs once per segment on that segment's frames.
//!    It reads one snapshot per frame, each under its own call timeout.
//! 3. `board_parser` reads the first and last frame of each segment.
//! 4. `cue_analyzer` runs only for actions flagged as key decisions.
//!
//! A failed unit is recorded as an [`AgentFailure`] and leaves its slot
//! empty; the pipeline never aborts on agent errors.

use crate::stage::{fan_out, run_units, CallLimits};
use limp_core::obs::{emit_agent_failed, emit_stage_completed};
use limp_core::{
    ActionEvent, AgentContext, AgentError, AgentFailure, AgentRegistry, ConfigurationError,
    FrameRef, FrameSequence, GameStateTimeline, Namespace, PerceptionAgent, PerceptionMeta,
    PerceptionOutput, PerceptionReport, PerceptionRequest, PhaseSegment, PhaseType, ProtocolMode,
    ResolvedConfig,
};
use std::time::Instant;
use tracing::{debug, info, warn};

pub const PHASE_SEGMENTER: &str = "phase_segmenter";
pub const ACTION_DETECTOR: &str = "action_detector";
pub const BOARD_PARSER: &str = "board_parser";
pub const CUE_ANALYZER: &str = "cue_analyzer";

/// Declared execution order.
pub const PERCEPTION_ORDER: [&str; 4] = [PHASE_SEGMENTER, ACTION_DETECTOR, BOARD_PARSER, CUE_ANALYZER];

/// Seconds of footage before an action used for cue analysis when the
/// detector recorded no decision start.
const CUE_LOOKBACK_SECS: f64 = 3.0;

/// Stabilize raw per-frame phase readings.
///
/// The phase only ever moves one step forward. A new phase is adopted once
/// `min_consecutive` readings in a row report it; the frames where it was
/// first seen are relabeled. `Unknown` readings keep the current phase and
/// neither confirm nor break a pending change. Jumps and backward readings
/// discard the pending change. Before any phase is confirmed the first
/// confirmed phase may be anything, and leading frames take its label.
pub fn stabilize_phases(readings: &[PhaseType], min_consecutive: usize) -> Vec<PhaseType> {
    let need = min_consecutive.max(1);
    let mut labels = Vec::with_capacity(readings.len());
    let mut current = PhaseType::Unknown;
    // (phase, index first seen, confirmations)
    let mut pending: Option<(PhaseType, usize, usize)> = None;

    for (i, &reading) in readings.iter().enumerate() {
        if reading == PhaseType::Unknown {
            labels.push(current);
            continue;
        }
        let advances = if current == PhaseType::Unknown {
            true
        } else {
            current.is_followed_by(reading)
        };
        if !advances {
            pending = None;
            labels.push(current);
            continue;
        }
        let (phase, first, count) = match pending {
            Some((p, first, count)) if p == reading => (p, first, count + 1),
            _ => (reading, i, 1),
        };
        labels.push(current);
        if count >= need {
            let from = if current == PhaseType::Unknown { 0 } else { first };
            for label in &mut labels[from..] {
                *label = phase;
            }
            current = phase;
            pending = None;
        } else {
            pending = Some((phase, first, count));
        }
    }
    labels
}

/// Cut labeled frames into half-open segments. The last segment ends at
/// `duration`.
pub fn segments_from_labels(frames: &[FrameRef], labels: &[PhaseType], duration: f64) -> Vec<PhaseSegment> {
    let mut segments: Vec<PhaseSegment> = Vec::new();
    for (frame, &label) in frames.iter().zip(labels) {
        match segments.last_mut() {
            Some(seg) if seg.phase == label => {}
            Some(seg) => {
                seg.end = frame.timestamp;
                segments.push(PhaseSegment::new(label, frame.timestamp, duration));
            }
            None => segments.push(PhaseSegment::new(label, frame.timestamp, duration)),
        }
    }
    segments
}

fn unexpected(kind: &str) -> AgentError {
    AgentError::MalformedResponse(format!("agent returned a report other than {kind}"))
}

pub struct PerceptionPipeline {
    agents: Vec<(&'static str, Box<dyn PerceptionAgent>)>,
    protocol: ProtocolMode,
    hero: Option<String>,
    sampling_interval: usize,
    min_consecutive: usize,
    limits: CallLimits,
}

impl std::fmt::Debug for PerceptionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerceptionPipeline")
            .field("agents", &self.enabled_agents())
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

impl PerceptionPipeline {
    /// Instantiate every enabled perception agent.
    ///
    /// An agent enabled in `config` but absent from the registry is a
    /// configuration error.
    pub fn build(
        registry: &AgentRegistry,
        config: &ResolvedConfig,
        ctx: &AgentContext,
    ) -> Result<Self, ConfigurationError> {
        let ctx = ctx.clone().with_call_timeout(config.call_timeout());
        let mut agents = Vec::new();
        for name in PERCEPTION_ORDER {
            if !config.is_enabled(name) {
                debug!(agent = name, "Perception agent disabled");
                continue;
            }
            if !registry.contains(Namespace::Perception, name) {
                return Err(ConfigurationError::UnregisteredAgent {
                    name: name.to_string(),
                });
            }
            let agent = registry.build_perception(name, &ctx, &config.params(name))?;
            agents.push((name, agent));
        }
        Ok(Self {
            agents,
            protocol: config.protocol,
            hero: config.hero.clone(),
            sampling_interval: config.sampling_interval.max(1),
            min_consecutive: config.min_consecutive_frames.max(1),
            limits: CallLimits::from_config(config),
        })
    }

    pub fn enabled_agents(&self) -> Vec<String> {
        self.agents.iter().map(|(n, _)| n.to_string()).collect()
    }

    fn agent(&self, name: &str) -> Option<&dyn PerceptionAgent> {
        self.agents
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, a)| a.as_ref())
    }

    pub async fn run(&self, episode_id: &str, frames: &FrameSequence) -> PerceptionOutput {
        let sampled = frames.sampled(self.sampling_interval);
        let duration = frames.duration();
        let mut failures = Vec::new();
        info!(
            episode_id = %episode_id,
            frames = frames.len(),
            sampled = sampled.len(),
            agents = self.agents.len(),
            "Starting perception"
        );

        let mut segments = self.segment(&sampled, duration, &mut failures).await;
        self.detect_actions(&mut segments, &sampled, &mut failures).await;
        self.parse_boards(&mut segments, &sampled, &mut failures).await;
        self.analyze_cues(&mut segments, &sampled, &mut failures).await;

        let mut timeline = GameStateTimeline::new();
        for seg in segments {
            if let Err(e) = timeline.push_segment(seg) {
                warn!(error = %e, "Dropping invalid segment");
            }
        }

        let mut output = PerceptionOutput {
            episode_id: episode_id.to_string(),
            protocol: self.protocol,
            hero: self.hero.clone(),
            meta: PerceptionMeta {
                fps: frames.fps,
                frame_count: frames.len(),
                duration,
                sampling_interval: self.sampling_interval,
            },
            timeline,
            enabled_agents: self.enabled_agents(),
            failures,
        };
        output.redact();
        output
    }

    async fn segment(
        &self,
        sampled: &[FrameRef],
        duration: f64,
        failures: &mut Vec<AgentFailure>,
    ) -> Vec<PhaseSegment> {
        let fallback = || {
            if duration > 0.0 {
                vec![PhaseSegment::new(PhaseType::Unknown, 0.0, duration)]
            } else {
                Vec::new()
            }
        };
        let Some(agent) = self.agent(PHASE_SEGMENTER) else {
            return fallback();
        };

        let started = Instant::now();
        let results = run_units(sampled.to_vec(), self.limits, |frame| {
            agent.perceive(PerceptionRequest::ClassifyPhase { frame })
        })
        .await;

        let before = failures.len();
        let readings: Vec<PhaseType> = results
            .into_iter()
            .zip(sampled)
            .map(|(result, frame)| match result {
                Ok(PerceptionReport::Phase(reading)) => reading.phase,
                Ok(_) => {
                    record(failures, PHASE_SEGMENTER, frame_unit(frame), unexpected("phase"));
                    PhaseType::Unknown
                }
                Err(e) => {
                    record(failures, PHASE_SEGMENTER, frame_unit(frame), e);
                    PhaseType::Unknown
                }
            })
            .collect();
        let failed = failures.len() - before;
        emit_stage_completed(PHASE_SEGMENTER, sampled.len(), failed, elapsed_ms(started));

        if sampled.is_empty() || failed == sampled.len() {
            return fallback();
        }
        let labels = stabilize_phases(&readings, self.min_consecutive);
        segments_from_labels(sampled, &labels, duration)
    }

    async fn detect_actions(
        &self,
        segments: &mut [PhaseSegment],
        sampled: &[FrameRef],
        failures: &mut Vec<AgentFailure>,
    ) {
        let Some(agent) = self.agent(ACTION_DETECTOR) else {
            return;
        };
        let started = Instant::now();
        let requests: Vec<PerceptionRequest> = segments
            .iter()
            .map(|seg| PerceptionRequest::DetectActions {
                phase: seg.phase,
                start: seg.start,
                end: seg.end,
                frames: frames_in(sampled, seg.start, seg.end),
            })
            .collect();
        let results = fan_out(requests, self.limits.max_concurrency, |request| agent.perceive(request)).await;

        let before = failures.len();
        for (index, (seg, result)) in segments.iter_mut().zip(results).enumerate() {
            let mut events = match result {
                Ok(PerceptionReport::Actions(events)) => events,
                Ok(_) => {
                    record(failures, ACTION_DETECTOR, segment_unit(index), unexpected("actions"));
                    continue;
                }
                Err(e) => {
                    record(failures, ACTION_DETECTOR, segment_unit(index), e);
                    continue;
                }
            };
            events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
            for event in events {
                if let Err(e) = seg.push_action(event) {
                    warn!(segment = index, error = %e, "Dropping action outside its segment");
                }
            }
        }
        emit_stage_completed(
            ACTION_DETECTOR,
            segments.len(),
            failures.len() - before,
            elapsed_ms(started),
        );
    }

    async fn parse_boards(
        &self,
        segments: &mut [PhaseSegment],
        sampled: &[FrameRef],
        failures: &mut Vec<AgentFailure>,
    ) {
        let Some(agent) = self.agent(BOARD_PARSER) else {
            return;
        };
        let started = Instant::now();

        // (segment index, is final state, frame)
        let mut units: Vec<(usize, bool, FrameRef)> = Vec::new();
        for (index, seg) in segments.iter().enumerate() {
            let frames = frames_in(sampled, seg.start, seg.end);
            let (Some(first), Some(last)) = (frames.first(), frames.last()) else {
                continue;
            };
            units.push((index, false, first.clone()));
            if last.index != first.index {
                units.push((index, true, last.clone()));
            }
        }
        let requests: Vec<(FrameRef, PhaseType)> = units
            .iter()
            .map(|(index, _, frame)| (frame.clone(), segments[*index].phase))
            .collect();
        let results = run_units(requests, self.limits, |(frame, phase)| {
            agent.perceive(PerceptionRequest::ParseBoard { frame, phase })
        })
        .await;

        let before = failures.len();
        for ((index, is_final, frame), result) in units.iter().zip(results) {
            let state = match result {
                Ok(PerceptionReport::Board(state)) => state,
                Ok(_) => {
                    record(failures, BOARD_PARSER, frame_unit(frame), unexpected("board"));
                    continue;
                }
                Err(e) => {
                    record(failures, BOARD_PARSER, frame_unit(frame), e);
                    continue;
                }
            };
            let seg = &mut segments[*index];
            if *is_final {
                seg.final_state = Some(state);
            } else {
                seg.initial_state = Some(state);
            }
        }
        emit_stage_completed(BOARD_PARSER, units.len(), failures.len() - before, elapsed_ms(started));
    }

    async fn analyze_cues(
        &self,
        segments: &mut [PhaseSegment],
        sampled: &[FrameRef],
        failures: &mut Vec<AgentFailure>,
    ) {
        let Some(agent) = self.agent(CUE_ANALYZER) else {
            return;
        };
        let started = Instant::now();

        // (segment index, action index)
        let mut units: Vec<(usize, usize)> = Vec::new();
        let mut requests: Vec<PerceptionRequest> = Vec::new();
        for (si, seg) in segments.iter().enumerate() {
            for (ai, action) in seg.actions.iter().enumerate() {
                if !action.key_decision {
                    continue;
                }
                let frames = decision_frames(sampled, action);
                if frames.is_empty() {
                    debug!(player = %action.player, ts = action.timestamp, "No frames for key decision");
                    continue;
                }
                units.push((si, ai));
                requests.push(PerceptionRequest::AnalyzeCues {
                    player: action.player.clone(),
                    timestamp: action.timestamp,
                    frames,
                });
            }
        }
        let results = fan_out(requests, self.limits.max_concurrency, |request| agent.perceive(request)).await;

        let before = failures.len();
        for ((si, ai), result) in units.iter().zip(results) {
            let unit = format!("segment[{si}].action[{ai}]");
            match result {
                Ok(PerceptionReport::Cues(summary)) => {
                    segments[*si].actions[*ai].behavior = Some(summary);
                }
                Ok(_) => record(failures, CUE_ANALYZER, unit, unexpected("cues")),
                Err(e) => record(failures, CUE_ANALYZER, unit, e),
            }
        }
        emit_stage_completed(CUE_ANALYZER, units.len(), failures.len() - before, elapsed_ms(started));
    }
}

fn record(failures: &mut Vec<AgentFailure>, capability: &str, unit: String, error: AgentError) {
    emit_agent_failed(capability, &unit, &error);
    failures.push(AgentFailure::new(capability, unit, error));
}

fn frame_unit(frame: &FrameRef) -> String {
    format!("frame[{}]", frame.index)
}

fn segment_unit(index: usize) -> String {
    format!("segment[{index}]")
}

fn frames_in(frames: &[FrameRef], start: f64, end: f64) -> Vec<FrameRef> {
    frames
        .iter()
        .filter(|f| start <= f.timestamp && f.timestamp < end)
        .cloned()
        .collect()
}

/// Frames from the decision start up to and including the action itself.
fn decision_frames(frames: &[FrameRef], action: &ActionEvent) -> Vec<FrameRef> {
    let start = action
        .decision_start
        .unwrap_or(action.timestamp - CUE_LOOKBACK_SECS);
    frames
        .iter()
        .filter(|f| start <= f.timestamp && f.timestamp <= action.timestamp)
        .cloned()
        .collect()
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use PhaseType::*;

    #[test]
    fn phases_need_consecutive_confirmation() {
        let readings = [PreFlop, PreFlop, PreFlop, Flop, PreFlop, Flop, Flop, Flop];
        let labels = stabilize_phases(&readings, 3);
        assert_eq!(labels, vec![PreFlop, PreFlop, PreFlop, PreFlop, PreFlop, Flop, Flop, Flop]);
    }

    #[test]
    fn jumps_and_backward_readings_are_ignored() {
        let readings = [PreFlop, PreFlop, River, River, River, PreFlop, Flop, Flop];
        let labels = stabilize_phases(&readings, 2);
        assert_eq!(labels, vec![PreFlop, PreFlop, PreFlop, PreFlop, PreFlop, PreFlop, Flop, Flop]);

        let readings = [Turn, Turn, Flop, Flop, Flop];
        assert!(stabilize_phases(&readings, 2).iter().all(|p| *p == Turn));
    }

    #[test]
    fn unknown_inherits_and_leading_frames_take_first_phase() {
        let readings = [Unknown, PreFlop, Unknown, PreFlop, Flop, Unknown, Flop];
        let labels = stabilize_phases(&readings, 2);
        assert_eq!(labels, vec![PreFlop, PreFlop, PreFlop, PreFlop, Flop, Flop, Flop]);
    }

    #[test]
    fn never_confirmed_stays_unknown() {
        let labels = stabilize_phases(&[Flop, Unknown, Turn], 3);
        assert!(labels.iter().all(|p| *p == Unknown));
        assert!(stabilize_phases(&[], 3).is_empty());
    }

    fn frames(n: usize) -> Vec<FrameRef> {
        (0..n)
            .map(|i| FrameRef {
                index: i,
                timestamp: i as f64,
                path: format!("frame_{:04}.jpg", i + 1).into(),
            })
            .collect()
    }

    #[test]
    fn segments_are_contiguous_and_half_open() {
        let labels = [PreFlop, PreFlop, Flop, Flop, Turn];
        let segs = segments_from_labels(&frames(5), &labels, 5.0);
        let spans: Vec<_> = segs.iter().map(|s| (s.phase, s.start, s.end)).collect();
        assert_eq!(spans, vec![(PreFlop, 0.0, 2.0), (Flop, 2.0, 4.0), (Turn, 4.0, 5.0)]);
    }

    #[test]
    fn decision_window_defaults_to_lookback() {
        let f = frames(10);
        let mut action = ActionEvent::new(6.0, "Alice", limp_core::ActionType::Raise, 500.0);
        let picked: Vec<usize> = decision_frames(&f, &action).iter().map(|f| f.index).collect();
        assert_eq!(picked, vec![3, 4, 5, 6]);
        action.decision_start = Some(5.0);
        assert_eq!(decision_frames(&f, &action).len(), 2);
    }
}
