//! Action detection from chip snapshots.
//!
//! Each frame of a segment is read into a snapshot (pot, stacks, active
//! flags). Consecutive snapshots are compared per player:
//!
//! - active to inactive is a fold;
//! - a stack drop above `min_bet` is a wager, classified against the largest
//!   wager seen so far in the segment (`bet`/`raise`/`call`), or `all-in`
//!   when the remaining stack falls below `all_in_stack`.
//!
//! Aggressive actions and decisions longer than `long_decision_secs` are
//! flagged as key decision moments.

use crate::json;
use crate::prompts::SNAPSHOT_PROMPT;
use async_trait::async_trait;
use limp_core::agent::{bounded, param_f64, unsupported};
use limp_core::{
    ActionEvent, ActionType, AgentContext, AgentError, AgentParams, FrameRef, PerceptionAgent,
    PerceptionReport, PerceptionRequest, PhaseType, RegistryError, VisionModel,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const NAME: &str = "action_detector";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorParams {
    pub min_bet: f64,
    pub all_in_stack: f64,
    pub raise_ratio: f64,
    pub long_decision_secs: f64,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            min_bet: 100.0,
            all_in_stack: 100.0,
            raise_ratio: 1.5,
            long_decision_secs: 10.0,
        }
    }
}

impl DetectorParams {
    pub fn from_params(params: &AgentParams) -> Self {
        let d = Self::default();
        Self {
            min_bet: param_f64(params, "min_bet", d.min_bet),
            all_in_stack: param_f64(params, "all_in_stack", d.all_in_stack),
            raise_ratio: param_f64(params, "raise_ratio", d.raise_ratio),
            long_decision_secs: param_f64(params, "long_decision_secs", d.long_decision_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeatSnapshot {
    pub name: String,
    pub stack: Option<f64>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp: f64,
    pub pot: Option<f64>,
    pub seats: Vec<SeatSnapshot>,
}

impl Snapshot {
    fn from_value(timestamp: f64, value: &Value) -> Self {
        let seats = value
            .get("players")
            .and_then(Value::as_array)
            .map(|players| {
                players
                    .iter()
                    .filter_map(|p| {
                        let name = p.get("name")?.as_str()?.trim();
                        if name.is_empty() {
                            return None;
                        }
                        Some(SeatSnapshot {
                            name: name.to_string(),
                            stack: p.get("stack").and_then(json::amount),
                            is_active: p.get("is_active").and_then(Value::as_bool).unwrap_or(true),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            timestamp,
            pot: value.get("pot").and_then(json::amount),
            seats,
        }
    }

    fn seat(&self, name: &str) -> Option<&SeatSnapshot> {
        self.seats.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

/// Apply the transition rules to an ordered run of snapshots.
pub fn detect(phase: PhaseType, snapshots: &[Snapshot], params: &DetectorParams) -> Vec<ActionEvent> {
    let mut events = Vec::new();
    let mut last_bet = 0.0_f64;

    for pair in snapshots.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        for seat in &cur.seats {
            let Some(before) = prev.seat(&seat.name) else {
                continue;
            };

            let action = if before.is_active && !seat.is_active {
                Some((ActionType::Fold, 0.0))
            } else {
                match (before.stack, seat.stack) {
                    (Some(b), Some(a)) if b - a > params.min_bet => {
                        let amount = b - a;
                        let kind = if a < params.all_in_stack {
                            ActionType::AllIn
                        } else if last_bet <= 0.0 {
                            if phase == PhaseType::PreFlop {
                                ActionType::Raise
                            } else {
                                ActionType::Bet
                            }
                        } else if amount > params.raise_ratio * last_bet {
                            ActionType::Raise
                        } else {
                            ActionType::Call
                        };
                        last_bet = last_bet.max(amount);
                        Some((kind, amount))
                    }
                    _ => None,
                }
            };

            if let Some((kind, amount)) = action {
                let mut event = ActionEvent::new(cur.timestamp, seat.name.clone(), kind, amount);
                let duration = cur.timestamp - prev.timestamp;
                event.decision_start = Some(prev.timestamp);
                event.decision_duration = Some(duration);
                event.key_decision = kind.is_aggressive() || duration >= params.long_decision_secs;
                events.push(event);
            }
        }
    }
    events
}

pub struct ActionDetector {
    vision: Arc<dyn VisionModel>,
    params: DetectorParams,
    call_timeout: Option<Duration>,
}

pub fn build(ctx: &AgentContext, params: &AgentParams) -> Result<Box<dyn PerceptionAgent>, RegistryError> {
    Ok(Box::new(ActionDetector {
        vision: ctx.require_vision(NAME)?,
        params: DetectorParams::from_params(params),
        call_timeout: ctx.call_timeout,
    }))
}

impl ActionDetector {
    async fn snapshot(&self, frame: &FrameRef) -> Result<Snapshot, AgentError> {
        let text = bounded(self.call_timeout, self.vision.describe(&frame.path, SNAPSHOT_PROMPT)).await?;
        let value = json::extract_object(&text)?;
        Ok(Snapshot::from_value(frame.timestamp, &value))
    }
}

#[async_trait]
impl PerceptionAgent for ActionDetector {
    fn capability(&self) -> &str {
        NAME
    }

    async fn perceive(&self, request: PerceptionRequest) -> Result<PerceptionReport, AgentError> {
        let kind = request.kind();
        let PerceptionRequest::DetectActions { phase, frames, .. } = request else {
            return Err(unsupported(NAME, kind));
        };

        let mut snapshots = Vec::with_capacity(frames.len());
        let mut last_error = None;
        for frame in &frames {
            match self.snapshot(frame).await {
                Ok(s) => snapshots.push(s),
                Err(e) => {
                    debug!(frame = frame.index, error = %e, "snapshot unreadable, skipping frame");
                    last_error = Some(e);
                }
            }
        }
        if snapshots.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        Ok(PerceptionReport::Actions(detect(phase, &snapshots, &self.params)))
    }
}
