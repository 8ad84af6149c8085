//! Reasoning pipeline: answer-free prompts plus perception in, answers out.
//!
//! Each question has one required agent picked by its ToM label. The other
//! enabled reasoning agents contribute supporting scores. Scores are combined
//! by a weighted average and the highest option wins, ties going to the
//! lowest key.

use crate::stage::{run_units, CallLimits};
use limp_agents::reasoning::normalize;
use limp_core::agent::param_f64;
use limp_core::obs::{emit_abstained, emit_agent_failed, emit_stage_completed};
use limp_core::{
    AgentContext, AgentFailure, AgentRegistry, Answer, ConfigurationError, Namespace,
    PerceptionOutput, QuestionPrompt, ReasoningAgent, ReasoningRun, ReasoningState,
    ResolvedConfig, TomLabel,
};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info};

pub const POSTURE: &str = "posture";
pub const EQUITY: &str = "equity";
pub const TOM_BELIEF: &str = "tom_belief";
pub const TOM_SOCIAL: &str = "tom_social";

/// The agent that must answer questions carrying `label`.
pub fn required_agent(label: TomLabel) -> &'static str {
    match label {
        TomLabel::Belief => TOM_BELIEF,
        TomLabel::SocialGoal => TOM_SOCIAL,
    }
}

/// Aggregation weight unless overridden with a `weight` param.
pub fn default_weight(agent: &str) -> f64 {
    match agent {
        TOM_SOCIAL => 0.35,
        TOM_BELIEF => 0.30,
        POSTURE => 0.20,
        EQUITY => 0.15,
        _ => 0.25,
    }
}

struct Slot {
    name: String,
    weight: f64,
    agent: Box<dyn ReasoningAgent>,
}

pub struct ReasoningPipeline {
    slots: Vec<Slot>,
    limits: CallLimits,
}

impl std::fmt::Debug for ReasoningPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let agents: Vec<(&str, f64)> = self.slots.iter().map(|s| (s.name.as_str(), s.weight)).collect();
        f.debug_struct("ReasoningPipeline")
            .field("agents", &agents)
            .field("limits", &self.limits)
            .finish()
    }
}

impl ReasoningPipeline {
    pub fn build(
        registry: &AgentRegistry,
        config: &ResolvedConfig,
        ctx: &AgentContext,
    ) -> Result<Self, ConfigurationError> {
        let mut slots = Vec::new();
        for name in registry.list(Namespace::Reasoning) {
            if !config.is_enabled(&name) {
                continue;
            }
            let params = config.params(&name);
            let weight = param_f64(&params, "weight", default_weight(&name)).max(0.0);
            let agent = registry.build_reasoning(&name, ctx, &params)?;
            slots.push(Slot { name, weight, agent });
        }
        for name in [TOM_BELIEF, TOM_SOCIAL, POSTURE, EQUITY] {
            if config.is_enabled(name) && !registry.contains(Namespace::Reasoning, name) {
                return Err(ConfigurationError::UnregisteredAgent {
                    name: name.to_string(),
                });
            }
        }
        Ok(Self {
            slots,
            limits: CallLimits::from_config(config),
        })
    }

    pub fn enabled_agents(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.name.clone()).collect()
    }

    fn has(&self, name: &str) -> bool {
        self.slots.iter().any(|s| s.name == name)
    }

    /// Answer one question.
    ///
    /// Errors only on an invalid state transition; agent failures are
    /// recorded on the answer.
    pub async fn answer(
        &self,
        question: &QuestionPrompt,
        perception: Option<&PerceptionOutput>,
    ) -> limp_core::Result<Answer> {
        let required = required_agent(question.tom_label);
        let mut run = ReasoningRun::new();
        let mut answer = Answer {
            question_id: question.id.clone(),
            state: run.state(),
            chosen_option: None,
            rationale: String::new(),
            final_scores: BTreeMap::new(),
            required_agent: Some(required.to_string()),
            opinions: Vec::new(),
            failures: Vec::new(),
        };

        let malformed = match perception {
            None => Some("no perception output for the episode"),
            Some(_) if question.options.is_empty() => Some("question has no options"),
            Some(_) => None,
        };
        let (Some(perception), None) = (perception, malformed) else {
            run.advance(ReasoningState::Failed)?;
            answer.state = run.state();
            answer.rationale = malformed.unwrap_or_default().to_string();
            return Ok(answer);
        };
        run.advance(ReasoningState::PerceptionLoaded)?;

        if !self.has(required) {
            run.advance(ReasoningState::Abstained)?;
            emit_abstained(&question.id, required);
            answer.state = run.state();
            answer.rationale = format!("{required} is disabled");
            return Ok(answer);
        }
        run.advance(ReasoningState::Answering)?;

        let indices: Vec<usize> = (0..self.slots.len()).collect();
        let results = run_units(indices, self.limits, |i| {
            self.slots[i].agent.reason(question, perception)
        })
        .await;

        let mut required_error = None;
        for (slot, result) in self.slots.iter().zip(results) {
            match result {
                Ok(mut opinion) => {
                    opinion.weight = slot.weight;
                    answer.opinions.push(opinion);
                }
                Err(e) => {
                    emit_agent_failed(&slot.name, &question.id, &e);
                    if slot.name == required {
                        required_error = Some(e.to_string());
                    }
                    answer
                        .failures
                        .push(AgentFailure::new(&slot.name, question.id.clone(), e));
                }
            }
        }

        run.advance(ReasoningState::Done)?;
        answer.state = run.state();

        if let Some(error) = required_error {
            answer.rationale = format!("{required} failed: {error}");
            return Ok(answer);
        }

        answer.final_scores = combine(question, &answer.opinions);
        answer.chosen_option = pick(&answer.final_scores);
        answer.rationale = answer
            .opinions
            .iter()
            .find(|o| o.agent == required)
            .map(|o| o.rationale.clone())
            .unwrap_or_default();
        debug!(
            question_id = %question.id,
            chosen = ?answer.chosen_option,
            opinions = answer.opinions.len(),
            "Answered question"
        );
        Ok(answer)
    }

    /// Answer every prompt, sequentially per question; agents for one
    /// question run concurrently.
    pub async fn answer_all(
        &self,
        prompts: &[QuestionPrompt],
        perception: Option<&PerceptionOutput>,
    ) -> limp_core::Result<Vec<Answer>> {
        let started = Instant::now();
        let mut answers = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            answers.push(self.answer(prompt, perception).await?);
        }
        let failures: usize = answers.iter().map(|a| a.failures.len()).sum();
        emit_stage_completed(
            "reasoning",
            answers.len(),
            failures,
            started.elapsed().as_millis() as u64,
        );
        info!(
            questions = answers.len(),
            answered = answers.iter().filter(|a| a.is_answered()).count(),
            abstained = answers
                .iter()
                .filter(|a| a.state == ReasoningState::Abstained)
                .count(),
            "Reasoning finished"
        );
        Ok(answers)
    }
}

/// Weighted average of the opinions over the question's options, normalized.
pub fn combine(question: &QuestionPrompt, opinions: &[limp_core::AgentOpinion]) -> BTreeMap<String, f64> {
    let scores: BTreeMap<String, f64> = question
        .option_keys()
        .into_iter()
        .map(|key| {
            let total = opinions
                .iter()
                .map(|o| o.weight * o.option_scores.get(key).copied().unwrap_or(0.0))
                .sum::<f64>();
            (key.to_string(), total)
        })
        .collect();
    normalize(scores)
}

/// Highest score; the lowest key wins a tie.
pub fn pick(scores: &BTreeMap<String, f64>) -> Option<String> {
    let mut best: Option<(&String, f64)> = None;
    for (key, &score) in scores {
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((key, score)),
        }
    }
    best.map(|(k, _)| k.clone())
}
