//! QA generator: questions and answer keys from perception plus ground truth.
//!
//! Generation is a pure function of its inputs. Ids, ordering and the set
//! digest are identical for identical input.

pub mod templates;

use limp_core::obs::emit_question_skipped;
use limp_core::{
    ActionEvent, ActionType, DataIntegrityError, GroundTruth, PerceptionOutput, PhaseSegment,
    ProtocolMode, Question, QuestionContext, QuestionLevel, QuestionOption, QuestionSet,
    ResolvedConfig, ScoringContext, SkippedQuestion, AnswerSource,
};
use std::collections::BTreeSet;
use templates::QuestionTemplate;
use tracing::info;

/// Commentary trails the action it describes by up to this many seconds.
pub const NARRATION_SLACK_SECS: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct QaRules {
    pub protocol: ProtocolMode,
    pub levels: BTreeSet<QuestionLevel>,
    pub bluff_amount_threshold: f64,
    pub narration_slack: f64,
}

impl QaRules {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            protocol: config.protocol,
            levels: config.qa_levels.clone(),
            bluff_amount_threshold: config.bluff_amount_threshold,
            narration_slack: NARRATION_SLACK_SECS,
        }
    }
}

impl Default for QaRules {
    fn default() -> Self {
        Self::from_config(&ResolvedConfig::default())
    }
}

/// The thing a template asks about.
#[derive(Debug, Clone)]
pub enum Unit<'a> {
    Action {
        /// `<episode>_act_<n>`, numbered over non-fold, non-check actions.
        id: String,
        segment: &'a PhaseSegment,
        action: &'a ActionEvent,
        opponent: Option<String>,
    },
    Phase {
        /// `<episode>_phase_<i>`, indexed by segment.
        id: String,
        segment: &'a PhaseSegment,
        players: Vec<String>,
    },
}

impl Unit<'_> {
    pub fn id(&self) -> &str {
        match self {
            Unit::Action { id, .. } | Unit::Phase { id, .. } => id,
        }
    }

    pub fn level(&self) -> QuestionLevel {
        match self {
            Unit::Action { .. } => QuestionLevel::Action,
            Unit::Phase { .. } => QuestionLevel::Phase,
        }
    }
}

/// A question before the generator stamps level, type and protocol on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub id: String,
    pub timestamp: f64,
    pub prompt: String,
    pub options: Vec<QuestionOption>,
    pub answer: String,
    pub answer_source: AnswerSource,
    pub context: QuestionContext,
    pub scoring: ScoringContext,
}

/// Action units in timeline order. Folds and checks ask nothing.
pub fn action_units<'a>(episode_id: &str, perception: &'a PerceptionOutput) -> Vec<Unit<'a>> {
    let mut units = Vec::new();
    let mut n = 0;
    for (segment, action) in perception.timeline.actions() {
        if matches!(action.action, ActionType::Fold | ActionType::Check) {
            continue;
        }
        n += 1;
        let opponent = segment
            .players()
            .into_iter()
            .find(|p| !p.eq_ignore_ascii_case(&action.player));
        units.push(Unit::Action {
            id: format!("{episode_id}_act_{n:03}"),
            segment,
            action,
            opponent,
        });
    }
    units
}

/// Phase units for segments with at least two players.
pub fn phase_units<'a>(episode_id: &str, perception: &'a PerceptionOutput) -> Vec<Unit<'a>> {
    perception
        .timeline
        .segments
        .iter()
        .enumerate()
        .filter_map(|(i, segment)| {
            let players = segment.players();
            (players.len() >= 2).then(|| Unit::Phase {
                id: format!("{episode_id}_phase_{i:02}"),
                segment,
                players,
            })
        })
        .collect()
}

pub struct QaGenerator {
    rules: QaRules,
    templates: Vec<Box<dyn QuestionTemplate>>,
}

impl std::fmt::Debug for QaGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.templates.iter().map(|t| t.name()).collect();
        f.debug_struct("QaGenerator")
            .field("rules", &self.rules)
            .field("templates", &names)
            .finish()
    }
}

impl QaGenerator {
    pub fn new(rules: QaRules) -> Self {
        Self {
            rules,
            templates: templates::builtin(),
        }
    }

    pub fn with_templates(rules: QaRules, templates: Vec<Box<dyn QuestionTemplate>>) -> Self {
        Self { rules, templates }
    }

    fn finish(&self, template: &dyn QuestionTemplate, draft: Draft) -> Question {
        let scoring_context = match self.rules.protocol {
            ProtocolMode::Audience => Some(draft.scoring),
            ProtocolMode::Player => None,
        };
        Question {
            id: draft.id,
            level: template.level(),
            question_type: template.question_type(),
            tom_label: template.tom_label(),
            protocol: self.rules.protocol,
            timestamp: draft.timestamp,
            prompt: draft.prompt,
            options: draft.options,
            answer: draft.answer,
            answer_source: draft.answer_source,
            context: draft.context,
            scoring_context,
        }
    }

    pub fn generate(&self, perception: &PerceptionOutput, gt: &GroundTruth) -> QuestionSet {
        let episode_id = perception.episode_id.as_str();
        let mut questions = Vec::new();
        let mut skipped = Vec::new();

        for level in &self.rules.levels {
            let units = match level {
                QuestionLevel::Action => action_units(episode_id, perception),
                QuestionLevel::Phase => phase_units(episode_id, perception),
            };
            for unit in &units {
                for template in self.templates.iter().filter(|t| t.level() == *level) {
                    for attempt in template.apply(unit, gt, &self.rules) {
                        match attempt {
                            Ok(draft) => questions.push(self.finish(template.as_ref(), draft)),
                            Err(e) => skipped.push(skip(template.name(), unit.id(), &e)),
                        }
                    }
                }
            }
        }

        info!(
            episode_id = %episode_id,
            questions = questions.len(),
            skipped = skipped.len(),
            protocol = %self.rules.protocol,
            "Generated question set"
        );
        QuestionSet::new(episode_id, self.rules.protocol, questions, skipped)
    }
}

fn skip(template: &str, unit: &str, error: &DataIntegrityError) -> SkippedQuestion {
    emit_question_skipped(template, unit, error);
    SkippedQuestion {
        template: template.to_string(),
        unit: unit.to_string(),
        reason: error.to_string(),
    }
}
