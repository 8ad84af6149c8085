//! Score answers against a question set's answer keys.

use limp_core::{Answer, EvaluationReport, QuestionSet, ReasoningState};
use std::collections::BTreeMap;

const ABSTAINED: &str = "abstained";
const NO_CHOICE: &str = "none";

/// Evaluate one episode's answers.
///
/// Every question counts toward the totals. Abstentions and answers without
/// a chosen option are scored incorrect; a question with no matching answer
/// is treated as failed.
pub fn evaluate(
    config_name: &str,
    questions: &QuestionSet,
    answers: &[Answer],
    enabled_agents: &[String],
) -> EvaluationReport {
    let by_id: BTreeMap<&str, &Answer> = answers.iter().map(|a| (a.question_id.as_str(), a)).collect();
    let mut enabled = enabled_agents.to_vec();
    enabled.sort();

    let mut report = EvaluationReport {
        config_name: config_name.to_string(),
        episodes: vec![questions.episode_id.clone()],
        question_digests: BTreeMap::from([(questions.episode_id.clone(), questions.digest.clone())]),
        enabled_agents: enabled,
        ..Default::default()
    };

    for question in &questions.questions {
        let answer = by_id.get(question.id.as_str()).copied();
        let predicted = match answer {
            Some(a) if a.state == ReasoningState::Abstained => {
                report.abstained += 1;
                ABSTAINED.to_string()
            }
            Some(Answer {
                chosen_option: Some(choice),
                ..
            }) => {
                report.answered += 1;
                choice.clone()
            }
            _ => {
                report.failed += 1;
                NO_CHOICE.to_string()
            }
        };
        let correct = predicted == question.answer;

        report.overall.record(correct);
        report
            .by_type
            .entry(question.question_type.to_string())
            .or_default()
            .record(correct);
        report
            .by_level
            .entry(question.level.to_string())
            .or_default()
            .record(correct);
        report
            .by_tom_label
            .entry(question.tom_label.to_string())
            .or_default()
            .record(correct);
        *report
            .confusion
            .entry(question.answer.clone())
            .or_default()
            .entry(predicted)
            .or_default() += 1;

        if let Some(answer) = answer {
            for opinion in &answer.opinions {
                report
                    .agent_contribution
                    .entry(opinion.agent.clone())
                    .or_default()
                    .record(opinion.confidence);
            }
            for failure in &answer.failures {
                let entry = report
                    .agent_contribution
                    .entry(failure.capability.clone())
                    .or_default();
                entry.invocations += 1;
                entry.failures += 1;
            }
        }
    }
    report
}
