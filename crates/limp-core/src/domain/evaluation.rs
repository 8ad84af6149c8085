//! Evaluation report schema.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    pub total: usize,
    pub correct: usize,
}

impl Tally {
    pub fn record(&mut self, correct: bool) {
        self.total += 1;
        if correct {
            self.correct += 1;
        }
    }

    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    pub fn merge(&mut self, other: &Tally) {
        self.total += other.total;
        self.correct += other.correct;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentContribution {
    pub invocations: usize,
    pub failures: usize,
    pub mean_confidence: f64,
}

impl AgentContribution {
    pub fn record(&mut self, confidence: f64) {
        let n = self.invocations as f64;
        self.mean_confidence = (self.mean_confidence * n + confidence) / (n + 1.0);
        self.invocations += 1;
    }

    pub fn merge(&mut self, other: &AgentContribution) {
        let total = self.invocations + other.invocations;
        if total > 0 {
            self.mean_confidence = (self.mean_confidence * self.invocations as f64
                + other.mean_confidence * other.invocations as f64)
                / total as f64;
        }
        self.invocations = total;
        self.failures += other.failures;
    }
}

/// Scores for one configuration over one or more episodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub config_name: String,
    pub episodes: Vec<String>,
    /// Question-set digest per episode.
    pub question_digests: BTreeMap<String, String>,
    pub enabled_agents: Vec<String>,
    pub overall: Tally,
    /// Questions answered with a chosen option.
    pub answered: usize,
    pub abstained: usize,
    pub failed: usize,
    pub by_type: BTreeMap<String, Tally>,
    pub by_level: BTreeMap<String, Tally>,
    pub by_tom_label: BTreeMap<String, Tally>,
    /// expected key -> predicted key (`abstained` / `none` when unanswered) -> count.
    pub confusion: BTreeMap<String, BTreeMap<String, usize>>,
    pub agent_contribution: BTreeMap<String, AgentContribution>,
}

impl EvaluationReport {
    pub fn accuracy(&self) -> f64 {
        self.overall.accuracy()
    }

    /// Accuracy over questions that received an answer.
    pub fn answered_accuracy(&self) -> f64 {
        if self.answered == 0 {
            0.0
        } else {
            self.overall.correct as f64 / self.answered as f64
        }
    }

    /// Fold another episode's report into this one.
    pub fn merge(&mut self, other: &EvaluationReport) {
        self.episodes.extend(other.episodes.iter().cloned());
        self.question_digests
            .extend(other.question_digests.iter().map(|(k, v)| (k.clone(), v.clone())));
        for agent in &other.enabled_agents {
            if !self.enabled_agents.contains(agent) {
                self.enabled_agents.push(agent.clone());
            }
        }
        self.enabled_agents.sort();
        self.overall.merge(&other.overall);
        self.answered += other.answered;
        self.abstained += other.abstained;
        self.failed += other.failed;
        merge_tallies(&mut self.by_type, &other.by_type);
        merge_tallies(&mut self.by_level, &other.by_level);
        merge_tallies(&mut self.by_tom_label, &other.by_tom_label);
        for (expected, row) in &other.confusion {
            let target = self.confusion.entry(expected.clone()).or_default();
            for (predicted, count) in row {
                *target.entry(predicted.clone()).or_default() += count;
            }
        }
        for (agent, contribution) in &other.agent_contribution {
            self.agent_contribution
                .entry(agent.clone())
                .or_default()
                .merge(contribution);
        }
    }
}

fn merge_tallies(into: &mut BTreeMap<String, Tally>, from: &BTreeMap<String, Tally>) {
    for (key, tally) in from {
        into.entry(key.clone()).or_default().merge(tally);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_accuracy() {
        let mut t = Tally::default();
        assert_eq!(t.accuracy(), 0.0);
        t.record(true);
        t.record(false);
        assert_eq!(t.accuracy(), 0.5);
    }

    #[test]
    fn contribution_mean_is_weighted_on_merge() {
        let mut a = AgentContribution::default();
        a.record(1.0);
        let mut b = AgentContribution::default();
        b.record(0.0);
        b.record(0.0);
        b.record(0.0);
        a.merge(&b);
        assert_eq!(a.invocations, 4);
        assert!((a.mean_confidence - 0.25).abs() < 1e-9);
    }

    #[test]
    fn merge_accumulates_counts() {
        let mut a = EvaluationReport {
            config_name: "full".to_string(),
            episodes: vec!["ep1".to_string()],
            overall: Tally { total: 2, correct: 1 },
            answered: 2,
            ..Default::default()
        };
        a.confusion
            .entry("A".to_string())
            .or_default()
            .insert("B".to_string(), 1);
        let mut b = a.clone();
        b.episodes = vec!["ep2".to_string()];
        b.abstained = 1;
        a.merge(&b);
        assert_eq!(a.overall.total, 4);
        assert_eq!(a.abstained, 1);
        assert_eq!(a.confusion["A"]["B"], 2);
        assert_eq!(a.episodes, vec!["ep1", "ep2"]);
        assert_eq!(a.answered_accuracy(), 0.5);
    }
}
