//! Ablation runs: re-answer stored questions under reasoning-agent toggles.
//!
//! Perception output and question sets come from disk and are shared by
//! every configuration, so reports differ only in which agents answered.

use crate::evaluation::evaluate;
use crate::reasoning::{ReasoningPipeline, EQUITY, POSTURE, TOM_BELIEF, TOM_SOCIAL};
use crate::reporting::{render_ablation_md, write_evaluation};
use crate::store::{discover_episodes, read_json, write_atomic, EpisodeLayout};
use anyhow::{bail, Context, Result};
use limp_core::{
    AgentContext, AgentRegistry, ConfigurationError, EvaluationReport, PerceptionOutput,
    QuestionSet, ResolvedConfig,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub toggles: [(&'static str, bool); 4],
}

const fn preset(name: &'static str, posture: bool, equity: bool, belief: bool, social: bool) -> Preset {
    Preset {
        name,
        toggles: [
            (POSTURE, posture),
            (EQUITY, equity),
            (TOM_BELIEF, belief),
            (TOM_SOCIAL, social),
        ],
    }
}

pub const PRESETS: [Preset; 9] = [
    preset("full", true, true, true, true),
    preset("no_posture", false, true, true, true),
    preset("no_equity", true, false, true, true),
    preset("no_tom_belief", true, true, false, true),
    preset("no_tom_social", true, true, true, false),
    preset("no_tom", true, true, false, false),
    preset("baseline_only", false, false, false, false),
    preset("posture_only", true, false, false, false),
    preset("tom_only", false, false, true, true),
];

pub fn find_preset(name: &str) -> Result<&'static Preset, ConfigurationError> {
    PRESETS
        .iter()
        .find(|p| p.name == name.trim())
        .ok_or_else(|| ConfigurationError::UnknownPreset(name.trim().to_string()))
}

/// `"full,no_tom"` to presets; empty means all of them.
pub fn parse_presets(list: Option<&str>) -> Result<Vec<&'static Preset>, ConfigurationError> {
    match list.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(PRESETS.iter().collect()),
        Some(list) => list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(find_preset)
            .collect(),
    }
}

struct StoredEpisode {
    id: String,
    perception: PerceptionOutput,
    questions: QuestionSet,
}

/// Stored perception is narrowed to `config`'s protocol before any agent sees it.
fn load_episodes(root: &Path, config: &ResolvedConfig) -> Result<Vec<StoredEpisode>> {
    let mut episodes = Vec::new();
    for dir in discover_episodes(root)? {
        let layout = EpisodeLayout::from_dir(&dir);
        let loaded = read_json::<PerceptionOutput>(&layout.perception()).and_then(|perception| {
            let questions: QuestionSet = read_json(&layout.questions())?;
            Ok((perception, questions))
        });
        match loaded {
            Ok((_, questions)) if !questions.verify_digest() => {
                warn!(episode_id = %layout.id, "Question set digest mismatch, skipping episode");
            }
            Ok((mut perception, questions)) => {
                perception.scope_to(config.protocol, config.hero.as_deref());
                episodes.push(StoredEpisode {
                    id: layout.id,
                    perception,
                    questions,
                });
            }
            Err(e) => {
                warn!(episode_id = %layout.id, error = %format!("{e:#}"), "Episode not ready for ablation");
            }
        }
    }
    Ok(episodes)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AblationOutcome {
    pub reports: Vec<EvaluationReport>,
    pub comparison: PathBuf,
}

pub struct AblationRunner<'a> {
    registry: &'a AgentRegistry,
    base: &'a ResolvedConfig,
    ctx: &'a AgentContext,
}

impl<'a> AblationRunner<'a> {
    pub fn new(registry: &'a AgentRegistry, base: &'a ResolvedConfig, ctx: &'a AgentContext) -> Self {
        Self { registry, base, ctx }
    }

    /// Every preset's pipeline is built before any episode is answered, so a
    /// bad preset fails the whole run up front.
    pub async fn run(
        &self,
        episodes_root: &Path,
        presets: &[&Preset],
        report: Option<&Path>,
    ) -> Result<AblationOutcome> {
        let mut pipelines = Vec::with_capacity(presets.len());
        for preset in presets {
            let config = self.base.with_toggles(&preset.toggles, self.registry)?;
            let pipeline = ReasoningPipeline::build(self.registry, &config, self.ctx)?;
            pipelines.push((preset.name, config, pipeline));
        }

        let episodes = load_episodes(episodes_root, self.base)?;
        if episodes.is_empty() {
            bail!("no episodes with perception output and questions under {:?}", episodes_root);
        }
        info!(
            episodes = episodes.len(),
            configs = pipelines.len(),
            "Starting ablation"
        );

        let out_dir = episodes_root.join("ablation");
        let mut reports = Vec::with_capacity(pipelines.len());
        for (name, config, pipeline) in &pipelines {
            let enabled = config.enabled_agents();
            let mut merged = EvaluationReport {
                config_name: name.to_string(),
                enabled_agents: enabled.clone(),
                ..Default::default()
            };
            for episode in &episodes {
                let answers = pipeline
                    .answer_all(&episode.questions.prompts(), Some(&episode.perception))
                    .await
                    .with_context(|| format!("answer {} under {}", episode.id, name))?;
                merged.merge(&evaluate(name, &episode.questions, &answers, &enabled));
            }
            let dir = out_dir.join(name);
            write_evaluation(
                &dir.join(crate::store::EVALUATION_JSON_FILE),
                &dir.join(crate::store::EVALUATION_MD_FILE),
                &merged,
            )?;
            info!(
                config = %name,
                accuracy = merged.accuracy(),
                abstained = merged.abstained,
                "Ablation config evaluated"
            );
            reports.push(merged);
        }

        let comparison = report
            .map(Path::to_path_buf)
            .unwrap_or_else(|| out_dir.join("comparison.md"));
        write_atomic(&comparison, render_ablation_md(&reports).as_bytes())?;
        Ok(AblationOutcome { reports, comparison })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_resolve_by_name() {
        let all = parse_presets(None).unwrap();
        assert_eq!(all.len(), 9);
        let picked = parse_presets(Some("full, no_tom")).unwrap();
        assert_eq!(picked.iter().map(|p| p.name).collect::<Vec<_>>(), vec!["full", "no_tom"]);
        assert_eq!(
            parse_presets(Some("full,everything")).unwrap_err(),
            ConfigurationError::UnknownPreset("everything".to_string())
        );
    }

    #[test]
    fn preset_toggles_cover_every_reasoning_agent() {
        for p in &PRESETS {
            let names: Vec<&str> = p.toggles.iter().map(|(n, _)| *n).collect();
            assert_eq!(names, vec![POSTURE, EQUITY, TOM_BELIEF, TOM_SOCIAL]);
        }
        let baseline = find_preset("baseline_only").unwrap();
        assert!(baseline.toggles.iter().all(|(_, on)| !on));
    }
}
