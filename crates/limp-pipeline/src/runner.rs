//! Episode and batch orchestration.
//!
//! One episode is processed fully before the next. Every stage writes its
//! artifact atomically; a skipped stage loads the artifact a previous run
//! left behind. `run_result.json` is written for every episode, including
//! failed ones.

use crate::annotation::AnnotationPipeline;
use crate::evaluation::evaluate;
use crate::perception::PerceptionPipeline;
use crate::preprocess::Preprocessor;
use crate::qa::{QaGenerator, QaRules};
use crate::reasoning::ReasoningPipeline;
use crate::reporting::write_evaluation;
use crate::store::{
    discover_episodes, discover_videos, episode_id_for_video, read_json, read_json_opt,
    write_json_atomic, EpisodeLayout,
};
use anyhow::{bail, Context, Result};
use limp_core::obs::{emit_episode_finished, emit_episode_started, EpisodeSpan};
use limp_core::{
    AgentContext, AgentRegistry, Answer, ConfigurationError, Episode, EpisodeStatus,
    FrameSequence, GroundTruth, PerceptionOutput, PrivilegedMetadata, QuestionSet,
    ResolvedConfig, RunResult,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn};

/// Stages to skip in favor of artifacts already on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageSkips {
    pub preprocess: bool,
    pub perception: bool,
    pub annotation: bool,
    pub qa: bool,
    pub reasoning: bool,
}

impl StageSkips {
    /// Reuse perception and questions; rerun reasoning only.
    pub fn reasoning_only() -> Self {
        Self {
            preprocess: true,
            perception: true,
            annotation: true,
            qa: true,
            reasoning: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchSource {
    /// Already-preprocessed episode directories under this root.
    Episodes(PathBuf),
    /// Video files under `videos`; episodes are written under `output_root`.
    Videos { videos: PathBuf, output_root: PathBuf },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub episodes: Vec<(String, EpisodeStatus)>,
    /// Episodes left alone because a run result already existed.
    pub skipped: Vec<String>,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn count(&self, status: EpisodeStatus) -> usize {
        self.episodes.iter().filter(|(_, s)| *s == status).count()
    }
}

#[derive(Debug)]
pub struct EpisodeRunner {
    config: ResolvedConfig,
    config_name: String,
    preprocessor: Preprocessor,
    perception: PerceptionPipeline,
    annotation: AnnotationPipeline,
    qa: QaGenerator,
    reasoning: ReasoningPipeline,
}

impl EpisodeRunner {
    /// Build every pipeline for `config`. Fails before any episode runs if an
    /// enabled agent is unknown or cannot be constructed.
    pub fn build(
        registry: &AgentRegistry,
        config: &ResolvedConfig,
        ctx: &AgentContext,
        config_name: &str,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            config: config.clone(),
            config_name: config_name.to_string(),
            preprocessor: Preprocessor::new(config.fps),
            perception: PerceptionPipeline::build(registry, config, ctx)?,
            annotation: AnnotationPipeline::build(registry, config, ctx)?,
            qa: QaGenerator::new(QaRules::from_config(config)),
            reasoning: ReasoningPipeline::build(registry, config, ctx)?,
        })
    }

    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Preprocess `video` into `output_root/<stem>/` and run every stage.
    pub async fn run(&self, video: &Path, output_root: &Path, skips: StageSkips) -> RunResult {
        let layout = EpisodeLayout::new(output_root, &episode_id_for_video(video));
        if !skips.preprocess {
            if let Err(e) = self.preprocessor.extract(video, &layout).await {
                let mut result = RunResult::new(&layout.id, &self.config_name);
                result.enabled_agents = self.config.enabled_agents();
                result.fail(format!("preprocess: {e:#}"));
                result.settle();
                self.persist(&layout, &result);
                emit_episode_finished(&layout.id, "failed", 0);
                return result;
            }
        }
        self.run_episode(&layout, skips).await
    }

    /// Run the pipeline stages on an existing episode directory.
    pub async fn run_episode(&self, layout: &EpisodeLayout, skips: StageSkips) -> RunResult {
        let _span = EpisodeSpan::enter(&layout.id, &self.config_name);
        let started = Instant::now();
        let enabled = self.config.enabled_agents();
        emit_episode_started(&layout.id, enabled.len());

        let mut result = RunResult::new(&layout.id, &self.config_name);
        result.enabled_agents = enabled;
        if let Err(e) = self.stages(layout, skips, &mut result).await {
            warn!(episode_id = %layout.id, error = %format!("{e:#}"), "Episode failed");
            result.fail(format!("{e:#}"));
        }
        result.settle();
        self.persist(layout, &result);

        emit_episode_finished(
            &layout.id,
            &result.status.to_string(),
            started.elapsed().as_millis() as u64,
        );
        result
    }

    fn persist(&self, layout: &EpisodeLayout, result: &RunResult) {
        if let Err(e) = write_json_atomic(&layout.run_result(), result) {
            warn!(episode_id = %layout.id, error = %format!("{e:#}"), "Could not write run result");
        }
    }

    fn load_episode(&self, layout: &EpisodeLayout) -> Result<Episode> {
        let frames_dir = layout.frames_dir();
        let frames = if frames_dir.is_dir() {
            FrameSequence::from_dir(&frames_dir, self.config.fps)
                .with_context(|| format!("read frames in {:?}", frames_dir))?
        } else {
            FrameSequence::from_paths(Vec::new(), self.config.fps)
        };
        let audio = layout.audio();
        let metadata: Option<PrivilegedMetadata> =
            read_json_opt(&layout.metadata()).context("load episode metadata")?;
        Ok(Episode {
            id: layout.id.clone(),
            dir: layout.dir.clone(),
            frames,
            audio: audio.is_file().then_some(audio),
            protocol: self.config.protocol,
            metadata,
        })
    }

    async fn stages(&self, layout: &EpisodeLayout, skips: StageSkips, result: &mut RunResult) -> Result<()> {
        let episode = self.load_episode(layout)?;

        let perception: PerceptionOutput = if skips.perception {
            let mut cached: PerceptionOutput =
                read_json(&layout.perception()).context("load cached perception output")?;
            cached
                .timeline
                .validate()
                .with_context(|| format!("cached {:?}", layout.perception()))?;
            cached.scope_to(self.config.protocol, self.config.hero.as_deref());
            info!(
                episode_id = %episode.id,
                protocol = %cached.protocol,
                "Skipping perception, using cached output"
            );
            cached
        } else {
            if episode.frames.is_empty() {
                bail!("no frames in {:?}", layout.frames_dir());
            }
            let output = self.perception.run(&episode.id, &episode.frames).await;
            write_json_atomic(&layout.perception(), &output)?;
            output
        };
        result.failures.extend(perception.failures.iter().cloned());
        result.perception = Some(perception.clone());

        let ground_truth: Option<GroundTruth> = if skips.annotation {
            info!(episode_id = %episode.id, "Skipping annotation, using cached ground truth");
            read_json_opt(&layout.ground_truth()).context("load cached ground truth")?
        } else {
            let (gt, failures) = self
                .annotation
                .run(&episode.id, episode.audio.as_deref(), episode.metadata.as_ref())
                .await;
            write_json_atomic(&layout.ground_truth(), &gt)?;
            result.failures.extend(failures);
            Some(gt)
        };
        result.ground_truth = ground_truth.clone();

        let questions: QuestionSet = if skips.qa {
            let cached: QuestionSet = read_json(&layout.questions()).context("load cached question set")?;
            if !cached.verify_digest() {
                bail!("question set digest mismatch in {:?}", layout.questions());
            }
            info!(episode_id = %episode.id, "Skipping QA generation, using cached questions");
            cached
        } else {
            let gt = ground_truth
                .as_ref()
                .with_context(|| format!("no ground truth for {}", episode.id))?;
            let set = self.qa.generate(&perception, gt);
            write_json_atomic(&layout.questions(), &set)?;
            set
        };
        result.questions = Some(questions.clone());

        let answers: Vec<Answer> = if skips.reasoning {
            info!(episode_id = %episode.id, "Skipping reasoning");
            read_json_opt(&layout.reasoning())
                .context("load cached answers")?
                .unwrap_or_default()
        } else {
            let answers = self
                .reasoning
                .answer_all(&questions.prompts(), Some(&perception))
                .await?;
            write_json_atomic(&layout.reasoning(), &answers)?;
            answers
        };

        if !skips.reasoning || !answers.is_empty() {
            let report = evaluate(
                &self.config_name,
                &questions,
                &answers,
                &self.config.enabled_agents(),
            );
            write_evaluation(&layout.evaluation_json(), &layout.evaluation_md(), &report)?;
            info!(
                episode_id = %episode.id,
                accuracy = report.accuracy(),
                questions = report.overall.total,
                "Evaluated episode"
            );
            result.evaluation = Some(report);
        }
        result.answers = answers;
        Ok(())
    }

    /// Run every episode under `source` in name order.
    ///
    /// Per-episode failures are recorded and the batch moves on. Flipping
    /// `cancel` to `true` abandons the current episode; results already on
    /// disk are left as they are.
    pub async fn run_batch(
        &self,
        source: &BatchSource,
        skips: StageSkips,
        force: bool,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<BatchSummary> {
        let jobs: Vec<(EpisodeLayout, Option<PathBuf>)> = match source {
            BatchSource::Episodes(root) => discover_episodes(root)?
                .iter()
                .map(|dir| (EpisodeLayout::from_dir(dir), None))
                .collect(),
            BatchSource::Videos { videos, output_root } => discover_videos(videos)?
                .into_iter()
                .map(|video| {
                    let layout = EpisodeLayout::new(output_root, &episode_id_for_video(&video));
                    (layout, Some(video))
                })
                .collect(),
        };
        info!(episodes = jobs.len(), force = force, "Starting batch");

        let mut summary = BatchSummary::default();
        for (layout, video) in jobs {
            if *cancel.borrow() {
                summary.cancelled = true;
                break;
            }
            if !force && layout.run_result().is_file() {
                info!(episode_id = %layout.id, "Run result exists, skipping");
                summary.skipped.push(layout.id.clone());
                continue;
            }
            let work = async {
                match &video {
                    Some(video) => {
                        let root = layout.dir.parent().unwrap_or_else(|| Path::new("."));
                        self.run(video, root, skips).await
                    }
                    None => self.run_episode(&layout, skips).await,
                }
            };
            tokio::select! {
                result = work => {
                    summary.episodes.push((layout.id.clone(), result.status));
                }
                _ = cancelled(&mut cancel) => {
                    warn!(episode_id = %layout.id, "Batch cancelled mid-episode");
                    summary.cancelled = true;
                    break;
                }
            }
        }

        info!(
            done = summary.count(EpisodeStatus::Done),
            partial = summary.count(EpisodeStatus::Partial),
            failed = summary.count(EpisodeStatus::Failed),
            skipped = summary.skipped.len(),
            cancelled = summary.cancelled,
            "Batch finished"
        );
        Ok(summary)
    }
}

/// Resolves once the flag is set. A dropped sender never cancels.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use limp_agents::register_builtin;
    use limp_core::{ConfigResolver, EnvSnapshot, Overrides, RegistryBuilder};

    fn runner(disable: &[&str]) -> EpisodeRunner {
        let mut b = RegistryBuilder::new();
        register_builtin(&mut b).unwrap();
        let reg = b.build();
        let env = EnvSnapshot::default();
        let overrides = Overrides {
            disable: disable.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        let config = ConfigResolver::new(&reg, &env).resolve(&overrides).unwrap();
        EpisodeRunner::build(&reg, &config, &AgentContext::new(), "test").unwrap()
    }

    const MODEL_AGENTS: [&str; 7] = [
        "phase_segmenter",
        "action_detector",
        "board_parser",
        "cue_analyzer",
        "audio_ground_truth",
        "tom_belief",
        "tom_social",
    ];

    #[tokio::test]
    async fn missing_frames_fail_the_episode_and_still_write_result() {
        let dir = tempfile::tempdir().unwrap();
        let layout = EpisodeLayout::new(dir.path(), "hand_1");
        std::fs::create_dir_all(&layout.dir).unwrap();

        let result = runner(&MODEL_AGENTS).run_episode(&layout, StageSkips::default()).await;
        assert_eq!(result.status, EpisodeStatus::Failed);
        assert!(result.error.as_deref().unwrap_or_default().contains("no frames"));
        let on_disk: RunResult = read_json(&layout.run_result()).unwrap();
        assert_eq!(on_disk.run_id, result.run_id);
    }

    #[tokio::test]
    async fn existing_results_are_skipped_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        for id in ["hand_a", "hand_b"] {
            std::fs::create_dir_all(dir.path().join(id).join("frames")).unwrap();
        }
        let done = RunResult::new("hand_a", "test");
        write_json_atomic(&dir.path().join("hand_a").join("run_result.json"), &done).unwrap();

        let runner = runner(&MODEL_AGENTS);
        let (_tx, rx) = watch::channel(false);
        let source = BatchSource::Episodes(dir.path().to_path_buf());
        let summary = runner
            .run_batch(&source, StageSkips::default(), false, rx.clone())
            .await
            .unwrap();
        assert_eq!(summary.skipped, vec!["hand_a"]);
        assert_eq!(summary.episodes.len(), 1);

        let forced = runner
            .run_batch(&source, StageSkips::default(), true, rx)
            .await
            .unwrap();
        assert!(forced.skipped.is_empty());
        assert_eq!(forced.episodes.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_batch_stops_before_next_episode() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("hand_a").join("frames")).unwrap();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let summary = runner(&MODEL_AGENTS)
            .run_batch(
                &BatchSource::Episodes(dir.path().to_path_buf()),
                StageSkips::default(),
                false,
                rx,
            )
            .await
            .unwrap();
        assert!(summary.cancelled);
        assert!(summary.episodes.is_empty());
        assert!(!dir.path().join("hand_a").join("run_result.json").exists());
    }
}
