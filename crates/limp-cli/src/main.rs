//! LIMP benchmark CLI
//!
//! The `limp` command drives the multimodal theory-of-mind poker benchmark.
//!
//! ## Commands
//!
//! - `run`: process one recorded hand end to end
//! - `batch`: process every episode or video under a directory
//! - `ablation`: re-answer stored questions under agent toggle presets
//! - `config`: print the resolved configuration
//! - `agents`: list registered agents

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use limp_agents::{models::context_from_settings, register_builtin};
use limp_core::{
    AgentContext, AgentRegistry, ConfigResolver, EnvSnapshot, EpisodeStatus, Namespace, Overrides,
    RegistryBuilder, ResolvedConfig, RunResult,
};
use limp_pipeline::{parse_presets, AblationRunner, BatchSource, EpisodeRunner, StageSkips};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "limp")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "LIMP multimodal theory-of-mind poker benchmark", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Protocol mode: audience or player
    #[arg(long, global = true)]
    protocol: Option<String>,

    /// Seat whose own cards stay visible in player mode
    #[arg(long, global = true)]
    hero: Option<String>,

    /// Enable an agent by name (repeatable)
    #[arg(long, global = true, value_name = "AGENT")]
    enable: Vec<String>,

    /// Disable an agent by name (repeatable)
    #[arg(long, global = true, value_name = "AGENT")]
    disable: Vec<String>,

    /// Agent parameter as agent.key=value (repeatable)
    #[arg(long = "param", global = true, value_name = "AGENT.KEY=VALUE")]
    params: Vec<String>,

    /// Frame extraction rate
    #[arg(long, global = true)]
    fps: Option<f64>,

    /// Question levels to generate, e.g. action,phase
    #[arg(long, global = true)]
    qa_levels: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process one video through every stage
    Run {
        /// Recorded hand
        #[arg(long)]
        video: PathBuf,

        /// Output root; the episode lands in <output>/<video stem>/
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        #[command(flatten)]
        skips: SkipArgs,
    },

    /// Process every episode directory or video under a root
    #[command(group(ArgGroup::new("source").required(true).args(["episodes", "videos"])))]
    Batch {
        /// Root of already-preprocessed episode directories
        #[arg(long)]
        episodes: Option<PathBuf>,

        /// Directory of videos to preprocess
        #[arg(long)]
        videos: Option<PathBuf>,

        /// Output root for --videos
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Re-run episodes that already have a run result
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        skips: SkipArgs,
    },

    /// Compare reasoning-agent presets on processed episodes
    Ablation {
        /// Root of processed episode directories
        #[arg(long)]
        episodes: PathBuf,

        /// Comma-separated preset names (default: all)
        #[arg(long)]
        configs: Option<String>,

        /// Where to write the comparison table
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Print the resolved configuration
    Config,

    /// List registered agents
    Agents,
}

#[derive(clap::Args, Debug, Clone, Copy, Default)]
struct SkipArgs {
    /// Reuse extracted frames and audio
    #[arg(long)]
    skip_preprocess: bool,

    /// Reuse perception_output.json
    #[arg(long)]
    skip_perception: bool,

    /// Reuse ground_truth.json
    #[arg(long)]
    skip_annotation: bool,

    /// Reuse qa_dataset.json
    #[arg(long)]
    skip_qa: bool,

    /// Do not answer questions
    #[arg(long)]
    skip_reasoning: bool,
}

impl From<SkipArgs> for StageSkips {
    fn from(s: SkipArgs) -> Self {
        StageSkips {
            preprocess: s.skip_preprocess,
            perception: s.skip_perception,
            annotation: s.skip_annotation,
            qa: s.skip_qa,
            reasoning: s.skip_reasoning,
        }
    }
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            protocol: self.protocol.clone(),
            hero: self.hero.clone(),
            enable: self.enable.clone(),
            disable: self.disable.clone(),
            params: self.params.clone(),
            fps: self.fps,
            qa_levels: self.qa_levels.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    limp_core::init_tracing(cli.json, level);

    let registry = builtin_registry()?;
    let env = EnvSnapshot::from_process();
    let config = ConfigResolver::new(&registry, &env)
        .resolve(&cli.overrides())
        .context("Invalid configuration")?;

    match cli.command {
        Commands::Run {
            video,
            output,
            skips,
        } => cmd_run(&registry, &config, &video, &output, skips.into()).await,
        Commands::Batch {
            episodes,
            videos,
            output,
            force,
            skips,
        } => {
            let source = batch_source(episodes, videos, output)?;
            cmd_batch(&registry, &config, &source, skips.into(), force).await
        }
        Commands::Ablation {
            episodes,
            configs,
            report,
        } => cmd_ablation(&registry, &config, &episodes, configs.as_deref(), report.as_deref()).await,
        Commands::Config => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", config.summary());
            }
            Ok(())
        }
        Commands::Agents => {
            print!("{}", render_agents(&registry, &config));
            Ok(())
        }
    }
}

fn builtin_registry() -> Result<AgentRegistry> {
    let mut builder = RegistryBuilder::new();
    register_builtin(&mut builder).context("register built-in agents")?;
    Ok(builder.build())
}

/// Model handles from the configured endpoint. Without credentials the
/// context is empty and only model-free agents can be built.
fn agent_context(config: &ResolvedConfig) -> AgentContext {
    match context_from_settings(&config.models, config.call_timeout()) {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!(error = %e, "No model client; agents that need a model cannot be built");
            AgentContext::new()
        }
    }
}

fn batch_source(episodes: Option<PathBuf>, videos: Option<PathBuf>, output: PathBuf) -> Result<BatchSource> {
    match (episodes, videos) {
        (Some(root), None) => Ok(BatchSource::Episodes(root)),
        (None, Some(videos)) => Ok(BatchSource::Videos {
            videos,
            output_root: output,
        }),
        _ => bail!("pass exactly one of --episodes or --videos"),
    }
}

fn print_result(result: &RunResult) {
    println!("episode {} [{}]", result.episode_id, result.status);
    println!("run id: {}", result.run_id);
    if let Some(report) = &result.evaluation {
        println!(
            "questions: {}  accuracy: {:.1}%  abstained: {}  failed: {}",
            report.overall.total,
            report.accuracy() * 100.0,
            report.abstained,
            report.failed
        );
    }
    if !result.failures.is_empty() {
        println!("agent failures: {}", result.failures.len());
        for f in &result.failures {
            println!("  {} {}: {}", f.capability, f.unit, f.error);
        }
    }
    if let Some(error) = &result.error {
        println!("error: {error}");
    }
}

async fn cmd_run(
    registry: &AgentRegistry,
    config: &ResolvedConfig,
    video: &Path,
    output: &Path,
    skips: StageSkips,
) -> Result<()> {
    let ctx = agent_context(config);
    let runner = EpisodeRunner::build(registry, config, &ctx, "default")?;
    let result = runner.run(video, output, skips).await;
    print_result(&result);
    if result.status == EpisodeStatus::Failed {
        bail!(
            "episode {} failed: {}",
            result.episode_id,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn cmd_batch(
    registry: &AgentRegistry,
    config: &ResolvedConfig,
    source: &BatchSource,
    skips: StageSkips,
    force: bool,
) -> Result<()> {
    let ctx = agent_context(config);
    let runner = EpisodeRunner::build(registry, config, &ctx, "default")?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current stage");
            let _ = cancel_tx.send(true);
        }
    });

    let summary = runner.run_batch(source, skips, force, cancel_rx).await?;
    for (episode, status) in &summary.episodes {
        println!("{episode}: {status}");
    }
    for episode in &summary.skipped {
        println!("{episode}: skipped (run result exists)");
    }
    println!(
        "done: {}  partial: {}  failed: {}  skipped: {}",
        summary.count(EpisodeStatus::Done),
        summary.count(EpisodeStatus::Partial),
        summary.count(EpisodeStatus::Failed),
        summary.skipped.len()
    );
    if summary.cancelled {
        bail!("batch cancelled");
    }
    Ok(())
}

async fn cmd_ablation(
    registry: &AgentRegistry,
    config: &ResolvedConfig,
    episodes: &Path,
    configs: Option<&str>,
    report: Option<&Path>,
) -> Result<()> {
    let presets = parse_presets(configs)?;
    let ctx = agent_context(config);
    let outcome = AblationRunner::new(registry, config, &ctx)
        .run(episodes, &presets, report)
        .await?;
    for r in &outcome.reports {
        println!(
            "{:<14} accuracy {:>5.1}%  abstained {:>3}  failed {:>3}",
            r.config_name,
            r.accuracy() * 100.0,
            r.abstained,
            r.failed
        );
    }
    info!(path = %outcome.comparison.display(), "Wrote ablation comparison");
    println!("comparison: {}", outcome.comparison.display());
    Ok(())
}

fn render_agents(registry: &AgentRegistry, config: &ResolvedConfig) -> String {
    let mut out = String::new();
    for ns in Namespace::ALL {
        out.push_str(&format!("{}:\n", ns.as_str()));
        for name in registry.list(ns) {
            let state = if config.is_enabled(&name) { "on " } else { "off" };
            out.push_str(&format!("  [{state}] {name}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "limp",
            "--protocol",
            "player",
            "--hero",
            "Alice",
            "--disable",
            "equity",
            "--disable",
            "cue_analyzer",
            "--param",
            "posture.weight=0.5",
            "config",
        ])
        .unwrap();
        let o = cli.overrides();
        assert_eq!(o.protocol.as_deref(), Some("player"));
        assert_eq!(o.hero.as_deref(), Some("Alice"));
        assert_eq!(o.disable, vec!["equity", "cue_analyzer"]);
        assert_eq!(o.params, vec!["posture.weight=0.5"]);
        assert!(matches!(cli.command, Commands::Config));
    }

    #[test]
    fn run_skip_flags_map_to_stage_skips() {
        let cli = Cli::try_parse_from([
            "limp",
            "run",
            "--video",
            "hand.mp4",
            "--skip-preprocess",
            "--skip-qa",
        ])
        .unwrap();
        let Commands::Run { video, skips, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(video, PathBuf::from("hand.mp4"));
        let skips = StageSkips::from(skips);
        assert!(skips.preprocess && skips.qa);
        assert!(!skips.perception && !skips.annotation && !skips.reasoning);
    }

    #[test]
    fn batch_needs_exactly_one_source() {
        assert!(Cli::try_parse_from(["limp", "batch"]).is_err());
        assert!(Cli::try_parse_from(["limp", "batch", "--episodes", "a", "--videos", "b"]).is_err());
        let cli = Cli::try_parse_from(["limp", "batch", "--videos", "vids", "--force"]).unwrap();
        let Commands::Batch {
            episodes,
            videos,
            output,
            force,
            ..
        } = cli.command
        else {
            panic!("expected batch");
        };
        assert!(force);
        assert_eq!(
            batch_source(episodes, videos, output).unwrap(),
            BatchSource::Videos {
                videos: PathBuf::from("vids"),
                output_root: PathBuf::from("output"),
            }
        );
    }

    #[test]
    fn agents_listing_shows_default_toggles() {
        let registry = builtin_registry().unwrap();
        let env = EnvSnapshot::default();
        let config = ConfigResolver::new(&registry, &env)
            .resolve(&Overrides::default())
            .unwrap();
        let listing = render_agents(&registry, &config);
        assert!(listing.starts_with("perception:\n"));
        assert!(listing.contains("  [off] equity\n"));
        assert!(listing.contains("  [on ] tom_social\n"));
        assert!(listing.contains("  [on ] hidden_cards\n"));
    }

    #[tokio::test]
    async fn ablation_without_processed_episodes_fails() {
        let dir = tempfile::tempdir().unwrap();
        let registry = builtin_registry().unwrap();
        let env = EnvSnapshot::default();
        let config = ConfigResolver::new(&registry, &env)
            .resolve(&Overrides::default())
            .unwrap();
        let err = cmd_ablation(&registry, &config, dir.path(), Some("baseline_only,posture_only"), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no episodes"));
    }
}
