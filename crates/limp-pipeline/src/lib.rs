//! LIMP pipelines.
//!
//! Re-exports the episode runner and the stage pipelines it drives.

pub mod ablation;
pub mod annotation;
pub mod evaluation;
pub mod perception;
pub mod preprocess;
pub mod qa;
pub mod reasoning;
pub mod reporting;
pub mod runner;
pub mod stage;
pub mod store;

pub use ablation::{find_preset, parse_presets, AblationOutcome, AblationRunner, Preset, PRESETS};
pub use annotation::AnnotationPipeline;
pub use evaluation::evaluate;
pub use perception::PerceptionPipeline;
pub use preprocess::Preprocessor;
pub use qa::{QaGenerator, QaRules};
pub use reasoning::{required_agent, ReasoningPipeline};
pub use reporting::{render_ablation_md, render_evaluation_md};
pub use runner::{BatchSource, BatchSummary, EpisodeRunner, StageSkips};
pub use stage::CallLimits;
pub use store::EpisodeLayout;
