//! Schema layer: every record exchanged between stages.

pub mod episode;
pub mod error;
pub mod evaluation;
pub mod ground_truth;
pub mod perception;
pub mod question;
pub mod reasoning;
pub mod run_result;
pub mod timeline;

pub use episode::{Episode, FrameRef, FrameSequence, PrivilegedMetadata, ProtocolMode};
pub use error::{
    AgentError, ConfigurationError, DataIntegrityError, LimpError, RegistryError, Result,
};
pub use evaluation::{AgentContribution, EvaluationReport, Tally};
pub use ground_truth::{
    Availability, GroundTruth, HandStrength, IntentLabels, NarratedEvent, PlayerFacts,
};
pub use perception::{AgentFailure, PerceptionMeta, PerceptionOutput};
pub use question::{
    AnswerSource, Question, QuestionContext, QuestionLevel, QuestionOption, QuestionPrompt,
    QuestionSet, QuestionType, ScoringContext, SkippedQuestion, TomLabel,
};
pub use reasoning::{AgentOpinion, Answer, ReasoningRun, ReasoningState};
pub use run_result::{EpisodeStatus, RunResult};
pub use timeline::{
    ActionEvent, ActionType, BehavioralCues, BehavioralSummary, GameState, GameStateTimeline,
    PhaseSegment, PhaseType, PlayerState,
};
