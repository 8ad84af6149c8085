//! LIMP core: schema, agent interfaces, registry and configuration.
//!
//! - [`domain`]: records exchanged between stages
//! - [`agent`]: one trait per registry namespace
//! - [`registry`]: startup-time capability table
//! - [`config`]: layered, immutable run configuration
//! - [`models`]: seams to external vision / language / speech models

pub mod agent;
pub mod config;
pub mod domain;
pub mod fakes;
pub mod models;
pub mod obs;
pub mod registry;
pub mod telemetry;

pub use agent::{
    AgentContext, AgentParams, AnnotationAgent, AnnotationReport, AnnotationRequest,
    NarrationFacts, NarrationReport, PerceptionAgent, PerceptionReport, PerceptionRequest,
    PhaseReading, ReasoningAgent,
};
pub use config::{
    AgentConfig, ConfigResolver, EnvSnapshot, ModelSettings, Overrides, ResolvedConfig,
};
pub use domain::*;
pub use models::{LanguageModel, SpeechModel, Transcript, TranscriptSegment, VisionModel};
pub use registry::{AgentRegistry, Constructor, Namespace, RegistryBuilder};
pub use telemetry::init_tracing;
