//! Error taxonomy for LIMP runs.
//!
//! Only [`ConfigurationError`] and [`RegistryError`] are fatal. Agent and
//! data-integrity errors are recovered where they occur and surface as
//! flags on the persisted records.

use crate::domain::reasoning::ReasoningState;

/// Invalid run configuration. Raised before any episode is processed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("unknown agent: {name}")]
    UnknownAgent { name: String },

    #[error("agent {name} is configured but not registered")]
    UnregisteredAgent { name: String },

    #[error("agent {name} could not be built: {reason}")]
    AgentBuild { name: String, reason: String },

    #[error("invalid protocol mode: {0} (expected `audience` or `player`)")]
    InvalidProtocolMode(String),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("unknown ablation preset: {0}")]
    UnknownPreset(String),
}

/// Errors produced while registering or instantiating agents.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("{namespace} agent {name} is already registered with a different constructor")]
    DuplicateRegistration { namespace: String, name: String },

    #[error("no {namespace} agent registered under {name}")]
    UnknownAgent { namespace: String, name: String },

    #[error("failed to build agent {name}: {reason}")]
    Build { name: String, reason: String },
}

impl From<RegistryError> for ConfigurationError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownAgent { name, .. } => ConfigurationError::UnregisteredAgent { name },
            RegistryError::Build { name, reason } => ConfigurationError::AgentBuild { name, reason },
            RegistryError::DuplicateRegistration { name, .. } => ConfigurationError::AgentBuild {
                reason: "duplicate registration".to_string(),
                name,
            },
        }
    }
}

/// Failure of a single agent invocation (one unit of work).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    #[error("external call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("model call failed: {0}")]
    Model(String),

    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    #[error("agent {agent} cannot handle request {request}")]
    UnsupportedRequest { agent: String, request: String },

    #[error("missing input: {0}")]
    MissingInput(String),
}

/// Record contents violate an invariant or lack required fields.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataIntegrityError {
    #[error("ground truth field `{field}` unavailable for {subject}")]
    MissingGroundTruth { field: String, subject: String },

    #[error("action at {timestamp} lies outside segment [{start}, {end})")]
    ActionOutsideSegment { timestamp: f64, start: f64, end: f64 },

    #[error("segment {index} overlaps or precedes the previous segment")]
    SegmentOrder { index: usize },

    #[error("segment {index} has an empty interval [{start}, {end})")]
    EmptySegment { index: usize, start: f64, end: f64 },

    #[error("action {index} precedes the action recorded before it")]
    ActionOrder { index: usize },
}

/// LIMP domain errors.
#[derive(Debug, thiserror::Error)]
pub enum LimpError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("data integrity error: {0}")]
    DataIntegrity(#[from] DataIntegrityError),

    #[error("invalid reasoning transition: {from} -> {to}")]
    InvalidTransition {
        from: ReasoningState,
        to: ReasoningState,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LimpError {
    /// Whether this error should halt a whole batch rather than one episode.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LimpError::Configuration(_) | LimpError::Registry(_))
    }
}

/// Result type for LIMP domain operations.
pub type Result<T> = std::result::Result<T, LimpError>;
