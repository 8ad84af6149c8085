//! Configuration resolver.
//!
//! Layers, lowest to highest precedence: built-in defaults, an
//! [`EnvSnapshot`] captured once at startup, then CLI [`Overrides`]. The
//! result is an immutable [`ResolvedConfig`] passed by reference into every
//! pipeline. No component reads the process environment itself.

use crate::agent::AgentParams;
use crate::domain::episode::ProtocolMode;
use crate::domain::error::ConfigurationError;
use crate::domain::question::QuestionLevel;
use crate::registry::AgentRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

const ENV_PREFIXES: [&str; 4] = ["LIMP_", "LLM_", "VLM_", "ASR_"];
const AGENT_ENV_PREFIX: &str = "LIMP_AGENT_";

/// Environment variables relevant to LIMP, read once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    pub fn from_process() -> Self {
        Self::from_pairs(std::env::vars())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| ENV_PREFIXES.iter().any(|p| k.starts_with(p)))
            .collect();
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// `LIMP_AGENT_<NAME>` toggles, with names lowercased.
    fn agent_toggles(&self) -> impl Iterator<Item = (String, &str)> {
        self.vars.iter().filter_map(|(k, v)| {
            k.strip_prefix(AGENT_ENV_PREFIX)
                .map(|name| (name.to_ascii_lowercase(), v.as_str()))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub enabled: bool,
    #[serde(default)]
    pub params: AgentParams,
}

impl AgentConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            params: AgentParams::new(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            params: AgentParams::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub llm_model: String,
    pub vlm_model: String,
    pub asr_model: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            llm_model: "gpt-4o".to_string(),
            vlm_model: "gpt-4o".to_string(),
            asr_model: "whisper-large-v3".to_string(),
        }
    }
}

/// The single immutable configuration for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConfig {
    pub protocol: ProtocolMode,
    /// Seat whose own cards stay visible in player mode.
    #[serde(default)]
    pub hero: Option<String>,
    pub agents: BTreeMap<String, AgentConfig>,
    pub fps: f64,
    pub sampling_interval: usize,
    pub min_consecutive_frames: usize,
    pub qa_levels: BTreeSet<QuestionLevel>,
    pub bluff_amount_threshold: f64,
    pub call_timeout_secs: u64,
    pub max_concurrency: usize,
    pub models: ModelSettings,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolMode::Audience,
            hero: None,
            agents: BTreeMap::new(),
            fps: 1.0,
            sampling_interval: 1,
            min_consecutive_frames: 3,
            qa_levels: BTreeSet::from([QuestionLevel::Action, QuestionLevel::Phase]),
            bluff_amount_threshold: 10_000.0,
            call_timeout_secs: 60,
            max_concurrency: 4,
            models: ModelSettings::default(),
        }
    }
}

impl ResolvedConfig {
    pub fn is_enabled(&self, name: &str) -> bool {
        self.agents.get(name).map(|a| a.enabled).unwrap_or(false)
    }

    pub fn is_configured(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn params(&self, name: &str) -> AgentParams {
        self.agents
            .get(name)
            .map(|a| a.params.clone())
            .unwrap_or_default()
    }

    pub fn enabled_agents(&self) -> Vec<String> {
        self.agents
            .iter()
            .filter(|(_, a)| a.enabled)
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }

    /// Derive a variant with agents switched on or off, e.g. for ablation.
    pub fn with_toggles(
        &self,
        toggles: &[(&str, bool)],
        registry: &AgentRegistry,
    ) -> Result<ResolvedConfig, ConfigurationError> {
        let mut next = self.clone();
        for (name, enabled) in toggles {
            if !registry.is_registered(name) {
                return Err(ConfigurationError::UnknownAgent {
                    name: name.to_string(),
                });
            }
            next.agents
                .entry(name.to_string())
                .or_insert_with(AgentConfig::enabled)
                .enabled = *enabled;
        }
        Ok(next)
    }

    /// Human-readable dump for `limp config`.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("protocol: {}\n", self.protocol));
        if let Some(hero) = &self.hero {
            out.push_str(&format!("hero: {hero}\n"));
        }
        out.push_str(&format!(
            "fps: {}  sampling_interval: {}  min_consecutive_frames: {}\n",
            self.fps, self.sampling_interval, self.min_consecutive_frames
        ));
        let levels: Vec<&str> = self.qa_levels.iter().map(|l| l.as_str()).collect();
        out.push_str(&format!("qa_levels: {}\n", levels.join(",")));
        out.push_str(&format!(
            "call_timeout: {}s  max_concurrency: {}\n",
            self.call_timeout_secs, self.max_concurrency
        ));
        out.push_str(&format!(
            "models: llm={} vlm={} asr={} base_url={} api_key={}\n",
            self.models.llm_model,
            self.models.vlm_model,
            self.models.asr_model,
            self.models.base_url,
            if self.models.api_key.is_some() { "set" } else { "unset" },
        ));
        out.push_str("agents:\n");
        for (name, agent) in &self.agents {
            let state = if agent.enabled { "on " } else { "off" };
            if agent.params.is_empty() {
                out.push_str(&format!("  [{state}] {name}\n"));
            } else {
                out.push_str(&format!(
                    "  [{state}] {name} {}\n",
                    Value::Object(agent.params.clone())
                ));
            }
        }
        out
    }
}

/// CLI-level overrides. Highest precedence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub protocol: Option<String>,
    pub hero: Option<String>,
    pub enable: Vec<String>,
    pub disable: Vec<String>,
    /// `agent.key=value`; the value is parsed as JSON, else kept as a string.
    pub params: Vec<String>,
    pub fps: Option<f64>,
    pub qa_levels: Option<String>,
}

/// Split `agent.key=value` into its parts.
pub fn parse_param(raw: &str) -> Result<(String, String, Value), ConfigurationError> {
    let invalid = || ConfigurationError::InvalidValue {
        key: "--param".to_string(),
        value: raw.to_string(),
    };
    let (path, value) = raw.split_once('=').ok_or_else(invalid)?;
    let (agent, key) = path.split_once('.').ok_or_else(invalid)?;
    if agent.is_empty() || key.is_empty() {
        return Err(invalid());
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((agent.to_string(), key.to_string(), value))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigurationError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigurationError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigurationError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigurationError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        })
}

fn positive_fps(key: &str, fps: f64) -> Result<f64, ConfigurationError> {
    if fps.is_finite() && fps > 0.0 {
        Ok(fps)
    } else {
        Err(ConfigurationError::InvalidValue {
            key: key.to_string(),
            value: fps.to_string(),
        })
    }
}

fn parse_levels(key: &str, raw: &str) -> Result<BTreeSet<QuestionLevel>, ConfigurationError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            QuestionLevel::parse(s).ok_or_else(|| ConfigurationError::InvalidValue {
                key: key.to_string(),
                value: raw.to_string(),
            })
        })
        .collect()
}

/// Built-in agent defaults. Equity estimation is opt-in.
pub fn default_agent_configs() -> BTreeMap<String, AgentConfig> {
    BTreeMap::from([("equity".to_string(), AgentConfig::disabled())])
}

pub struct ConfigResolver<'a> {
    registry: &'a AgentRegistry,
    env: &'a EnvSnapshot,
    defaults: BTreeMap<String, AgentConfig>,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(registry: &'a AgentRegistry, env: &'a EnvSnapshot) -> Self {
        Self {
            registry,
            env,
            defaults: default_agent_configs(),
        }
    }

    pub fn with_defaults(mut self, defaults: BTreeMap<String, AgentConfig>) -> Self {
        self.defaults = defaults;
        self
    }

    fn require_known(&self, name: &str) -> Result<(), ConfigurationError> {
        if self.registry.is_registered(name) {
            Ok(())
        } else {
            Err(ConfigurationError::UnknownAgent {
                name: name.to_string(),
            })
        }
    }

    pub fn resolve(&self, overrides: &Overrides) -> Result<ResolvedConfig, ConfigurationError> {
        let mut config = ResolvedConfig::default();

        // Every registered capability starts enabled with empty params.
        for name in self.registry.all_names() {
            config.agents.insert(name, AgentConfig::enabled());
        }
        for (name, agent) in &self.defaults {
            if self.registry.is_registered(name) {
                config.agents.insert(name.clone(), agent.clone());
            }
        }

        self.apply_env(&mut config)?;
        self.apply_overrides(&mut config, overrides)?;
        Ok(config)
    }

    fn apply_env(&self, config: &mut ResolvedConfig) -> Result<(), ConfigurationError> {
        let env = self.env;
        if let Some(raw) = env.get("LIMP_PROTOCOL_MODE") {
            config.protocol = raw.parse()?;
        }
        if let Some(hero) = env.get("LIMP_HERO") {
            config.hero = Some(hero.to_string());
        }
        if let Some(raw) = env.get("LIMP_FPS") {
            config.fps = positive_fps("LIMP_FPS", parse_number("LIMP_FPS", raw)?)?;
        }
        if let Some(raw) = env.get("LIMP_SAMPLING_INTERVAL") {
            config.sampling_interval = parse_number("LIMP_SAMPLING_INTERVAL", raw)?;
        }
        if let Some(raw) = env.get("LIMP_MIN_CONSECUTIVE_FRAMES") {
            config.min_consecutive_frames = parse_number("LIMP_MIN_CONSECUTIVE_FRAMES", raw)?;
        }
        if let Some(raw) = env.get("LIMP_QA_LEVELS") {
            config.qa_levels = parse_levels("LIMP_QA_LEVELS", raw)?;
        }
        if let Some(raw) = env.get("LIMP_BLUFF_AMOUNT_THRESHOLD") {
            config.bluff_amount_threshold = parse_number("LIMP_BLUFF_AMOUNT_THRESHOLD", raw)?;
        }
        if let Some(raw) = env.get("LIMP_CALL_TIMEOUT_SECS") {
            config.call_timeout_secs = parse_number("LIMP_CALL_TIMEOUT_SECS", raw)?;
        }
        if let Some(raw) = env.get("LIMP_MAX_CONCURRENCY") {
            config.max_concurrency = parse_number("LIMP_MAX_CONCURRENCY", raw)?;
        }

        let models = &mut config.models;
        models.api_key = env.get("LLM_API_KEY").map(str::to_string);
        if let Some(v) = env.get("LLM_BASE_URL") {
            models.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = env.get("LLM_MODEL_NAME") {
            models.llm_model = v.to_string();
        }
        if let Some(v) = env.get("VLM_MODEL_NAME") {
            models.vlm_model = v.to_string();
        }
        if let Some(v) = env.get("ASR_MODEL_NAME") {
            models.asr_model = v.to_string();
        }

        for (name, raw) in env.agent_toggles() {
            self.require_known(&name)?;
            let enabled = parse_bool(&format!("{AGENT_ENV_PREFIX}{}", name.to_uppercase()), raw)?;
            config
                .agents
                .entry(name)
                .or_insert_with(AgentConfig::enabled)
                .enabled = enabled;
        }
        Ok(())
    }

    fn apply_overrides(
        &self,
        config: &mut ResolvedConfig,
        overrides: &Overrides,
    ) -> Result<(), ConfigurationError> {
        if let Some(raw) = &overrides.protocol {
            config.protocol = raw.parse()?;
        }
        if let Some(hero) = &overrides.hero {
            config.hero = Some(hero.clone());
        }
        if let Some(fps) = overrides.fps {
            config.fps = positive_fps("--fps", fps)?;
        }
        if let Some(raw) = &overrides.qa_levels {
            config.qa_levels = parse_levels("--qa-levels", raw)?;
        }
        for name in &overrides.enable {
            self.require_known(name)?;
            config
                .agents
                .entry(name.clone())
                .or_insert_with(AgentConfig::enabled)
                .enabled = true;
        }
        for name in &overrides.disable {
            self.require_known(name)?;
            config
                .agents
                .entry(name.clone())
                .or_insert_with(AgentConfig::enabled)
                .enabled = false;
        }
        for raw in &overrides.params {
            let (agent, key, value) = parse_param(raw)?;
            self.require_known(&agent)?;
            config
                .agents
                .entry(agent)
                .or_insert_with(AgentConfig::enabled)
                .params
                .insert(key, value);
        }
        Ok(())
    }
}
