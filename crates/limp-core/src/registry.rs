//! Agent registry.
//!
//! Capabilities are registered explicitly on a [`RegistryBuilder`] during
//! startup and frozen into an immutable [`AgentRegistry`] before any pipeline
//! is built. Each namespace holds a name at most once:
//!
//! - registering the same name with the same constructor is a no-op;
//! - registering it with a different constructor fails with
//!   [`RegistryError::DuplicateRegistration`] and keeps the first entry.

use crate::agent::{AgentContext, AgentParams, AnnotationAgent, PerceptionAgent, ReasoningAgent};
use crate::domain::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Perception,
    Annotation,
    Reasoning,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [
        Namespace::Perception,
        Namespace::Annotation,
        Namespace::Reasoning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Perception => "perception",
            Namespace::Annotation => "annotation",
            Namespace::Reasoning => "reasoning",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type PerceptionCtor =
    fn(&AgentContext, &AgentParams) -> Result<Box<dyn PerceptionAgent>, RegistryError>;
pub type AnnotationCtor =
    fn(&AgentContext, &AgentParams) -> Result<Box<dyn AnnotationAgent>, RegistryError>;
pub type ReasoningCtor =
    fn(&AgentContext, &AgentParams) -> Result<Box<dyn ReasoningAgent>, RegistryError>;

/// A constructor tagged with the namespace it belongs to.
#[derive(Clone, Copy)]
pub enum Constructor {
    Perception(PerceptionCtor),
    Annotation(AnnotationCtor),
    Reasoning(ReasoningCtor),
}

impl Constructor {
    pub fn namespace(&self) -> Namespace {
        match self {
            Constructor::Perception(_) => Namespace::Perception,
            Constructor::Annotation(_) => Namespace::Annotation,
            Constructor::Reasoning(_) => Namespace::Reasoning,
        }
    }

    fn address(&self) -> usize {
        match self {
            Constructor::Perception(f) => *f as usize,
            Constructor::Annotation(f) => *f as usize,
            Constructor::Reasoning(f) => *f as usize,
        }
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Constructor({}@{:#x})", self.namespace(), self.address())
    }
}

/// Per-namespace constructor tables.
#[derive(Debug, Default, Clone)]
struct Tables {
    perception: BTreeMap<String, PerceptionCtor>,
    annotation: BTreeMap<String, AnnotationCtor>,
    reasoning: BTreeMap<String, ReasoningCtor>,
}

impl Tables {
    fn names(&self, namespace: Namespace) -> BTreeSet<String> {
        match namespace {
            Namespace::Perception => self.perception.keys().cloned().collect(),
            Namespace::Annotation => self.annotation.keys().cloned().collect(),
            Namespace::Reasoning => self.reasoning.keys().cloned().collect(),
        }
    }

    fn get(&self, namespace: Namespace, name: &str) -> Option<Constructor> {
        match namespace {
            Namespace::Perception => self.perception.get(name).map(|c| Constructor::Perception(*c)),
            Namespace::Annotation => self.annotation.get(name).map(|c| Constructor::Annotation(*c)),
            Namespace::Reasoning => self.reasoning.get(name).map(|c| Constructor::Reasoning(*c)),
        }
    }
}

/// Mutable registration phase.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    tables: Tables,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `ctor` under `name` in the constructor's namespace.
    pub fn register(&mut self, name: &str, ctor: Constructor) -> Result<&mut Self, RegistryError> {
        let namespace = ctor.namespace();
        if let Some(existing) = self.tables.get(namespace, name) {
            if existing.address() == ctor.address() {
                return Ok(self);
            }
            return Err(RegistryError::DuplicateRegistration {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        let name = name.to_string();
        match ctor {
            Constructor::Perception(c) => {
                self.tables.perception.insert(name, c);
            }
            Constructor::Annotation(c) => {
                self.tables.annotation.insert(name, c);
            }
            Constructor::Reasoning(c) => {
                self.tables.reasoning.insert(name, c);
            }
        }
        Ok(self)
    }

    pub fn register_perception(
        &mut self,
        name: &str,
        ctor: PerceptionCtor,
    ) -> Result<&mut Self, RegistryError> {
        self.register(name, Constructor::Perception(ctor))
    }

    pub fn register_annotation(
        &mut self,
        name: &str,
        ctor: AnnotationCtor,
    ) -> Result<&mut Self, RegistryError> {
        self.register(name, Constructor::Annotation(ctor))
    }

    pub fn register_reasoning(
        &mut self,
        name: &str,
        ctor: ReasoningCtor,
    ) -> Result<&mut Self, RegistryError> {
        self.register(name, Constructor::Reasoning(ctor))
    }

    /// Freeze the table.
    pub fn build(self) -> AgentRegistry {
        AgentRegistry {
            tables: self.tables,
        }
    }
}

/// Immutable capability table, shared read-only after startup.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    tables: Tables,
}

impl AgentRegistry {
    pub fn list(&self, namespace: Namespace) -> BTreeSet<String> {
        self.tables.names(namespace)
    }

    /// Every registered name across all namespaces.
    pub fn all_names(&self) -> BTreeSet<String> {
        Namespace::ALL
            .iter()
            .flat_map(|ns| self.tables.names(*ns))
            .collect()
    }

    pub fn contains(&self, namespace: Namespace, name: &str) -> bool {
        self.tables.get(namespace, name).is_some()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        Namespace::ALL.iter().any(|ns| self.contains(*ns, name))
    }

    fn unknown(namespace: Namespace, name: &str) -> RegistryError {
        RegistryError::UnknownAgent {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn build_perception(
        &self,
        name: &str,
        ctx: &AgentContext,
        params: &AgentParams,
    ) -> Result<Box<dyn PerceptionAgent>, RegistryError> {
        let ctor = self
            .tables
            .perception
            .get(name)
            .ok_or_else(|| Self::unknown(Namespace::Perception, name))?;
        ctor(ctx, params)
    }

    pub fn build_annotation(
        &self,
        name: &str,
        ctx: &AgentContext,
        params: &AgentParams,
    ) -> Result<Box<dyn AnnotationAgent>, RegistryError> {
        let ctor = self
            .tables
            .annotation
            .get(name)
            .ok_or_else(|| Self::unknown(Namespace::Annotation, name))?;
        ctor(ctx, params)
    }

    pub fn build_reasoning(
        &self,
        name: &str,
        ctx: &AgentContext,
        params: &AgentParams,
    ) -> Result<Box<dyn ReasoningAgent>, RegistryError> {
        let ctor = self
            .tables
            .reasoning
            .get(name)
            .ok_or_else(|| Self::unknown(Namespace::Reasoning, name))?;
        ctor(ctx, params)
    }
}
