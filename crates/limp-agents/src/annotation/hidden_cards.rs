use async_trait::async_trait;
use limp_core::agent::unsupported;
use limp_core::{
    AgentContext, AgentError, AgentParams, AnnotationAgent, AnnotationReport, AnnotationRequest,
    PlayerFacts, PrivilegedMetadata, RegistryError,
};
use std::collections::BTreeMap;

pub const NAME: &str = "hidden_cards";

/// Labels each player's hidden cards and pre-flop hand strength.
///
/// Supplied metadata wins over cards named in the commentary.
pub struct HiddenCards;

pub fn build(_ctx: &AgentContext, _params: &AgentParams) -> Result<Box<dyn AnnotationAgent>, RegistryError> {
    Ok(Box::new(HiddenCards))
}

pub fn merge(
    metadata: Option<&PrivilegedMetadata>,
    narrated: &BTreeMap<String, Vec<String>>,
) -> BTreeMap<String, PlayerFacts> {
    let mut out = BTreeMap::new();
    if let Some(meta) = metadata {
        for (name, cards) in &meta.hole_cards {
            if !cards.is_empty() {
                out.insert(name.clone(), PlayerFacts::from_cards(cards.clone()));
            }
        }
    }
    for (name, cards) in narrated {
        let known = out.keys().any(|k: &String| k.eq_ignore_ascii_case(name));
        if !known && !cards.is_empty() {
            out.insert(name.clone(), PlayerFacts::from_cards(cards.clone()));
        }
    }
    out
}

#[async_trait]
impl AnnotationAgent for HiddenCards {
    fn capability(&self) -> &str {
        NAME
    }

    async fn annotate(&self, request: AnnotationRequest) -> Result<AnnotationReport, AgentError> {
        match request {
            AnnotationRequest::HiddenCards { metadata, narrated } => {
                Ok(AnnotationReport::HiddenCards(merge(metadata.as_ref(), &narrated)))
            }
            other => Err(unsupported(NAME, other.kind())),
        }
    }
}
