//! Built-in LIMP agents and the production model client.
//!
//! [`register_builtin`] fills a [`RegistryBuilder`] with every agent in this
//! crate:
//!
//! | namespace | agents |
//! |---|---|
//! | perception | `phase_segmenter`, `action_detector`, `board_parser`, `cue_analyzer` |
//! | annotation | `audio_ground_truth`, `hidden_cards` |
//! | reasoning | `posture`, `equity`, `tom_belief`, `tom_social` |

pub mod annotation;
pub mod json;
pub mod models;
pub mod perception;
pub mod prompts;
pub mod reasoning;

use limp_core::{RegistryBuilder, RegistryError};

pub use prompts::{
    BELIEF_MARKER, BOARD_MARKER, CUES_MARKER, EQUITY_MARKER, NARRATION_MARKER, PHASE_MARKER,
    SNAPSHOT_MARKER, SOCIAL_MARKER,
};

pub fn register_builtin(builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
    builder
        .register_perception(perception::phase_segmenter::NAME, perception::phase_segmenter::build)?
        .register_perception(perception::action_detector::NAME, perception::action_detector::build)?
        .register_perception(perception::board_parser::NAME, perception::board_parser::build)?
        .register_perception(perception::cue_analyzer::NAME, perception::cue_analyzer::build)?
        .register_annotation(
            annotation::audio_ground_truth::NAME,
            annotation::audio_ground_truth::build,
        )?
        .register_annotation(annotation::hidden_cards::NAME, annotation::hidden_cards::build)?
        .register_reasoning(reasoning::posture::NAME, reasoning::posture::build)?
        .register_reasoning(reasoning::equity::NAME, reasoning::equity::build)?
        .register_reasoning(reasoning::tom_belief::NAME, reasoning::tom_belief::build)?
        .register_reasoning(reasoning::tom_social::NAME, reasoning::tom_social::build)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use limp_core::Namespace;

    #[test]
    fn builtin_registration_is_idempotent() {
        let mut builder = RegistryBuilder::new();
        register_builtin(&mut builder).unwrap();
        register_builtin(&mut builder).unwrap();
        let registry = builder.build();
        assert_eq!(registry.list(Namespace::Perception).len(), 4);
        assert_eq!(registry.list(Namespace::Annotation).len(), 2);
        assert_eq!(registry.list(Namespace::Reasoning).len(), 4);
        assert!(registry.contains(Namespace::Reasoning, "tom_social"));
    }
}
