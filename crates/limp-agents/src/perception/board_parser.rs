use crate::json;
use crate::prompts::BOARD_PROMPT;
use async_trait::async_trait;
use limp_core::agent::unsupported;
use limp_core::{
    AgentContext, AgentError, AgentParams, GameState, PerceptionAgent, PerceptionReport,
    PerceptionRequest, PhaseType, PlayerState, RegistryError, VisionModel,
};
use serde_json::Value;
use std::sync::Arc;

pub const NAME: &str = "board_parser";

/// Reads a full table snapshot from a phase-boundary frame.
pub struct BoardParser {
    vision: Arc<dyn VisionModel>,
}

pub fn build(ctx: &AgentContext, _params: &AgentParams) -> Result<Box<dyn PerceptionAgent>, RegistryError> {
    Ok(Box::new(BoardParser {
        vision: ctx.require_vision(NAME)?,
    }))
}

fn cards(value: Option<&Value>) -> Option<Vec<String>> {
    let list = value?.as_array()?;
    let cards: Vec<String> = list
        .iter()
        .filter_map(Value::as_str)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    Some(cards)
}

fn player(value: &Value) -> Option<PlayerState> {
    let name = value.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    Some(PlayerState {
        name: name.to_string(),
        position: value
            .get("position")
            .and_then(Value::as_str)
            .map(str::to_string),
        stack: value.get("stack").and_then(json::amount),
        hole_cards: cards(value.get("hole_cards")).filter(|c| !c.is_empty()),
        is_active: value.get("is_active").and_then(Value::as_bool).unwrap_or(true),
    })
}

/// Build a [`GameState`] from the model's reply. The segment's phase wins
/// over whatever phase the model claims.
pub fn parse_state(timestamp: f64, phase: PhaseType, value: &Value) -> GameState {
    GameState {
        timestamp,
        phase,
        board: cards(value.get("board")).unwrap_or_default(),
        pot: value.get("pot").and_then(json::amount),
        players: value
            .get("players")
            .and_then(Value::as_array)
            .map(|ps| ps.iter().filter_map(player).collect())
            .unwrap_or_default(),
    }
}

#[async_trait]
impl PerceptionAgent for BoardParser {
    fn capability(&self) -> &str {
        NAME
    }

    async fn perceive(&self, request: PerceptionRequest) -> Result<PerceptionReport, AgentError> {
        let kind = request.kind();
        let PerceptionRequest::ParseBoard { frame, phase } = request else {
            return Err(unsupported(NAME, kind));
        };
        let text = self.vision.describe(&frame.path, BOARD_PROMPT).await?;
        let value = json::extract_object(&text)?;
        Ok(PerceptionReport::Board(parse_state(frame.timestamp, phase, &value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_players_and_board() {
        let value = json!({
            "phase": "River",
            "pot": "24k",
            "board": ["Ah", "Kd", "7c"],
            "players": [
                {"name": "Alice", "stack": 76000, "position": "SB", "is_active": true, "hole_cards": ["Qs", "Qh"]},
                {"name": "Bob", "stack": null, "hole_cards": null}
            ]
        });
        let state = parse_state(12.0, PhaseType::Flop, &value);
        assert_eq!(state.phase, PhaseType::Flop);
        assert_eq!(state.pot, Some(24_000.0));
        assert_eq!(state.board.len(), 3);
        assert_eq!(state.players[0].hole_cards.as_ref().unwrap().len(), 2);
        assert_eq!(state.players[1].hole_cards, None);
        assert_eq!(state.players[1].stack, None);
        assert!(state.players[1].is_active);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let state = parse_state(0.0, PhaseType::PreFlop, &json!({}));
        assert!(state.board.is_empty());
        assert!(state.players.is_empty());
        assert_eq!(state.pot, None);
    }
}
