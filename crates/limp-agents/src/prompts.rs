//! Model prompts used by the built-in agents.
//!
//! Each prompt carries an upper-case marker (`COMMUNITY CARDS`, `CHIP
//! SNAPSHOT`, ...) that no other prompt contains, so scripted models can
//! route replies by substring.

use limp_core::{PerceptionOutput, QuestionPrompt};

pub const PHASE_MARKER: &str = "COMMUNITY CARDS";
pub const SNAPSHOT_MARKER: &str = "CHIP SNAPSHOT";
pub const BOARD_MARKER: &str = "GAME STATE";
pub const CUES_MARKER: &str = "BEHAVIORAL CUES";
pub const NARRATION_MARKER: &str = "NARRATION FACTS";
pub const EQUITY_MARKER: &str = "EQUITY ESTIMATE";
pub const BELIEF_MARKER: &str = "BELIEF ANALYSIS";
pub const SOCIAL_MARKER: &str = "SOCIAL GOAL";

pub const PHASE_PROMPT: &str = r#"You are reading a poker broadcast frame.
Task: COMMUNITY CARDS. Count the community cards face up on the table and say
whether hands are being revealed at showdown.

Reply with strict JSON only:
{"community_cards": <0-5>, "showdown": <true|false>}"#;

pub const SNAPSHOT_PROMPT: &str = r#"You are reading a poker broadcast frame.
Task: CHIP SNAPSHOT. Read the pot and, for every player on the overlay, the
stack and whether they are still in the hand. Use null for unreadable numbers.

Reply with strict JSON only:
{"pot": <number|null>, "players": [{"name": "...", "stack": <number|null>, "is_active": <bool>}]}"#;

pub const BOARD_PROMPT: &str = r#"You are reading a poker broadcast frame.
Task: GAME STATE. Extract the table exactly as shown.

1. "pot": total pot (number, null if unsure)
2. "board": community cards such as ["Ah", "Kd", "7c"], [] pre-flop
3. "players": for each visible player
   - "name": name shown on screen
   - "stack": stack size (number, null if unreadable)
   - "position": "SB" or "BB" (dealer button)
   - "is_active": has not folded
   - "hole_cards": cards shown on the overlay, null if hidden

Reply with strict JSON only, no markdown."#;

pub fn cues_prompt(player: &str) -> String {
    format!(
        r#"You are observing a poker player on a broadcast frame.
Task: BEHAVIORAL CUES for player "{player}". Describe only what is visible.

- "posture": "Leaning forward" / "Leaning back" / "Neutral"
- "hands": "Playing with chips" / "Touching face" / "Hidden" / "Folded" / "On table"
- "gaze": "Staring at opponent" / "Looking at board" / "Looking down" / "Looking away"
- "facial_emotion": "Neutral" / "Tense" / "Confident" / "Uncertain"
- "occlusion": "Sunglasses" / "Hat" / "Mask" / "None"

Reply with strict JSON only:
{{"posture": "...", "hands": "...", "gaze": "...", "facial_emotion": "...", "occlusion": "..."}}"#
    )
}

pub fn narration_prompt(transcript: &str) -> String {
    format!(
        r#"You are reading the commentary of a poker hand.
Task: NARRATION FACTS. Extract only what the commentators state outright.

Transcript:
{transcript}

Reply with strict JSON only:
{{"hole_cards": {{"<player>": ["Ah", "Kd"]}}, "winner": "<player>|null", "key_moments": ["..."]}}"#
    )
}

/// Situation block shared by the language-model reasoning prompts.
pub fn situation(question: &QuestionPrompt, perception: &PerceptionOutput) -> String {
    let ctx = &question.context;
    let board = if ctx.board.is_empty() {
        "No community cards yet".to_string()
    } else {
        ctx.board.join(", ")
    };
    let pot = ctx
        .pot
        .map(|p| format!("{p:.0}"))
        .unwrap_or_else(|| "unknown".to_string());
    let current = ctx
        .action
        .as_ref()
        .map(|a| a.summary.clone())
        .unwrap_or_else(|| "none".to_string());
    let history = if ctx.action_sequence.is_empty() {
        "No previous actions".to_string()
    } else {
        ctx.action_sequence
            .iter()
            .map(|a| format!("- {}", a.summary))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let stacks = ctx
        .stacks
        .as_ref()
        .map(|s| {
            s.iter()
                .map(|(name, stack)| format!("{name}: {stack:.0}"))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_else(|| "unknown".to_string());
    let players = perception.players().join(", ");

    format!(
        "Situation:\n- Phase: {}\n- Board: {board}\n- Pot: {pot}\n- Players: {players}\n- Stacks: {stacks}\n- Player in question: {}\n- Current action: {current}\n\nAction history:\n{history}\n\nQuestion: {}\n\nOptions:\n{}",
        ctx.phase,
        ctx.player,
        question.prompt,
        question.render_options(),
    )
}

pub fn equity_prompt(question: &QuestionPrompt, perception: &PerceptionOutput) -> String {
    format!(
        r#"You are a poker analyst.
Task: EQUITY ESTIMATE. From the public information only, estimate the share of
the pot the player in question wins on average against a plausible range.

{}

Reply with strict JSON only:
{{"equity": <0.0-1.0>, "reasoning": "..."}}"#,
        situation(question, perception)
    )
}

pub fn belief_prompt(question: &QuestionPrompt, perception: &PerceptionOutput) -> String {
    format!(
        r#"You are analyzing a poker player's beliefs in a theory-of-mind task.
Task: BELIEF ANALYSIS. Consider what the player believes about the opponent's
range and how that belief makes each option more or less likely.

{}

Reply with strict JSON only:
{{"option_scores": {{"A": <0-1>, "B": <0-1>}}, "belief_analysis": "...", "confidence": <0-1>}}"#,
        situation(question, perception)
    )
}

pub fn social_prompt(question: &QuestionPrompt, perception: &PerceptionOutput) -> String {
    format!(
        r#"You are analyzing a poker player's intentions in a theory-of-mind task.
Task: SOCIAL GOAL. Infer what the player is trying to make the opponent
believe or do (fold, call, pay off) and score each option.

{}

Reply with strict JSON only:
{{"option_scores": {{"A": <0-1>, "B": <0-1>}}, "inferred_social_goal": "...", "reasoning": "...", "confidence": <0-1>}}"#,
        situation(question, perception)
    )
}
