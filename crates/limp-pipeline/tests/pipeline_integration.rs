//! Stage-to-stage behavior with scripted models.
//!
//! The vision fake serves an eight-frame heads-up hand at 1 fps: pre-flop
//! on frames 1-4 (Alice raises, Bob calls) and a flop on frames 5-8 (Alice
//! bets, Bob calls).

use limp_agents::{
    register_builtin, BELIEF_MARKER, BOARD_MARKER, CUES_MARKER, EQUITY_MARKER, PHASE_MARKER,
    SNAPSHOT_MARKER, SOCIAL_MARKER,
};
use limp_core::fakes::{Reply, ScriptedLanguage, ScriptedVision};
use limp_core::{
    ActionType, AgentConfig, AgentContext, AgentRegistry, ConfigResolver, ConfigurationError,
    EnvSnapshot, EpisodeStatus, FrameSequence, Overrides, PerceptionOutput, PhaseType,
    PrivilegedMetadata, ProtocolMode, QuestionSet, ReasoningState, RegistryBuilder,
    ResolvedConfig, RunResult,
};
use limp_pipeline::store::{read_json, write_json_atomic};
use limp_pipeline::{
    parse_presets, AblationRunner, AnnotationPipeline, EpisodeLayout, EpisodeRunner,
    PerceptionPipeline, QaGenerator, QaRules, ReasoningPipeline, StageSkips,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const STACKS: [(u64, u64); 8] = [
    (50_000, 50_000),
    (50_000, 50_000),
    (38_000, 50_000),
    (38_000, 38_000),
    (38_000, 38_000),
    (38_000, 38_000),
    (30_000, 38_000),
    (30_000, 30_000),
];

const BOARD: &str = r#"{"pot": 150, "board": [], "players": [
    {"name": "Alice", "stack": 50000, "position": "SB", "is_active": true, "hole_cards": ["Ah", "Ad"]},
    {"name": "Bob", "stack": 50000, "position": "BB", "is_active": true, "hole_cards": ["7c", "2d"]}
]}"#;

const CUES: &str = r#"{"posture": "Leaning forward", "hands": "On table", "gaze": "Staring at opponent", "facial_emotion": "Confident", "occlusion": "None"}"#;

fn frame_name(n: usize) -> String {
    format!("frame_{n:04}")
}

fn snapshot(alice: u64, bob: u64) -> String {
    format!(
        r#"{{"pot": null, "players": [{{"name": "Alice", "stack": {alice}, "is_active": true}}, {{"name": "Bob", "stack": {bob}, "is_active": true}}]}}"#
    )
}

/// Append the hand's replies to `vision`. Earlier rules on `vision` win.
fn script(mut vision: ScriptedVision) -> ScriptedVision {
    for n in 1..=8 {
        let cards = if n <= 4 { 0 } else { 3 };
        vision = vision.on(
            Some(&frame_name(n)),
            Some(PHASE_MARKER),
            Reply::text(format!(r#"{{"community_cards": {cards}, "showdown": false}}"#)),
        );
        let (alice, bob) = STACKS[n - 1];
        vision = vision.on(Some(&frame_name(n)), Some(SNAPSHOT_MARKER), Reply::text(snapshot(alice, bob)));
    }
    vision
        .on(None, Some(BOARD_MARKER), Reply::text(BOARD))
        .on(None, Some(CUES_MARKER), Reply::text(CUES))
}

fn language() -> Arc<ScriptedLanguage> {
    Arc::new(
        ScriptedLanguage::new()
            .on(
                SOCIAL_MARKER,
                Reply::text(r#"{"option_scores": {"A": 0.2, "B": 0.7}, "confidence": 0.8, "inferred_social_goal": "get called"}"#),
            )
            .on(
                BELIEF_MARKER,
                Reply::text(r#"{"option_scores": {"A": 0.6, "B": 0.3}, "confidence": 0.6, "belief_analysis": "Bob is capped"}"#),
            )
            .on(
                EQUITY_MARKER,
                Reply::text(r#"{"equity": 0.8, "confidence": 0.5, "reasoning": "overpair"}"#),
            ),
    )
}

fn registry() -> AgentRegistry {
    let mut b = RegistryBuilder::new();
    register_builtin(&mut b).unwrap();
    b.build()
}

fn config(reg: &AgentRegistry, overrides: Overrides) -> ResolvedConfig {
    let mut overrides = overrides;
    overrides.disable.push("audio_ground_truth".to_string());
    let mut config = ConfigResolver::new(reg, &EnvSnapshot::default())
        .resolve(&overrides)
        .unwrap();
    config.call_timeout_secs = 1;
    config
}

fn frames() -> FrameSequence {
    let paths = (1..=8)
        .map(|n| PathBuf::from(format!("frames/{}.jpg", frame_name(n))))
        .collect();
    FrameSequence::from_paths(paths, 1.0)
}

async fn perceive(vision: ScriptedVision, overrides: Overrides) -> PerceptionOutput {
    let reg = registry();
    let cfg = config(&reg, overrides);
    let ctx = AgentContext::new().with_vision(Arc::new(vision));
    PerceptionPipeline::build(&reg, &cfg, &ctx)
        .unwrap()
        .run("hand_1", &frames())
        .await
}

fn metadata() -> PrivilegedMetadata {
    let mut meta = PrivilegedMetadata::default();
    meta.hole_cards
        .insert("Alice".to_string(), vec!["Ah".to_string(), "Ad".to_string()]);
    meta.hole_cards
        .insert("Bob".to_string(), vec!["7c".to_string(), "2d".to_string()]);
    meta
}

#[tokio::test]
async fn actions_land_inside_their_phase_segments() {
    let output = perceive(script(ScriptedVision::new()), Overrides::default()).await;
    assert!(output.failures.is_empty(), "{:?}", output.failures);
    output.timeline.validate().unwrap();

    let segs = &output.timeline.segments;
    let phases: Vec<PhaseType> = segs.iter().map(|s| s.phase).collect();
    assert_eq!(phases, vec![PhaseType::PreFlop, PhaseType::Flop]);
    assert_eq!((segs[0].start, segs[0].end), (0.0, 4.0));
    assert_eq!((segs[1].start, segs[1].end), (4.0, 8.0));

    for seg in segs {
        assert!(seg.actions.iter().all(|a| seg.contains(a.timestamp)));
    }
    let kinds = |i: usize| -> Vec<(String, ActionType)> {
        segs[i]
            .actions
            .iter()
            .map(|a| (a.player.clone(), a.action))
            .collect()
    };
    assert_eq!(
        kinds(0),
        vec![("Alice".to_string(), ActionType::Raise), ("Bob".to_string(), ActionType::Call)]
    );
    assert_eq!(
        kinds(1),
        vec![("Alice".to_string(), ActionType::Bet), ("Bob".to_string(), ActionType::Call)]
    );

    let key: Vec<_> = segs.iter().flat_map(|s| &s.actions).filter(|a| a.key_decision).collect();
    assert_eq!(key.len(), 2);
    assert!(key.iter().all(|a| a.behavior.is_some()));
}

#[tokio::test]
async fn player_mode_hides_all_but_the_hero_cards() {
    let overrides = Overrides {
        protocol: Some("player".to_string()),
        hero: Some("Alice".to_string()),
        ..Default::default()
    };
    let output = perceive(script(ScriptedVision::new()), overrides).await;
    assert_eq!(output.protocol, ProtocolMode::Player);

    let states: Vec<_> = output
        .timeline
        .segments
        .iter()
        .flat_map(|s| [s.initial_state.as_ref(), s.final_state.as_ref()])
        .flatten()
        .collect();
    assert!(!states.is_empty());
    for state in states {
        for player in &state.players {
            match player.name.as_str() {
                "Alice" => assert!(player.hole_cards.is_some()),
                _ => assert_eq!(player.hole_cards, None),
            }
        }
    }
    let text = serde_json::to_string(&output).unwrap();
    assert!(!text.contains("7c"));
}

#[tokio::test]
async fn question_sets_are_byte_identical_across_runs() {
    let reg = registry();
    let cfg = config(&reg, Overrides::default());
    let annotation = AnnotationPipeline::build(&reg, &cfg, &AgentContext::new()).unwrap();
    let qa = QaGenerator::new(QaRules::from_config(&cfg));

    let mut sets: Vec<QuestionSet> = Vec::new();
    for _ in 0..2 {
        let perception = perceive(script(ScriptedVision::new()), Overrides::default()).await;
        let (gt, failures) = annotation.run("hand_1", None, Some(&metadata())).await;
        assert!(failures.is_empty());
        sets.push(qa.generate(&perception, &gt));
    }
    assert!(!sets[0].questions.is_empty());
    assert_eq!(sets[0].questions[0].id, "hand_1_act_001_intent");
    assert!(sets[0].verify_digest());
    assert_eq!(sets[0].digest, sets[1].digest);
    assert_eq!(
        serde_json::to_vec(&sets[0]).unwrap(),
        serde_json::to_vec(&sets[1]).unwrap()
    );
}

#[tokio::test]
async fn disabled_belief_agent_abstains_on_belief_questions_only() {
    let perception = perceive(script(ScriptedVision::new()), Overrides::default()).await;
    let reg = registry();
    let cfg = config(&reg, Overrides::default());
    let (gt, _) = AnnotationPipeline::build(&reg, &cfg, &AgentContext::new())
        .unwrap()
        .run("hand_1", None, Some(&metadata()))
        .await;
    let set = QaGenerator::new(QaRules::from_config(&cfg)).generate(&perception, &gt);

    let no_belief = config(
        &reg,
        Overrides {
            disable: vec!["tom_belief".to_string()],
            ..Default::default()
        },
    );
    let lm = language();
    let ctx = AgentContext::new().with_language(lm.clone());
    let reasoning = ReasoningPipeline::build(&reg, &no_belief, &ctx).unwrap();
    let answers = reasoning.answer_all(&set.prompts(), Some(&perception)).await.unwrap();

    assert_eq!(answers.len(), set.questions.len());
    for (question, answer) in set.questions.iter().zip(&answers) {
        assert_eq!(answer.question_id, question.id);
        match question.tom_label {
            limp_core::TomLabel::Belief => {
                assert_eq!(answer.state, ReasoningState::Abstained);
                assert!(answer.opinions.is_empty());
            }
            limp_core::TomLabel::SocialGoal => assert_eq!(answer.state, ReasoningState::Done),
        }
    }
    assert!(answers.iter().any(|a| a.state == ReasoningState::Abstained));
    assert!(lm.prompts().iter().all(|p| !p.contains(BELIEF_MARKER)));
}

#[test]
fn unknown_or_unregistered_agents_are_configuration_errors() {
    let reg = registry();
    let err = ConfigResolver::new(&reg, &EnvSnapshot::default())
        .resolve(&Overrides {
            enable: vec!["telepathy".to_string()],
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::UnknownAgent {
            name: "telepathy".to_string()
        }
    );

    let empty = RegistryBuilder::new().build();
    let mut cfg = ResolvedConfig::default();
    cfg.agents
        .insert("board_parser".to_string(), AgentConfig::enabled());
    let err = PerceptionPipeline::build(&empty, &cfg, &AgentContext::new()).unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::UnregisteredAgent {
            name: "board_parser".to_string()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn hung_board_read_is_recorded_and_the_rest_survives() {
    let vision = script(ScriptedVision::new().on(Some(&frame_name(5)), Some(BOARD_MARKER), Reply::Hang));
    let output = perceive(vision, Overrides::default()).await;

    assert_eq!(output.failures.len(), 1);
    let failure = &output.failures[0];
    assert_eq!(failure.capability, "board_parser");
    assert_eq!(failure.unit, "frame[4]");
    assert!(failure.error.contains("timed out"));

    let flop = &output.timeline.segments[1];
    assert!(flop.initial_state.is_none());
    assert!(flop.final_state.is_some());
    assert_eq!(flop.actions.len(), 2);
    assert!(output.timeline.segments[0].initial_state.is_some());
}

fn episode_dir(root: &std::path::Path) -> EpisodeLayout {
    let layout = EpisodeLayout::new(root, "hand_1");
    std::fs::create_dir_all(layout.frames_dir()).unwrap();
    for n in 1..=8 {
        std::fs::write(layout.frames_dir().join(format!("{}.jpg", frame_name(n))), b"").unwrap();
    }
    write_json_atomic(&layout.metadata(), &metadata()).unwrap();
    layout
}

fn episode_runner(vision: ScriptedVision) -> EpisodeRunner {
    episode_runner_with(vision, Overrides::default(), language())
}

fn episode_runner_with(vision: ScriptedVision, overrides: Overrides, lm: Arc<ScriptedLanguage>) -> EpisodeRunner {
    let reg = registry();
    let cfg = config(&reg, overrides);
    let ctx = AgentContext::new()
        .with_vision(Arc::new(vision))
        .with_language(lm);
    EpisodeRunner::build(&reg, &cfg, &ctx, "full").unwrap()
}

fn alice_seat(enable_equity: bool) -> Overrides {
    Overrides {
        protocol: Some("player".to_string()),
        hero: Some("Alice".to_string()),
        enable: if enable_equity { vec!["equity".to_string()] } else { vec![] },
        ..Default::default()
    }
}

fn equity_prompts(lm: &ScriptedLanguage) -> Vec<String> {
    lm.prompts()
        .into_iter()
        .filter(|p| p.contains(EQUITY_MARKER))
        .collect()
}

#[tokio::test]
async fn full_episode_writes_every_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let layout = episode_dir(dir.path());

    let result = episode_runner(script(ScriptedVision::new()))
        .run_episode(&layout, StageSkips::default())
        .await;
    assert_eq!(result.status, EpisodeStatus::Done, "{:?}", result.error);
    for path in [
        layout.perception(),
        layout.ground_truth(),
        layout.questions(),
        layout.reasoning(),
        layout.evaluation_json(),
        layout.evaluation_md(),
        layout.run_result(),
    ] {
        assert!(path.is_file(), "{path:?} missing");
    }

    let report = result.evaluation.as_ref().unwrap();
    let questions = result.questions.as_ref().unwrap();
    assert_eq!(report.overall.total, questions.questions.len());
    assert_eq!(report.answered + report.abstained + report.failed, report.overall.total);
    assert_eq!(report.question_digests.get("hand_1"), Some(&questions.digest));

    let on_disk: RunResult = read_json(&layout.run_result()).unwrap();
    assert_eq!(on_disk.run_id, result.run_id);
    assert_eq!(on_disk.status, EpisodeStatus::Done);
}

#[tokio::test(start_paused = true)]
async fn agent_timeout_makes_the_episode_partial() {
    let dir = tempfile::tempdir().unwrap();
    let layout = episode_dir(dir.path());
    let vision = script(ScriptedVision::new().on(Some(&frame_name(5)), Some(BOARD_MARKER), Reply::Hang));

    let result = episode_runner(vision).run_episode(&layout, StageSkips::default()).await;
    assert_eq!(result.status, EpisodeStatus::Partial);
    assert!(result.error.is_none());
    assert!(result
        .failures
        .iter()
        .any(|f| f.capability == "board_parser" && f.unit == "frame[4]"));
    assert!(result.evaluation.is_some());
}

#[tokio::test]
async fn reasoning_only_rerun_reuses_stored_questions() {
    let dir = tempfile::tempdir().unwrap();
    let layout = episode_dir(dir.path());
    let runner = episode_runner(script(ScriptedVision::new()));
    let first = runner.run_episode(&layout, StageSkips::default()).await;
    let stored: QuestionSet = read_json(&layout.questions()).unwrap();

    let again = runner.run_episode(&layout, StageSkips::reasoning_only()).await;
    assert_eq!(again.status, EpisodeStatus::Done);
    assert_eq!(again.questions.as_ref().map(|q| &q.digest), Some(&stored.digest));
    assert_eq!(
        first.evaluation.as_ref().map(|e| e.overall),
        again.evaluation.as_ref().map(|e| e.overall)
    );
    let counts: BTreeMap<_, _> = again
        .answers
        .iter()
        .map(|a| (a.question_id.clone(), a.state))
        .collect();
    assert_eq!(counts.len(), stored.questions.len());
}

#[tokio::test]
async fn player_rerun_over_stored_audience_perception_hides_opponent_cards() {
    let dir = tempfile::tempdir().unwrap();
    let layout = episode_dir(dir.path());
    let audience = Overrides {
        enable: vec!["equity".to_string()],
        ..Default::default()
    };
    let first = episode_runner_with(script(ScriptedVision::new()), audience, language())
        .run_episode(&layout, StageSkips::default())
        .await;
    assert_eq!(first.status, EpisodeStatus::Done, "{:?}", first.error);
    let stored: PerceptionOutput = read_json(&layout.perception()).unwrap();
    assert_eq!(stored.protocol, ProtocolMode::Audience);
    assert!(serde_json::to_string(&stored).unwrap().contains("7c"));

    let lm = language();
    let again = episode_runner_with(script(ScriptedVision::new()), alice_seat(true), lm.clone())
        .run_episode(&layout, StageSkips::reasoning_only())
        .await;
    assert_eq!(again.status, EpisodeStatus::Done, "{:?}", again.error);

    let prompts = equity_prompts(&lm);
    assert!(!prompts.is_empty());
    assert!(prompts.iter().any(|p| p.contains("Alice: Ah Ad")));
    assert!(lm.prompts().iter().all(|p| !p.contains("7c")));

    let used = again.perception.as_ref().unwrap();
    assert_eq!(used.protocol, ProtocolMode::Player);
    assert_eq!(used.hero.as_deref(), Some("Alice"));
    assert!(!serde_json::to_string(used).unwrap().contains("7c"));
}

#[tokio::test]
async fn player_ablation_over_stored_audience_perception_hides_opponent_cards() {
    let dir = tempfile::tempdir().unwrap();
    let layout = episode_dir(dir.path());
    let first = episode_runner(script(ScriptedVision::new()))
        .run_episode(&layout, StageSkips::default())
        .await;
    assert_eq!(first.status, EpisodeStatus::Done, "{:?}", first.error);

    let reg = registry();
    let base = config(&reg, alice_seat(false));
    let lm = language();
    let ctx = AgentContext::new().with_language(lm.clone());
    let presets = parse_presets(Some("full")).unwrap();
    let outcome = AblationRunner::new(&reg, &base, &ctx)
        .run(dir.path(), &presets, None)
        .await
        .unwrap();
    assert_eq!(outcome.reports.len(), 1);
    assert!(outcome.reports[0].enabled_agents.iter().any(|a| a == "equity"));

    assert!(!equity_prompts(&lm).is_empty());
    assert!(lm.prompts().iter().all(|p| !p.contains("7c")));
}

#[tokio::test(start_paused = true)]
async fn slow_snapshot_reads_each_get_their_own_deadline() {
    // Each read takes 0.8s against a 1s call timeout; a street holds four of them.
    let mut vision = ScriptedVision::new();
    for n in 1..=8 {
        let (alice, bob) = STACKS[n - 1];
        vision = vision.on(
            Some(&frame_name(n)),
            Some(SNAPSHOT_MARKER),
            Reply::delayed(Duration::from_millis(800), snapshot(alice, bob)),
        );
    }
    let output = perceive(script(vision), Overrides::default()).await;

    assert!(output.failures.is_empty(), "{:?}", output.failures);
    let actions: Vec<usize> = output.timeline.segments.iter().map(|s| s.actions.len()).collect();
    assert_eq!(actions, vec![2, 2]);
}

fn two_phase_hand(protocol: ProtocolMode) -> PerceptionOutput {
    use limp_core::{ActionEvent, GameState, GameStateTimeline, PerceptionMeta, PhaseSegment, PlayerState};

    let seat = |name: &str| PlayerState {
        name: name.to_string(),
        position: None,
        stack: Some(50_000.0),
        hole_cards: None,
        is_active: true,
    };
    let mut preflop = PhaseSegment::new(PhaseType::PreFlop, 0.0, 6.0);
    preflop.initial_state = Some(GameState {
        timestamp: 0.0,
        phase: PhaseType::PreFlop,
        board: vec![],
        pot: Some(150.0),
        players: vec![seat("Alice"), seat("Bob")],
    });
    preflop
        .push_action(ActionEvent::new(2.0, "Alice", ActionType::Raise, 12_000.0))
        .unwrap();
    let mut flop = PhaseSegment::new(PhaseType::Flop, 6.0, 12.0);
    flop.push_action(ActionEvent::new(8.0, "Bob", ActionType::Call, 12_000.0))
        .unwrap();

    let mut timeline = GameStateTimeline::new();
    timeline.push_segment(preflop).unwrap();
    timeline.push_segment(flop).unwrap();
    PerceptionOutput {
        episode_id: "hand_1".to_string(),
        protocol,
        hero: None,
        meta: PerceptionMeta::default(),
        timeline,
        enabled_agents: vec![],
        failures: vec![],
    }
}

#[tokio::test]
async fn strong_raiser_reads_as_value_in_both_protocols() {
    let reg = registry();
    let cfg = config(&reg, Overrides::default());
    let (gt, _) = AnnotationPipeline::build(&reg, &cfg, &AgentContext::new())
        .unwrap()
        .run("hand_1", None, Some(&metadata()))
        .await;

    let audience = QaGenerator::new(QaRules::from_config(&cfg))
        .generate(&two_phase_hand(ProtocolMode::Audience), &gt);
    let intent = audience.get("hand_1_act_001_intent").unwrap();
    assert_eq!(intent.context.player, "Alice");
    assert_eq!(intent.answer_text().map(|t| t.starts_with("Value")), Some(true));
    assert!(intent.scoring_context.is_some());

    let player_rules = QaRules {
        protocol: ProtocolMode::Player,
        ..QaRules::from_config(&cfg)
    };
    let player = QaGenerator::new(player_rules).generate(&two_phase_hand(ProtocolMode::Player), &gt);
    let same = player.get("hand_1_act_001_intent").unwrap();
    assert_eq!(same.options, intent.options);
    assert_eq!(same.answer, intent.answer);
    assert!(same.scoring_context.is_none());
}
