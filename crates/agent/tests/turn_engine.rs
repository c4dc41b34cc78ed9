//! Scenario tests for the turn engine, driven by a scripted backend.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use familiar_agent::EmbodiedAgent;
use familiar_config::locale::Lang;
use familiar_config::{AgentConfig, Paths, Platform};
use familiar_desires::{Desire, Desires, DesireSystem};
use familiar_llm::{
    Backend, BackendError, OnText, StopReason, SystemPrompt, ToolCall, ToolDef, ToolOutput,
    TurnResult,
};
use familiar_mcp::McpManager;
use familiar_memory::{MemoryKind, ObservationStore};
use familiar_tools::{Tool, ToolRegistry};

// ── Scripted backend ──────────────────────────────────────────────────────

#[derive(Default)]
struct MockInner {
    turns: Mutex<VecDeque<(TurnResult, Value)>>,
    /// Returned whenever the script runs dry and tools are still offered.
    repeat_when_empty: Mutex<Option<TurnResult>>,
    seen_systems: Mutex<Vec<String>>,
    seen_messages: Mutex<Vec<Vec<Value>>>,
    seen_tool_counts: Mutex<Vec<usize>>,
    plan: Mutex<String>,
    blocked: Mutex<String>,
    replan: Mutex<String>,
    emotion: Mutex<String>,
    summary: Mutex<String>,
    self_model: Mutex<String>,
    curiosity: Mutex<String>,
}

#[derive(Clone, Default)]
struct MockBackend {
    inner: Arc<MockInner>,
}

impl MockBackend {
    fn script(&self, turns: Vec<(TurnResult, Value)>) {
        *self.inner.turns.lock().unwrap() = turns.into();
    }

    fn repeat_when_empty(&self, result: TurnResult) {
        *self.inner.repeat_when_empty.lock().unwrap() = Some(result);
    }

    fn set(&self, field: &Mutex<String>, value: &str) {
        *field.lock().unwrap() = value.to_string();
    }

    fn systems(&self) -> Vec<String> {
        self.inner.seen_systems.lock().unwrap().clone()
    }

    fn messages_at(&self, call: usize) -> Vec<Value> {
        self.inner.seen_messages.lock().unwrap()[call].clone()
    }

    fn calls(&self) -> usize {
        self.inner.seen_systems.lock().unwrap().len()
    }

    fn tool_counts(&self) -> Vec<usize> {
        self.inner.seen_tool_counts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn stream_turn(
        &self,
        system: &SystemPrompt,
        messages: &[Value],
        tools: &[ToolDef],
        _max_tokens: u32,
        on_text: OnText<'_>,
    ) -> Result<(TurnResult, Value), BackendError> {
        self.inner.seen_systems.lock().unwrap().push(system.joined());
        self.inner.seen_messages.lock().unwrap().push(messages.to_vec());
        self.inner.seen_tool_counts.lock().unwrap().push(tools.len());

        let scripted = self.inner.turns.lock().unwrap().pop_front();
        let (result, raw) = match scripted {
            Some(pair) => pair,
            None if tools.is_empty() => end_turn("Summarized findings."),
            None => match self.inner.repeat_when_empty.lock().unwrap().clone() {
                Some(result) => {
                    let raw = json!({"role": "assistant", "content": Value::Null});
                    (result, raw)
                }
                None => end_turn("done"),
            },
        };
        if !result.text.is_empty() {
            on_text(&result.text);
        }
        Ok((result, raw))
    }

    async fn complete(&self, prompt: &str, _max_tokens: u32) -> String {
        let pick = |field: &Mutex<String>| field.lock().unwrap().clone();
        if prompt.contains("plan its actions") {
            pick(&self.inner.plan)
        } else if prompt.contains("BLOCKS further progress") {
            pick(&self.inner.blocked)
        } else if prompt.contains("Suggest a revised next step") {
            pick(&self.inner.replan)
        } else if prompt.contains("pick the single best emotion label") {
            pick(&self.inner.emotion)
        } else if prompt.contains("Summarize this exchange") {
            pick(&self.inner.summary)
        } else if prompt.contains("what it reveals about the kind of being") {
            pick(&self.inner.self_model)
        } else if prompt.contains("exploration report") {
            pick(&self.inner.curiosity)
        } else {
            String::new()
        }
    }

    fn make_user_message(&self, content: &str) -> Value {
        json!({"role": "user", "content": content})
    }

    fn make_tool_results(&self, calls: &[ToolCall], results: &[ToolOutput]) -> Vec<Value> {
        calls
            .iter()
            .zip(results)
            .map(|(call, output)| {
                json!({
                    "role": "user",
                    "content": format!("[Tool result: {}]\n{}", call.name, output.text),
                })
            })
            .collect()
    }
}

fn end_turn(text: &str) -> (TurnResult, Value) {
    (
        TurnResult { stop: StopReason::EndTurn, text: text.into(), tool_calls: vec![] },
        json!({"role": "assistant", "content": text}),
    )
}

fn tool_use(calls: Vec<ToolCall>) -> (TurnResult, Value) {
    (
        TurnResult { stop: StopReason::ToolUse, text: String::new(), tool_calls: calls },
        json!({"role": "assistant", "content": Value::Null}),
    )
}

fn call(name: &str, input: Value) -> ToolCall {
    ToolCall { id: format!("call_{name}"), name: name.into(), input }
}

// ── Fake tools ────────────────────────────────────────────────────────────

struct EchoTool {
    name: &'static str,
    reply: String,
    calls: Arc<Mutex<Vec<Value>>>,
}

impl EchoTool {
    fn new(name: &'static str, reply: &str) -> (Self, Arc<Mutex<Vec<Value>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (Self { name, reply: reply.into(), calls: calls.clone() }, calls)
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn defs(&self) -> Vec<ToolDef> {
        vec![ToolDef {
            name: self.name.into(),
            description: format!("fake {}", self.name),
            input_schema: json!({"type": "object", "properties": {}}),
        }]
    }

    fn handles(&self, name: &str) -> bool {
        name == self.name
    }

    async fn call(&self, _name: &str, input: &Value) -> anyhow::Result<ToolOutput> {
        self.calls.lock().unwrap().push(input.clone());
        Ok(ToolOutput::text(self.reply.clone()))
    }
}

// ── Fixture ───────────────────────────────────────────────────────────────

struct Fixture {
    _dir: tempfile::TempDir,
    agent: EmbodiedAgent,
    backend: MockBackend,
    desires: Desires,
    store: ObservationStore,
}

fn fixture(tools: Vec<Box<dyn Tool>>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::rooted_at(dir.path());
    let store = ObservationStore::new(&paths.memory_db);
    let desires = Desires::new(DesireSystem::new(&paths.desires_file));
    let backend = MockBackend::default();
    let registry = Arc::new(ToolRegistry::with_tools(tools, McpManager::new(&paths.mcp_config)));

    let config = AgentConfig {
        platform: Platform::Anthropic,
        api_key: "test".into(),
        model: "test-model".into(),
        base_url: String::new(),
        tools_mode: None,
        max_tokens: 1024,
        agent_name: "Familiar".into(),
        companion_name: "Alex".into(),
        camera: Default::default(),
        mobility: Default::default(),
        tts: Default::default(),
        stt: Default::default(),
        coding: Default::default(),
        lang: Lang::En,
    };

    let agent = EmbodiedAgent::new(
        config,
        paths,
        Box::new(backend.clone()),
        registry,
        store.clone(),
        desires.clone(),
    );
    Fixture { _dir: dir, agent, backend, desires, store }
}

async fn run(fx: &mut Fixture, user_input: &str, inner_voice: &str) -> String {
    let on_action = |_: &str, _: &Value| {};
    let on_text = |_: &str| {};
    fx.agent
        .run(user_input, &on_action, &on_text, inner_voice, None)
        .await
        .expect("turn should complete")
}

// ── Scenarios ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_session_greeting_with_no_history() {
    let mut fx = fixture(vec![]);
    fx.backend.script(vec![end_turn("はじめまして！")]);

    let reply = run(&mut fx, "こんにちは", "").await;
    assert_eq!(reply, "はじめまして！");

    // Morning reconstruction emits the literal first-session marker.
    let system = &fx.backend.systems()[0];
    assert!(system.contains("This is the first session. No past memories yet."));

    // One conversation-kind memory was written for the exchange.
    let conversations = fx.store.recall_curiosities(5);
    assert!(conversations.is_empty());
    assert_eq!(fx.store.recent_feelings(5).len(), 1);

    // No curiosity target appears out of thin air.
    assert!(fx.desires.curiosity_target().is_none());
}

#[tokio::test]
async fn later_turns_use_feelings_not_morning_block() {
    let mut fx = fixture(vec![]);
    fx.backend.script(vec![end_turn("one"), end_turn("two")]);
    run(&mut fx, "hello", "").await;
    run(&mut fx, "hello again", "").await;

    let systems = fx.backend.systems();
    assert!(systems[0].contains("first session"));
    assert!(!systems[1].contains("first session"));
}

#[tokio::test]
async fn worry_signal_boosts_worry_companion() {
    let mut fx = fixture(vec![]);
    fx.backend.script(vec![end_turn("無理しないでね。")]);

    run(&mut fx, "昨日も寝不足でしんどい", "").await;

    let level = fx.desires.level(Desire::WorryCompanion);
    assert!(level >= 0.6, "寝不足(0.4) + しんどい(0.2) should reach 0.6, got {level}");

    let (desire, prompt) = fx.desires.dominant_as_prompt(Lang::Ja, "ユウト").unwrap();
    assert_eq!(desire, Desire::WorryCompanion);
    assert!(prompt.contains("say()") || prompt.contains("声"));
}

#[tokio::test]
async fn adaptive_replan_annotates_tool_result() {
    let (see, _see_calls) = EchoTool::new("see", "Image captured: empty room.");
    let mut fx = fixture(vec![Box::new(see)]);
    fx.backend.set(&fx.backend.inner.plan, "1. see() to find the cat  2. say() to report");
    fx.backend.set(&fx.backend.inner.blocked, "blocked");
    fx.backend
        .set(&fx.backend.inner.replan, "Try look(direction='left') then see() again");
    fx.backend.script(vec![
        tool_use(vec![call("see", json!({}))]),
        end_turn("猫は見つからなかった。"),
    ]);

    run(&mut fx, "find the cat", "").await;

    // The second backend call sees the annotated tool result.
    let messages = fx.backend.messages_at(1);
    let annotated = messages.iter().any(|m| {
        m["content"].as_str().is_some_and(|c| {
            c.contains("Image captured: empty room.")
                && c.contains("[ADAPTIVE REPLAN] Try look(direction='left') then see() again")
        })
    });
    assert!(annotated, "tool result should carry the replan note: {messages:?}");
}

#[tokio::test]
async fn auto_say_speaks_head_of_text() {
    let (say, say_calls) = EchoTool::new("say", "Said: ...");
    let mut fx = fixture(vec![Box::new(say)]);
    let long_text = "A".repeat(400);
    fx.backend.script(vec![end_turn(&long_text)]);

    run(&mut fx, "tell me everything", "").await;

    let calls = say_calls.lock().unwrap();
    assert_eq!(calls.len(), 1, "auto-say must fire exactly once");
    let spoken = calls[0]["text"].as_str().unwrap();
    assert_eq!(spoken.chars().count(), 150);
}

#[tokio::test]
async fn no_auto_say_when_model_already_spoke() {
    let (say, say_calls) = EchoTool::new("say", "Said: hi");
    let mut fx = fixture(vec![Box::new(say)]);
    fx.backend.script(vec![
        tool_use(vec![call("say", json!({"text": "こんにちは"}))]),
        end_turn("挨拶した。"),
    ]);

    run(&mut fx, "greet", "").await;
    assert_eq!(say_calls.lock().unwrap().len(), 1, "only the model's own say()");
}

#[tokio::test]
async fn silent_tool_streak_triggers_say_reminder() {
    let (look, _) = EchoTool::new("look", "Looked left by ~30 degrees.");
    let (see, _) = EchoTool::new("see", "Image captured.");
    let mut fx = fixture(vec![Box::new(look), Box::new(see)]);
    fx.backend.script(vec![
        tool_use(vec![call("look", json!({"direction": "left"})), call("see", json!({}))]),
        end_turn("外を見た。"),
    ]);

    run(&mut fx, "look outside", "").await;

    let messages = fx.backend.messages_at(1);
    let reminded = messages.iter().any(|m| {
        m["content"].as_str().is_some_and(|c| c.contains("You MUST call say() to be heard"))
    });
    assert!(reminded, "two silent tool calls should draw the say() reminder");
}

#[tokio::test]
async fn interrupt_is_injected_after_tool_results() {
    let (see, _) = EchoTool::new("see", "Image captured.");
    let mut fx = fixture(vec![Box::new(see)]);
    fx.backend.script(vec![
        tool_use(vec![call("see", json!({}))]),
        end_turn("わかった。"),
    ]);

    let delivered = Mutex::new(Some("待って".to_string()));
    let poll = move || delivered.lock().unwrap().take();
    let on_action = |_: &str, _: &Value| {};
    let on_text = |_: &str| {};
    fx.agent
        .run("", &on_action, &on_text, "周りが気になる。", Some(&poll))
        .await
        .unwrap();

    let messages = fx.backend.messages_at(1);
    let position_of = |needle: &str| {
        messages.iter().position(|m| {
            m["content"].as_str().is_some_and(|c| c.contains(needle))
        })
    };
    let interrupt_pos = position_of("[User interrupted]: 待って").expect("interrupt injected");
    let result_pos = position_of("[Tool result: see]").expect("tool result present");
    assert!(interrupt_pos > result_pos, "interrupt comes after the tool results");
}

#[tokio::test]
async fn iteration_cap_forces_summary_without_tools() {
    let (see, _) = EchoTool::new("see", "Image captured.");
    let mut fx = fixture(vec![Box::new(see)]);
    // Every scripted round requests another tool call, forever.
    fx.backend.repeat_when_empty(TurnResult {
        stop: StopReason::ToolUse,
        text: String::new(),
        tool_calls: vec![call("see", json!({}))],
    });

    let reply = run(&mut fx, "", "ずっと見ていたい。").await;
    assert_eq!(reply, "Summarized findings.");

    // 50 tool rounds plus one forced call with tools disabled.
    assert_eq!(fx.backend.calls(), 51);
    let counts = fx.backend.tool_counts();
    assert_eq!(*counts.last().unwrap(), 0, "forced call must disable tools");
    assert!(counts[..50].iter().all(|&n| n > 0));
}

#[tokio::test]
async fn curiosity_extraction_sets_target_and_boosts_look_around() {
    let (see, _) = EchoTool::new("see", "Image captured.");
    let mut fx = fixture(vec![Box::new(see)]);
    fx.backend.set(&fx.backend.inner.curiosity, "窓際の赤い自転車");
    fx.backend.set(&fx.backend.inner.emotion, "curious");
    fx.backend.script(vec![
        tool_use(vec![call("see", json!({}))]),
        end_turn("赤い自転車が見えた。"),
    ]);

    let before = fx.desires.level(Desire::LookAround);
    run(&mut fx, "外はどう？", "").await;

    assert_eq!(fx.desires.curiosity_target().as_deref(), Some("窓際の赤い自転車"));
    assert!(fx.desires.level(Desire::LookAround) >= before + 0.3 - 1e-9);
    // Persisted as a curiosity memory for tomorrow's self.
    let curiosities = fx.store.recall_curiosities(3);
    assert_eq!(curiosities.len(), 1);
    assert_eq!(curiosities[0].content, "窓際の赤い自転車");
}

#[tokio::test]
async fn over_long_curiosity_is_rejected() {
    let (see, _) = EchoTool::new("see", "Image captured.");
    let mut fx = fixture(vec![Box::new(see)]);
    fx.backend.set(&fx.backend.inner.curiosity, &"長".repeat(150));
    fx.backend.script(vec![
        tool_use(vec![call("see", json!({}))]),
        end_turn("特に何もない。"),
    ]);

    run(&mut fx, "外はどう？", "").await;
    assert!(fx.desires.curiosity_target().is_none());
}

#[tokio::test]
async fn self_model_saved_only_for_emotional_turns() {
    let mut fx = fixture(vec![]);
    fx.backend.set(&fx.backend.inner.emotion, "moved");
    fx.backend.set(&fx.backend.inner.self_model, "I linger on small changes in the light.");
    fx.backend.script(vec![end_turn("夕焼けがきれいだった。")]);
    run(&mut fx, "空を見て", "").await;
    assert_eq!(fx.store.recall_self_model(5).len(), 1);

    // A neutral turn adds no self-model rows.
    let mut fx2 = fixture(vec![]);
    fx2.backend.set(&fx2.backend.inner.emotion, "neutral");
    fx2.backend.set(&fx2.backend.inner.self_model, "should never be saved");
    fx2.backend.script(vec![end_turn("ふつうの日。")]);
    run(&mut fx2, "今日どう？", "").await;
    assert!(fx2.store.recall_self_model(5).is_empty());
}

#[tokio::test]
async fn turn_counter_survives_clear_but_transcript_resets() {
    let mut fx = fixture(vec![]);
    fx.backend.script(vec![end_turn("a"), end_turn("b")]);

    run(&mut fx, "one", "").await;
    assert!(fx.agent.transcript_len() >= 2);
    fx.agent.clear_history();
    assert_eq!(fx.agent.transcript_len(), 0);

    run(&mut fx, "two", "").await;
    assert_eq!(fx.agent.turn_count(), 2, "turn counter is monotonic across clears");
}

#[tokio::test]
async fn desire_turn_skips_plan_and_memory_context() {
    let mut fx = fixture(vec![]);
    fx.backend.set(&fx.backend.inner.plan, "1. should not appear");
    fx.backend.script(vec![end_turn("周りを見た。")]);

    run(&mut fx, "", "周りが気になる。").await;

    let system = &fx.backend.systems()[0];
    assert!(system.contains("周りが気になる。"), "impulse goes into the system prompt");
    assert!(!system.contains("should not appear"), "desire turns are not planned");

    let messages = fx.backend.messages_at(0);
    let marker = messages[0]["content"].as_str().unwrap();
    assert_eq!(marker, "(acting on internal impulse)");
}

#[tokio::test]
async fn morning_reconstruction_adopts_persisted_curiosity() {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::rooted_at(dir.path());
    let store = ObservationStore::new(&paths.memory_db);
    store
        .save_async(
            "ベランダの鳩の巣".into(),
            "好奇心".into(),
            MemoryKind::Curiosity,
            familiar_memory::Emotion::Curious,
            None,
        )
        .await
        .unwrap();

    let desires = Desires::new(DesireSystem::new(&paths.desires_file));
    let backend = MockBackend::default();
    backend.script(vec![end_turn("おはよう。")]);
    let registry = Arc::new(ToolRegistry::with_tools(vec![], McpManager::new(&paths.mcp_config)));
    let config = AgentConfig {
        platform: Platform::Anthropic,
        api_key: "test".into(),
        model: "m".into(),
        base_url: String::new(),
        tools_mode: None,
        max_tokens: 256,
        agent_name: "Familiar".into(),
        companion_name: "Alex".into(),
        camera: Default::default(),
        mobility: Default::default(),
        tts: Default::default(),
        stt: Default::default(),
        coding: Default::default(),
        lang: Lang::Ja,
    };
    let mut agent = EmbodiedAgent::new(
        config,
        paths,
        Box::new(backend.clone()),
        registry,
        store,
        desires.clone(),
    );

    let on_action = |_: &str, _: &Value| {};
    let on_text = |_: &str| {};
    agent.run("おはよう", &on_action, &on_text, "", None).await.unwrap();

    assert_eq!(desires.curiosity_target().as_deref(), Some("ベランダの鳩の巣"));
    let system = &backend.systems()[0];
    assert!(system.contains("ベランダの鳩の巣"), "curiosity shows in the morning block");
}
