//! Scheduler loop behavior with a stubbed backend.

use std::sync::{Arc, Mutex};
use std::time::Duration;

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
use familiar_memory::ObservationStore;
use familiar_runtime::{input_channel, ChatLog, Input, Scheduler, Ui};
use familiar_tools::ToolRegistry;

/// Backend that always ends the turn with a fixed reply.
struct OkBackend;

#[async_trait]
impl Backend for OkBackend {
    async fn stream_turn(
        &self,
        _system: &SystemPrompt,
        _messages: &[Value],
        _tools: &[ToolDef],
        _max_tokens: u32,
        on_text: OnText<'_>,
    ) -> Result<(TurnResult, Value), BackendError> {
        on_text("ok");
        Ok((
            TurnResult { stop: StopReason::EndTurn, text: "ok".into(), tool_calls: vec![] },
            json!({"role": "assistant", "content": "ok"}),
        ))
    }

    async fn complete(&self, _prompt: &str, _max_tokens: u32) -> String {
        String::new()
    }

    fn make_user_message(&self, content: &str) -> Value {
        json!({"role": "user", "content": content})
    }

    fn make_tool_results(&self, calls: &[ToolCall], results: &[ToolOutput]) -> Vec<Value> {
        calls
            .iter()
            .zip(results)
            .map(|(c, r)| json!({"role": "user", "content": format!("[{}] {}", c.name, r.text)}))
            .collect()
    }
}

#[derive(Default)]
struct RecordingUi {
    lines: Mutex<Vec<String>>,
}

impl Ui for RecordingUi {
    fn text(&self, _chunk: &str) {}
    fn action(&self, _name: &str, _input: &Value) {}
    fn line(&self, text: &str) {
        self.lines.lock().unwrap().push(text.to_string());
    }
}

fn build(dir: &std::path::Path) -> (EmbodiedAgent, Desires, Paths) {
    let paths = Paths::rooted_at(dir);
    let store = ObservationStore::new(&paths.memory_db);
    let desires = Desires::new(DesireSystem::new(&paths.desires_file));
    let registry = Arc::new(ToolRegistry::with_tools(vec![], McpManager::new(&paths.mcp_config)));
    let config = AgentConfig {
        platform: Platform::Anthropic,
        api_key: "test".into(),
        model: "m".into(),
        base_url: String::new(),
        tools_mode: None,
        max_tokens: 128,
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
        paths.clone(),
        Box::new(OkBackend),
        registry,
        store,
        desires.clone(),
    );
    (agent, desires, paths)
}

#[tokio::test]
async fn buffered_inputs_run_in_fifo_order_then_quit() {
    let dir = tempfile::tempdir().unwrap();
    let (agent, desires, paths) = build(dir.path());
    let ui = Arc::new(RecordingUi::default());
    let (tx, rx) = input_channel();

    tx.send(Input::Line("hello there".into())).unwrap();
    tx.send(Input::Line("/clear".into())).unwrap();
    tx.send(Input::Line("/quit".into())).unwrap();

    let mut scheduler = Scheduler::new(
        agent,
        desires,
        Lang::En,
        "Alex".into(),
        false,
        ui.clone(),
        ChatLog::open(&paths.chat_log),
        rx,
    );
    scheduler.run().await.unwrap();

    let log = std::fs::read_to_string(&paths.chat_log).unwrap();
    assert!(log.contains("User: hello there"));
    assert!(log.contains("Agent: ok"));
    assert!(log.contains("--- history cleared"));

    let lines = ui.lines.lock().unwrap();
    assert!(lines.iter().any(|l| l == "History cleared."));
    assert_eq!(lines.last().map(String::as_str), Some("Goodbye."));
}

#[tokio::test]
async fn eof_alone_stops_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let (agent, desires, paths) = build(dir.path());
    let ui = Arc::new(RecordingUi::default());
    let (tx, rx) = input_channel();
    tx.send(Input::Eof).unwrap();

    let mut scheduler = Scheduler::new(
        agent,
        desires,
        Lang::En,
        "Alex".into(),
        false,
        ui,
        ChatLog::open(&paths.chat_log),
        rx,
    );
    scheduler.run().await.unwrap();
}

#[tokio::test]
async fn idle_desire_fires_murmur_and_resets_desire() {
    let dir = tempfile::tempdir().unwrap();
    let (agent, desires, paths) = build(dir.path());
    desires.boost(Desire::LookAround, 0.9);
    desires.set_curiosity_target(Some("the red bicycle".into()));

    let ui = Arc::new(RecordingUi::default());
    let (tx, rx) = input_channel();

    let mut scheduler = Scheduler::new(
        agent,
        desires.clone(),
        Lang::En,
        "Alex".into(),
        false,
        ui.clone(),
        ChatLog::open(&paths.chat_log),
        rx,
    )
    .with_timing(Duration::from_millis(10), Duration::ZERO);

    // Let the desire turn fire before stdin closes.
    let closer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        let _ = tx.send(Input::Eof);
    });
    scheduler.run().await.unwrap();
    closer.await.unwrap();

    let lines = ui.lines.lock().unwrap();
    assert!(
        lines.iter().any(|l| l == "feeling curious about outside…"),
        "murmur line expected, got {lines:?}"
    );
    // The desire was satisfied back to its resting level and the curiosity
    // target cleared after the self-driven turn.
    assert!(desires.level(Desire::LookAround) <= 0.11);
    assert!(desires.curiosity_target().is_none());

    let log = std::fs::read_to_string(&paths.chat_log).unwrap();
    assert!(log.contains("--- impulse:"));
    assert!(log.contains("the red bicycle"), "impulse should reference the curiosity target");
}
