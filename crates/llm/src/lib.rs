//! LLM backend abstraction — Anthropic, OpenAI-compatible, Gemini, Kimi, or CLI.
//!
//! One trait, five wire protocols. Each backend owns its provider-native
//! message format end to end: the transcript stores whatever
//! [`Backend::make_assistant_message`] returns, opaque to the rest of the
//! system, so provider side-channel data (Kimi's `reasoning_content`,
//! Gemini's parts) round-trips exactly across turns.

use async_trait::async_trait;
use serde_json::Value;

mod anthropic;
mod cli;
mod gemini;
mod kimi;
mod openai;
pub mod prompt_tools;
mod stream;

pub use anthropic::AnthropicBackend;
pub use cli::CliBackend;
pub use gemini::GeminiBackend;
pub use kimi::KimiBackend;
pub use openai::OpenAiCompatBackend;

use familiar_config::{AgentConfig, Platform, ToolsMode};

/// One tool the model may invoke: name, description, JSON-schema input.
/// This is the neutral shape; each backend converts to its own format.
#[derive(Debug, Clone)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Stable within a turn; synthesized for providers that do not issue ids.
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// What a tool produced: text for the model, optionally a base64 JPEG.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub text: String,
    pub image: Option<String>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), image: None }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
}

/// Result of one streamed assistant turn.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub stop: StopReason,
    /// Concatenated user-visible assistant text (thinking filtered out).
    pub text: String,
    /// Non-empty exactly when `stop` is [`StopReason::ToolUse`].
    pub tool_calls: Vec<ToolCall>,
}

/// System prompt split into a stable part (personality + rulebook, safe to
/// cache across turns) and a per-turn variable part. Backends without a
/// prompt cache join the two with a separator.
#[derive(Debug, Clone, Default)]
pub struct SystemPrompt {
    pub stable: String,
    pub variable: String,
}

impl SystemPrompt {
    pub fn joined(&self) -> String {
        match (self.stable.is_empty(), self.variable.is_empty()) {
            (false, false) => format!("{}\n\n---\n\n{}", self.stable, self.variable),
            (false, true) => self.stable.clone(),
            _ => self.variable.clone(),
        }
    }
}

/// Streaming text sink. Invoked once per non-thinking text fragment, as
/// soon as it arrives.
pub type OnText<'a> = &'a (dyn Fn(&str) + Send + Sync);

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("http error: {0}")]
    Http(String),
    #[error("api error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("subprocess error: {0}")]
    Subprocess(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Http(e.to_string())
    }
}

/// Uniform streaming turn + simple completion over every provider protocol.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Stream one assistant turn. Text fragments go to `on_text` as they
    /// arrive; the call returns only after the final message is assembled.
    /// The second element is the provider-native assistant payload for
    /// verbatim reinjection via [`Backend::make_assistant_message`].
    async fn stream_turn(
        &self,
        system: &SystemPrompt,
        messages: &[Value],
        tools: &[ToolDef],
        max_tokens: u32,
        on_text: OnText<'_>,
    ) -> Result<(TurnResult, Value), BackendError>;

    /// Simple completion for utility calls (plan, emotion, summary…).
    /// Always returns `""` on failure; callers treat empty as "skip".
    async fn complete(&self, prompt: &str, max_tokens: u32) -> String;

    fn make_user_message(&self, content: &str) -> Value;

    /// Wrap the raw assistant payload for transcript storage. The default
    /// returns it unchanged; backends that need extra framing override.
    fn make_assistant_message(&self, _result: &TurnResult, raw: Value) -> Value {
        raw
    }

    /// Convert a batch of tool results into provider-native messages, in
    /// the same order as `calls`. May return more than one message (e.g.
    /// images as separate user messages).
    fn make_tool_results(&self, calls: &[ToolCall], results: &[ToolOutput]) -> Vec<Value>;
}

/// Factory: pick the backend for the configured platform.
pub fn create_backend(config: &AgentConfig) -> Box<dyn Backend> {
    match config.platform {
        Platform::Gemini => {
            let model = default_model(&config.model, "gemini-2.5-flash");
            tracing::info!(model, "using Gemini backend");
            Box::new(GeminiBackend::new(config.api_key.clone(), model))
        }
        Platform::OpenAi => {
            let model = default_model(&config.model, "gpt-4o-mini");
            let base_url = if config.base_url.is_empty() {
                "https://api.openai.com/v1".to_string()
            } else {
                config.base_url.clone()
            };
            // Local model servers frequently hang on an unexpected `tools`
            // parameter, so prompt mode is the default off api.openai.com.
            let is_real_openai = base_url.contains("api.openai.com");
            let tools_mode = config.tools_mode.unwrap_or(if is_real_openai {
                ToolsMode::Native
            } else {
                ToolsMode::Prompt
            });
            tracing::info!(model, %base_url, ?tools_mode, "using OpenAI-compatible backend");
            Box::new(OpenAiCompatBackend::new(
                config.api_key.clone(),
                model,
                base_url,
                tools_mode,
            ))
        }
        Platform::Kimi => {
            let model = default_model(&config.model, "kimi-k2.5");
            tracing::info!(model, "using Kimi backend");
            Box::new(KimiBackend::new(config.api_key.clone(), model))
        }
        Platform::Cli => {
            let raw = if config.model.trim().is_empty() {
                "claude -p {}"
            } else {
                config.model.trim()
            };
            let cmd = shlex::split(raw).unwrap_or_else(|| vec![raw.to_string()]);
            tracing::info!(command = %cmd.join(" "), "using CLI backend");
            Box::new(CliBackend::new(cmd))
        }
        Platform::Anthropic => {
            let model = default_model(&config.model, "claude-haiku-4-5-20251001");
            tracing::info!(model, "using Anthropic backend");
            Box::new(AnthropicBackend::new(config.api_key.clone(), model))
        }
    }
}

fn default_model(configured: &str, fallback: &str) -> String {
    if configured.is_empty() {
        fallback.to_string()
    } else {
        configured.to_string()
    }
}

/// Synthesize a fresh tool-call id for providers that do not issue one.
pub(crate) fn fresh_call_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("call_{}", &hex[..8])
}
