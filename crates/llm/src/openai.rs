//! OpenAI-compatible backend: the real OpenAI API, Ollama, vLLM, LM Studio
//! and anything else speaking `/chat/completions`.
//!
//! Two tool modes. Native uses the function-calling API; tool results are
//! `role=tool` text messages, with any image re-sent as a separate user
//! message because many servers reject images inside tool messages. Prompt
//! mode injects tool descriptions into the system prompt and parses
//! `<tool_call>` tags out of the text.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use familiar_config::ToolsMode;

use crate::prompt_tools::{build_tools_system, parse_tool_calls, strip_tool_calls};
use crate::stream::{sse_data, LineBuffer, ThinkingFilter, ToolCallAccumulator};
use crate::{
    Backend, BackendError, OnText, StopReason, SystemPrompt, ToolCall, ToolDef, ToolOutput,
    TurnResult,
};

pub struct OpenAiCompatBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    tools_mode: ToolsMode,
    /// The real OpenAI API wants `max_completion_tokens`; local servers
    /// still expect `max_tokens`.
    use_completion_tokens: bool,
}

impl OpenAiCompatBackend {
    pub fn new(api_key: String, model: String, base_url: String, tools_mode: ToolsMode) -> Self {
        let use_completion_tokens = base_url.contains("api.openai.com");
        Self {
            client: reqwest::Client::new(),
            api_key: if api_key.is_empty() { "local".into() } else { api_key },
            model,
            base_url,
            tools_mode,
            use_completion_tokens,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn tokens_key(&self) -> &'static str {
        if self.use_completion_tokens {
            "max_completion_tokens"
        } else {
            "max_tokens"
        }
    }

    fn base_body(&self, max_tokens: u32, stream: bool) -> Value {
        let mut body = json!({"model": self.model, "stream": stream});
        body[self.tokens_key()] = json!(max_tokens);
        body
    }

    /// Flat message list with the system prompt prepended.
    fn flatten(system: &str, messages: &[Value]) -> Vec<Value> {
        let mut flat = vec![json!({"role": "system", "content": system})];
        flat.extend(messages.iter().cloned());
        flat
    }

    pub(crate) fn convert_tools(tools: &[ToolDef]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    },
                })
            })
            .collect()
    }

    async fn stream_turn_native(
        &self,
        system: &str,
        messages: &[Value],
        tools: &[ToolDef],
        max_tokens: u32,
        on_text: OnText<'_>,
    ) -> Result<(TurnResult, Value), BackendError> {
        let mut body = self.base_body(max_tokens, true);
        body["messages"] = Value::Array(Self::flatten(system, messages));
        if !tools.is_empty() {
            body["tools"] = Value::Array(Self::convert_tools(tools));
        }

        let mut response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::Api { status: status.as_u16(), body: text });
        }

        let mut text = String::new();
        let mut accumulator = ToolCallAccumulator::default();
        let mut finish_reason = String::new();
        let mut filter = ThinkingFilter::new();
        let mut lines = LineBuffer::default();

        while let Some(chunk) = response.chunk().await? {
            for line in lines.push(&chunk) {
                let Some(data) = sse_data(&line) else { continue };
                let Ok(event) = serde_json::from_str::<Value>(data) else { continue };
                let Some(choice) = event.pointer("/choices/0") else { continue };

                if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
                    finish_reason = reason.to_string();
                }
                let Some(delta) = choice.get("delta") else { continue };

                if let Some(content) = delta.get("content").and_then(Value::as_str) {
                    if let Some(visible) = filter.push(content) {
                        text.push_str(&visible);
                        on_text(&visible);
                    }
                }
                if let Some(tool_deltas) = delta.get("tool_calls").and_then(Value::as_array) {
                    for td in tool_deltas {
                        accumulator.push(td);
                    }
                }
            }
        }
        if let Some(tail) = filter.finish() {
            text.push_str(&tail);
            on_text(&tail);
        }

        let tool_calls = accumulator.finish();
        let stop = if finish_reason == "tool_calls" && !tool_calls.is_empty() {
            StopReason::ToolUse
        } else {
            StopReason::EndTurn
        };
        let raw = raw_assistant(&text, if stop == StopReason::ToolUse { &tool_calls } else { &[] });
        let result = TurnResult {
            stop,
            text,
            tool_calls: if stop == StopReason::ToolUse { tool_calls } else { Vec::new() },
        };
        Ok((result, raw))
    }

    async fn stream_turn_prompt(
        &self,
        system: &str,
        messages: &[Value],
        tools: &[ToolDef],
        max_tokens: u32,
        on_text: OnText<'_>,
    ) -> Result<(TurnResult, Value), BackendError> {
        let augmented = build_tools_system(system, tools);
        let mut body = self.base_body(max_tokens, true);
        body["messages"] = Value::Array(Self::flatten(&augmented, messages));

        let mut response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::Api { status: status.as_u16(), body: text });
        }

        let mut text = String::new();
        let mut lines = LineBuffer::default();
        while let Some(chunk) = response.chunk().await? {
            for line in lines.push(&chunk) {
                let Some(data) = sse_data(&line) else { continue };
                let Ok(event) = serde_json::from_str::<Value>(data) else { continue };
                if let Some(content) =
                    event.pointer("/choices/0/delta/content").and_then(Value::as_str)
                {
                    if !content.is_empty() {
                        text.push_str(content);
                        on_text(content);
                    }
                }
            }
        }

        let tool_calls = parse_tool_calls(&text);
        let clean = strip_tool_calls(&text);
        let stop = if tool_calls.is_empty() { StopReason::EndTurn } else { StopReason::ToolUse };
        // Raw keeps the tags so the model sees its own calls verbatim.
        let raw = json!({
            "role": "assistant",
            "content": if text.is_empty() { Value::Null } else { json!(text) },
        });
        Ok((TurnResult { stop, text: clean, tool_calls }, raw))
    }
}

/// OpenAI-format raw assistant message, tool calls re-serialized with
/// string arguments the way the API expects them on reinjection.
pub(crate) fn raw_assistant(text: &str, tool_calls: &[ToolCall]) -> Value {
    let mut raw = json!({
        "role": "assistant",
        "content": if text.is_empty() { Value::Null } else { json!(text) },
    });
    if !tool_calls.is_empty() {
        raw["tool_calls"] = Value::Array(
            tool_calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.input.to_string(),
                        },
                    })
                })
                .collect(),
        );
    }
    raw
}

/// Native-mode tool results: text-only `role=tool` messages, images as
/// separate user messages with a data URL.
pub(crate) fn native_tool_results(calls: &[ToolCall], results: &[ToolOutput]) -> Vec<Value> {
    let mut msgs = Vec::new();
    for (call, output) in calls.iter().zip(results) {
        msgs.push(json!({
            "role": "tool",
            "tool_call_id": call.id,
            "content": output.text,
        }));
        if let Some(image) = &output.image {
            msgs.push(json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "(camera image attached)"},
                    {
                        "type": "image_url",
                        "image_url": {"url": format!("data:image/jpeg;base64,{image}")},
                    },
                ],
            }));
        }
    }
    msgs
}

/// Prompt-mode tool results: one user message of bracketed text parts plus
/// inline images.
pub(crate) fn prompt_tool_results(calls: &[ToolCall], results: &[ToolOutput]) -> Vec<Value> {
    let mut parts = Vec::new();
    for (call, output) in calls.iter().zip(results) {
        parts.push(json!({
            "type": "text",
            "text": format!("[Tool result: {}]\n{}", call.name, output.text),
        }));
        if let Some(image) = &output.image {
            parts.push(json!({
                "type": "image_url",
                "image_url": {"url": format!("data:image/jpeg;base64,{image}")},
            }));
        }
    }
    vec![json!({"role": "user", "content": parts})]
}

#[async_trait]
impl Backend for OpenAiCompatBackend {
    async fn stream_turn(
        &self,
        system: &SystemPrompt,
        messages: &[Value],
        tools: &[ToolDef],
        max_tokens: u32,
        on_text: OnText<'_>,
    ) -> Result<(TurnResult, Value), BackendError> {
        let system = system.joined();
        match self.tools_mode {
            ToolsMode::Prompt => {
                self.stream_turn_prompt(&system, messages, tools, max_tokens, on_text).await
            }
            ToolsMode::Native => {
                self.stream_turn_native(&system, messages, tools, max_tokens, on_text).await
            }
        }
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> String {
        let mut body = self.base_body(max_tokens, false);
        body["messages"] = json!([{"role": "user", "content": prompt}]);
        let response = match self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "complete() failed");
                return String::new();
            }
        };
        let Ok(body) = response.json::<Value>().await else {
            return String::new();
        };
        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    fn make_user_message(&self, content: &str) -> Value {
        json!({"role": "user", "content": content})
    }

    fn make_tool_results(&self, calls: &[ToolCall], results: &[ToolOutput]) -> Vec<Value> {
        match self.tools_mode {
            ToolsMode::Prompt => prompt_tool_results(calls, results),
            ToolsMode::Native => native_tool_results(calls, results),
        }
    }
}
