//! Moonshot AI Kimi backend.
//!
//! OpenAI-shaped wire format with one critical difference: when thinking is
//! active, assistant chunks carry a `reasoning_content` field that MUST be
//! captured and round-tripped in the next turn's assistant message. Omitting
//! it makes the server reject subsequent tool calls with
//! "thinking is enabled but reasoning_content is missing in assistant
//! tool call message".

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::openai::{native_tool_results, raw_assistant, OpenAiCompatBackend};
use crate::stream::{sse_data, LineBuffer, ToolCallAccumulator};
use crate::{
    Backend, BackendError, OnText, StopReason, SystemPrompt, ToolCall, ToolDef, ToolOutput,
    TurnResult,
};

const BASE_URL: &str = "https://api.moonshot.ai/v1";

pub struct KimiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl KimiBackend {
    pub fn new(api_key: String, model: String) -> Self {
        Self { client: reqwest::Client::new(), api_key, model }
    }

    fn endpoint(&self) -> String {
        format!("{BASE_URL}/chat/completions")
    }
}

#[async_trait]
impl Backend for KimiBackend {
    async fn stream_turn(
        &self,
        system: &SystemPrompt,
        messages: &[Value],
        tools: &[ToolDef],
        max_tokens: u32,
        on_text: OnText<'_>,
    ) -> Result<(TurnResult, Value), BackendError> {
        let mut flat = vec![json!({"role": "system", "content": system.joined()})];
        flat.extend(messages.iter().cloned());

        let mut body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": flat,
            "stream": true,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(OpenAiCompatBackend::convert_tools(tools));
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
        let mut reasoning = String::new();
        let mut accumulator = ToolCallAccumulator::default();
        let mut finish_reason = String::new();
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

                // Thinking tokens: captured for round-trip, never surfaced.
                if let Some(rc) = delta.get("reasoning_content").and_then(Value::as_str) {
                    reasoning.push_str(rc);
                }
                if let Some(content) = delta.get("content").and_then(Value::as_str) {
                    if !content.is_empty() {
                        text.push_str(content);
                        on_text(content);
                    }
                }
                if let Some(tool_deltas) = delta.get("tool_calls").and_then(Value::as_array) {
                    for td in tool_deltas {
                        accumulator.push(td);
                    }
                }
            }
        }

        let tool_calls = accumulator.finish();
        let stop = if finish_reason == "tool_calls" && !tool_calls.is_empty() {
            StopReason::ToolUse
        } else {
            StopReason::EndTurn
        };
        let mut raw =
            raw_assistant(&text, if stop == StopReason::ToolUse { &tool_calls } else { &[] });
        if !reasoning.is_empty() {
            raw["reasoning_content"] = json!(reasoning);
        }
        let result = TurnResult {
            stop,
            text,
            tool_calls: if stop == StopReason::ToolUse { tool_calls } else { Vec::new() },
        };
        Ok((result, raw))
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> String {
        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });
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
        native_tool_results(calls, results)
    }
}
