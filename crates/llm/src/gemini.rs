//! Google Gemini backend (generative language REST API).
//!
//! Native function calling without format hacks: declarations carry the
//! JSON-schema parameters directly, tool results go back as
//! `functionResponse` parts, images ride inline as base64 parts, and the
//! thinking budget is pinned to zero so no reasoning tokens leak into text.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::stream::{sse_data, LineBuffer};
use crate::{
    fresh_call_id, Backend, BackendError, OnText, StopReason, SystemPrompt, ToolCall, ToolDef,
    ToolOutput, TurnResult,
};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiBackend {
    pub fn new(api_key: String, model: String) -> Self {
        Self { client: reqwest::Client::new(), api_key, model }
    }

    fn stream_endpoint(&self) -> String {
        format!(
            "{BASE_URL}/models/{}:streamGenerateContent?alt=sse",
            self.model
        )
    }

    fn generate_endpoint(&self) -> String {
        format!("{BASE_URL}/models/{}:generateContent", self.model)
    }

    fn convert_tools(tools: &[ToolDef]) -> Value {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                })
            })
            .collect();
        json!([{"functionDeclarations": declarations}])
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    async fn stream_turn(
        &self,
        system: &SystemPrompt,
        messages: &[Value],
        tools: &[ToolDef],
        max_tokens: u32,
        on_text: OnText<'_>,
    ) -> Result<(TurnResult, Value), BackendError> {
        let mut body = json!({
            "systemInstruction": {"parts": [{"text": system.joined()}]},
            "contents": messages,
            "generationConfig": {
                "maxOutputTokens": max_tokens,
                "thinkingConfig": {"thinkingBudget": 0},
            },
        });
        if !tools.is_empty() {
            body["tools"] = Self::convert_tools(tools);
        }

        let mut response = self
            .client
            .post(self.stream_endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::Api { status: status.as_u16(), body: text });
        }

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut raw_parts = Vec::new();
        let mut lines = LineBuffer::default();

        while let Some(chunk) = response.chunk().await? {
            for line in lines.push(&chunk) {
                let Some(data) = sse_data(&line) else { continue };
                let Ok(event) = serde_json::from_str::<Value>(data) else { continue };
                let Some(parts) =
                    event.pointer("/candidates/0/content/parts").and_then(Value::as_array)
                else {
                    continue;
                };
                for part in parts {
                    raw_parts.push(part.clone());
                    if let Some(t) = part.get("text").and_then(Value::as_str) {
                        if !t.is_empty() {
                            text.push_str(t);
                            on_text(t);
                        }
                    }
                    if let Some(fc) = part.get("functionCall") {
                        let Some(name) = fc.get("name").and_then(Value::as_str) else {
                            continue;
                        };
                        tool_calls.push(ToolCall {
                            id: fresh_call_id(),
                            name: name.to_string(),
                            input: fc.get("args").cloned().unwrap_or_else(|| json!({})),
                        });
                    }
                }
            }
        }

        let stop = if tool_calls.is_empty() { StopReason::EndTurn } else { StopReason::ToolUse };
        let raw = json!({"role": "model", "parts": raw_parts});
        Ok((TurnResult { stop, text, tool_calls }, raw))
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> String {
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "maxOutputTokens": max_tokens,
                "thinkingConfig": {"thinkingBudget": 0},
            },
        });
        let response = match self
            .client
            .post(self.generate_endpoint())
            .header("x-goog-api-key", &self.api_key)
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
        body.pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    fn make_user_message(&self, content: &str) -> Value {
        json!({"role": "user", "parts": [{"text": content}]})
    }

    fn make_tool_results(&self, calls: &[ToolCall], results: &[ToolOutput]) -> Vec<Value> {
        let mut parts = Vec::new();
        for (call, output) in calls.iter().zip(results) {
            parts.push(json!({
                "functionResponse": {
                    "name": call.name,
                    "response": {"result": output.text},
                },
            }));
            if let Some(image) = &output.image {
                parts.push(json!({
                    "inlineData": {"mimeType": "image/jpeg", "data": image},
                }));
            }
        }
        vec![json!({"role": "user", "parts": parts})]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tools_become_function_declarations() {
        let tools = vec![ToolDef {
            name: "see".into(),
            description: "capture".into(),
            input_schema: json!({"type": "object", "properties": {}}),
        }];
        let converted = GeminiBackend::convert_tools(&tools);
        assert_eq!(converted[0]["functionDeclarations"][0]["name"], "see");
    }

    #[test]
    fn tool_results_are_function_response_parts() {
        let backend = GeminiBackend::new("k".into(), "gemini-2.5-flash".into());
        let calls = vec![ToolCall { id: "c".into(), name: "see".into(), input: json!({}) }];
        let outputs = vec![ToolOutput { text: "a room".into(), image: Some("QUJD".into()) }];
        let msgs = backend.make_tool_results(&calls, &outputs);
        assert_eq!(msgs.len(), 1);
        let parts = msgs[0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["functionResponse"]["name"], "see");
        assert_eq!(parts[0]["functionResponse"]["response"]["result"], "a room");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
    }

    #[test]
    fn user_messages_are_part_lists() {
        let backend = GeminiBackend::new("k".into(), "m".into());
        let msg = backend.make_user_message("hello");
        assert_eq!(msg["role"], "user");
        assert_eq!(msg["parts"][0]["text"], "hello");
    }
}
