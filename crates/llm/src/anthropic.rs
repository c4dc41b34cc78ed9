//! Anthropic Messages API backend.
//!
//! Tools are first-class objects; tool results go back as a user message of
//! typed `tool_result` blocks with optional inline images. The stable part
//! of the system prompt is tagged with an ephemeral cache hint so it is
//! reused across turns within the provider's cache window.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::stream::{sse_data, LineBuffer};
use crate::{
    Backend, BackendError, OnText, StopReason, SystemPrompt, ToolCall, ToolDef, ToolOutput,
    TurnResult,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const BASE_URL: &str = "https://api.anthropic.com/v1";

pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicBackend {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: BASE_URL.to_string(),
        }
    }

    fn request(&self) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
    }

    /// Multi-block system param with a cache hint on the stable block.
    /// Degenerates to a plain string when only one uncached block exists.
    fn system_param(system: &SystemPrompt) -> Value {
        let mut blocks = Vec::new();
        if !system.stable.is_empty() {
            blocks.push(json!({
                "type": "text",
                "text": system.stable,
                "cache_control": {"type": "ephemeral"},
            }));
        }
        if !system.variable.is_empty() {
            blocks.push(json!({"type": "text", "text": system.variable}));
        }
        if blocks.len() == 1 && blocks[0].get("cache_control").is_none() {
            return Value::String(system.variable.clone());
        }
        Value::Array(blocks)
    }

    fn convert_tools(tools: &[ToolDef]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect()
    }
}

/// Rebuilds provider-native content blocks from streamed events.
#[derive(Default)]
struct BlockAssembler {
    // (block json, accumulated partial_json for tool_use blocks)
    blocks: Vec<(Map<String, Value>, String)>,
}

impl BlockAssembler {
    fn start_block(&mut self, index: usize, block: &Value) {
        while self.blocks.len() <= index {
            self.blocks.push((Map::new(), String::new()));
        }
        if let Some(obj) = block.as_object() {
            self.blocks[index].0 = obj.clone();
        }
    }

    fn text_delta(&mut self, index: usize, text: &str) {
        if let Some((block, _)) = self.blocks.get_mut(index) {
            let existing = block.get("text").and_then(Value::as_str).unwrap_or("");
            block.insert("text".into(), json!(format!("{existing}{text}")));
        }
    }

    fn json_delta(&mut self, index: usize, partial: &str) {
        if let Some((_, buf)) = self.blocks.get_mut(index) {
            buf.push_str(partial);
        }
    }

    fn finish(self) -> (String, Vec<ToolCall>, Vec<Value>) {
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut raw = Vec::new();
        for (mut block, json_buf) in self.blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    text.push_str(block.get("text").and_then(Value::as_str).unwrap_or(""));
                }
                Some("tool_use") => {
                    let input: Value =
                        serde_json::from_str(json_buf.trim()).unwrap_or_else(|_| json!({}));
                    block.insert("input".into(), input.clone());
                    tool_calls.push(ToolCall {
                        id: block
                            .get("id")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        name: block
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        input,
                    });
                }
                _ => {}
            }
            if !block.is_empty() {
                raw.push(Value::Object(block));
            }
        }
        (text, tool_calls, raw)
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    async fn stream_turn(
        &self,
        system: &SystemPrompt,
        messages: &[Value],
        tools: &[ToolDef],
        max_tokens: u32,
        on_text: OnText<'_>,
    ) -> Result<(TurnResult, Value), BackendError> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "system": Self::system_param(system),
            "messages": messages,
            "stream": true,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(Self::convert_tools(tools));
        }

        let mut response = self.request().json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::Api { status: status.as_u16(), body: text });
        }

        let mut assembler = BlockAssembler::default();
        let mut stop_reason = String::new();
        let mut lines = LineBuffer::default();

        while let Some(chunk) = response.chunk().await? {
            for line in lines.push(&chunk) {
                let Some(data) = sse_data(&line) else { continue };
                let Ok(event) = serde_json::from_str::<Value>(data) else { continue };
                match event.get("type").and_then(Value::as_str) {
                    Some("content_block_start") => {
                        let index =
                            event.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                        if let Some(block) = event.get("content_block") {
                            assembler.start_block(index, block);
                        }
                    }
                    Some("content_block_delta") => {
                        let index =
                            event.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                        let Some(delta) = event.get("delta") else { continue };
                        match delta.get("type").and_then(Value::as_str) {
                            Some("text_delta") => {
                                if let Some(text) = delta.get("text").and_then(Value::as_str) {
                                    assembler.text_delta(index, text);
                                    on_text(text);
                                }
                            }
                            Some("input_json_delta") => {
                                if let Some(partial) =
                                    delta.get("partial_json").and_then(Value::as_str)
                                {
                                    assembler.json_delta(index, partial);
                                }
                            }
                            _ => {}
                        }
                    }
                    Some("message_delta") => {
                        if let Some(reason) = event
                            .pointer("/delta/stop_reason")
                            .and_then(Value::as_str)
                        {
                            stop_reason = reason.to_string();
                        }
                    }
                    _ => {}
                }
            }
        }

        let (text, tool_calls, raw_blocks) = assembler.finish();
        let stop = if stop_reason == "end_turn" || tool_calls.is_empty() {
            StopReason::EndTurn
        } else {
            StopReason::ToolUse
        };
        let result = TurnResult {
            stop,
            text,
            tool_calls: if stop == StopReason::ToolUse { tool_calls } else { Vec::new() },
        };
        let raw = json!({"role": "assistant", "content": raw_blocks});
        Ok((result, raw))
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> String {
        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });
        let response = match self.request().json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "complete() failed");
                return String::new();
            }
        };
        let Ok(body) = response.json::<Value>().await else {
            return String::new();
        };
        body.pointer("/content/0/text")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    fn make_user_message(&self, content: &str) -> Value {
        json!({"role": "user", "content": content})
    }

    fn make_tool_results(&self, calls: &[ToolCall], results: &[ToolOutput]) -> Vec<Value> {
        let content: Vec<Value> = calls
            .iter()
            .zip(results)
            .map(|(call, output)| {
                let mut parts = vec![json!({"type": "text", "text": output.text})];
                if let Some(image) = &output.image {
                    parts.push(json!({
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": "image/jpeg",
                            "data": image,
                        },
                    }));
                }
                json!({
                    "type": "tool_result",
                    "tool_use_id": call.id,
                    "content": parts,
                })
            })
            .collect();
        vec![json!({"role": "user", "content": content})]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_param_tags_stable_block_for_caching() {
        let system = SystemPrompt { stable: "rules".into(), variable: "today".into() };
        let param = AnthropicBackend::system_param(&system);
        let blocks = param.as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["cache_control"]["type"], "ephemeral");
        assert!(blocks[1].get("cache_control").is_none());
    }

    #[test]
    fn system_param_degenerates_to_string_without_stable_part() {
        let system = SystemPrompt { stable: String::new(), variable: "only".into() };
        assert_eq!(AnthropicBackend::system_param(&system), json!("only"));
    }

    #[test]
    fn assembler_rebuilds_text_and_tool_use() {
        let mut asm = BlockAssembler::default();
        asm.start_block(0, &json!({"type": "text", "text": ""}));
        asm.text_delta(0, "I'll look ");
        asm.text_delta(0, "left.");
        asm.start_block(1, &json!({"type": "tool_use", "id": "tu_1", "name": "look"}));
        asm.json_delta(1, "{\"direction\"");
        asm.json_delta(1, ": \"left\"}");

        let (text, calls, raw) = asm.finish();
        assert_eq!(text, "I'll look left.");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "tu_1");
        assert_eq!(calls[0].input["direction"], "left");
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[1]["input"]["direction"], "left");
    }

    #[test]
    fn assembler_defaults_malformed_input_to_empty_object() {
        let mut asm = BlockAssembler::default();
        asm.start_block(0, &json!({"type": "tool_use", "id": "tu", "name": "see"}));
        asm.json_delta(0, "{oops");
        let (_, calls, _) = asm.finish();
        assert_eq!(calls[0].input, json!({}));
    }

    #[test]
    fn tool_results_become_one_user_message_with_blocks() {
        let backend = AnthropicBackend::new("key".into(), "model".into());
        let calls = vec![ToolCall { id: "tu_1".into(), name: "see".into(), input: json!({}) }];
        let outputs = vec![ToolOutput { text: "Image captured.".into(), image: Some("QUJD".into()) }];
        let msgs = backend.make_tool_results(&calls, &outputs);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["role"], "user");
        let block = &msgs[0]["content"][0];
        assert_eq!(block["type"], "tool_result");
        assert_eq!(block["tool_use_id"], "tu_1");
        assert_eq!(block["content"][1]["source"]["media_type"], "image/jpeg");
    }
}
