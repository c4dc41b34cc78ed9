//! Prompt-based tool calling.
//!
//! For models without native function calling (most local VLMs, CLI tools),
//! tool definitions are injected into the system prompt and the model is
//! told to emit exactly one `<tool_call>{"name":…,"input":…}</tool_call>`
//! block. The parser extracts every such block; malformed JSON inside a
//! block yields zero calls for that block, never an error.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};
use tracing::warn;

use crate::{fresh_call_id, ToolCall, ToolDef};

const TOOLS_PROMPT_HEADER: &str = "\n\n---\n[USING TOOLS]\n\
You MUST use tools by outputting a <tool_call> block. This is the ONLY way to take actions.\n\n\
RULE: When you want to use a tool, output EXACTLY this pattern and nothing after it:\n\
<tool_call>{\"name\": \"...\", \"input\": {...}}</tool_call>\n\n\
Then STOP. Do not write anything after the closing tag. The result will be given to you next.\n\n\
CONCRETE EXAMPLES:\n{examples}\n\n\
Available tools:\n{tools_desc}\n\
[/USING TOOLS]\n";

fn tool_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<tool_call>(.*?)</tool_call>").expect("static regex"))
}

/// Append tool descriptions + usage instructions to a system prompt.
/// Returns the prompt unchanged when there are no tools.
pub fn build_tools_system(system: &str, tools: &[ToolDef]) -> String {
    if tools.is_empty() {
        return system.to_string();
    }

    let mut desc_lines = Vec::new();
    let mut example_lines = Vec::new();
    for t in tools {
        desc_lines.push(format!("- {}: {}", t.name, t.description));
        let example = json!({"name": t.name, "input": example_input(&t.input_schema)});
        example_lines.push(format!("<tool_call>{example}</tool_call>"));
    }

    let block = TOOLS_PROMPT_HEADER
        .replace("{examples}", &example_lines.join("\n"))
        .replace("{tools_desc}", &desc_lines.join("\n"));
    format!("{system}{block}")
}

/// Synthesize a concrete example argument object from a schema's required
/// properties: first enum value, else the numeric default, else a
/// `<placeholder>` string.
fn example_input(schema: &Value) -> Value {
    let mut example = serde_json::Map::new();
    let props = schema.get("properties").and_then(Value::as_object);
    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect::<Vec<_>>())
        .unwrap_or_default();

    for key in required {
        let prop = props.and_then(|p| p.get(key));
        let value = match prop {
            Some(p) => {
                if let Some(first) = p.get("enum").and_then(Value::as_array).and_then(|a| a.first())
                {
                    first.clone()
                } else if p.get("type").and_then(Value::as_str) == Some("integer") {
                    p.get("default").cloned().unwrap_or(json!(30))
                } else {
                    json!(format!("<{key}>"))
                }
            }
            None => json!(format!("<{key}>")),
        };
        example.insert(key.to_string(), value);
    }
    Value::Object(example)
}

/// Extract `<tool_call>` JSON blocks from model output.
pub fn parse_tool_calls(text: &str) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    for captures in tool_call_re().captures_iter(text) {
        let body = captures[1].trim();
        match serde_json::from_str::<Value>(body) {
            Ok(data) => {
                let Some(name) = data.get("name").and_then(Value::as_str) else {
                    warn!(block = %body, "tool_call block missing name");
                    continue;
                };
                calls.push(ToolCall {
                    id: fresh_call_id(),
                    name: name.to_string(),
                    input: data.get("input").cloned().unwrap_or_else(|| json!({})),
                });
            }
            Err(_) => warn!(block = %body, "failed to parse tool_call block"),
        }
    }
    calls
}

/// Remove `<tool_call>` blocks from the user-visible text.
pub fn strip_tool_calls(text: &str) -> String {
    tool_call_re().replace_all(text, "").trim().to_string()
}
