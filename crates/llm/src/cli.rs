//! CLI backend: shell out to any command-line LLM tool.
//!
//! The whole conversation is serialized to one prompt. If the command
//! contains a `{}` token the prompt is injected there as a positional
//! argument (good for `claude -p {}`); otherwise it is written to stdin
//! (good for `ollama run <model>`). Tool calling uses the prompt-tooling
//! tag syntax; binary image data is dropped silently.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tracing::{error, warn};

use crate::prompt_tools::{build_tools_system, parse_tool_calls, strip_tool_calls};
use crate::{
    Backend, BackendError, OnText, StopReason, SystemPrompt, ToolCall, ToolDef, ToolOutput,
    TurnResult,
};

pub struct CliBackend {
    command: Vec<String>,
}

impl CliBackend {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    fn format_message(msg: &Value) -> String {
        let role = msg.get("role").and_then(Value::as_str).unwrap_or("user");
        let content = match msg.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(parts)) => parts
                .iter()
                .filter_map(|p| {
                    (p.get("type").and_then(Value::as_str) == Some("text"))
                        .then(|| p.get("text").and_then(Value::as_str).unwrap_or(""))
                })
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        };
        let prefix = if role == "user" { "User" } else { "Assistant" };
        format!("{prefix}:\n{content}")
    }

    fn serialize(&self, system: &SystemPrompt, messages: &[Value], tools: &[ToolDef]) -> String {
        let mut parts = Vec::new();
        let augmented = build_tools_system(&system.joined(), tools);
        if !augmented.is_empty() {
            parts.push(format!("<system>\n{augmented}\n</system>"));
        }
        for msg in messages {
            parts.push(Self::format_message(msg));
        }
        parts.push("Assistant:".to_string());
        parts.join("\n\n")
    }

    async fn run(&self, prompt: &str) -> Result<String, BackendError> {
        let use_arg = self.command.iter().any(|tok| tok == "{}");
        let argv: Vec<String> = if use_arg {
            self.command
                .iter()
                .map(|tok| if tok == "{}" { prompt.to_string() } else { tok.clone() })
                .collect()
        } else {
            self.command.clone()
        };
        let Some((program, args)) = argv.split_first() else {
            return Err(BackendError::Subprocess("empty command".into()));
        };

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            // A nested `claude -p` refuses to run when it thinks it is
            // already inside a Claude Code session.
            .env_remove("CLAUDECODE");
        if use_arg {
            cmd.stdin(std::process::Stdio::null());
        } else {
            cmd.stdin(std::process::Stdio::piped());
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| BackendError::Subprocess(format!("{program}: {e}")))?;

        if !use_arg {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(prompt.as_bytes())
                    .await
                    .map_err(|e| BackendError::Subprocess(e.to_string()))?;
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| BackendError::Subprocess(e.to_string()))?;
        if !output.status.success() {
            warn!(
                stderr = %String::from_utf8_lossy(&output.stderr).chars().take(300).collect::<String>(),
                "CLI backend exited non-zero"
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl Backend for CliBackend {
    async fn stream_turn(
        &self,
        system: &SystemPrompt,
        messages: &[Value],
        tools: &[ToolDef],
        _max_tokens: u32,
        on_text: OnText<'_>,
    ) -> Result<(TurnResult, Value), BackendError> {
        let prompt = self.serialize(system, messages, tools);
        let text = match self.run(&prompt).await {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "CLI backend failed");
                return Err(e);
            }
        };
        on_text(&text);
        let tool_calls = parse_tool_calls(&text);
        let clean = strip_tool_calls(&text);
        let stop = if tool_calls.is_empty() { StopReason::EndTurn } else { StopReason::ToolUse };
        let raw = json!({"role": "assistant", "content": text});
        Ok((TurnResult { stop, text: clean, tool_calls }, raw))
    }

    async fn complete(&self, prompt: &str, _max_tokens: u32) -> String {
        self.run(prompt).await.unwrap_or_else(|e| {
            warn!(error = %e, "complete() failed");
            String::new()
        })
    }

    fn make_user_message(&self, content: &str) -> Value {
        json!({"role": "user", "content": content})
    }

    fn make_tool_results(&self, calls: &[ToolCall], results: &[ToolOutput]) -> Vec<Value> {
        let parts: Vec<String> = calls
            .iter()
            .zip(results)
            .map(|(call, output)| format!("[Tool result: {}]\n{}", call.name, output.text))
            .collect();
        vec![json!({"role": "user", "content": parts.join("\n\n")})]
    }
}
