//! `remember` / `recall` — the model's direct line to the observation store.

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use tracing::warn;

use familiar_config::locale::Lang;
use familiar_llm::{ToolDef, ToolOutput};
use familiar_memory::{format_for_context, Emotion, MemoryKind, ObservationStore};

use crate::Tool;

/// Images larger than this are not inlined into the database.
const MAX_IMAGE_BYTES: u64 = 256 * 1024;

pub struct MemoryTools {
    store: ObservationStore,
}

impl MemoryTools {
    pub fn new(store: ObservationStore) -> Self {
        Self { store }
    }

    async fn remember(&self, input: &Value) -> ToolOutput {
        let content = input.get("content").and_then(Value::as_str).unwrap_or("");
        if content.is_empty() {
            return ToolOutput::text("Nothing to remember: 'content' is required.");
        }
        let emotion = input
            .get("emotion")
            .and_then(Value::as_str)
            .map(Emotion::parse)
            .unwrap_or(Emotion::Neutral);

        let image_data = match input.get("image_path").and_then(Value::as_str) {
            Some(path) if !path.is_empty() => read_image_b64(path).await,
            _ => None,
        };

        match self
            .store
            .save_async(
                content.to_string(),
                "unknown".to_string(),
                MemoryKind::Observation,
                emotion,
                image_data,
            )
            .await
        {
            Ok(_) => {
                let head: String = content.chars().take(60).collect();
                ToolOutput::text(format!("Remembered: {head}"))
            }
            Err(e) => {
                warn!(error = %e, "remember failed");
                ToolOutput::text(format!("Could not save memory: {e}"))
            }
        }
    }

    async fn recall(&self, input: &Value) -> ToolOutput {
        let query = input.get("query").and_then(Value::as_str).unwrap_or("");
        if query.is_empty() {
            return ToolOutput::text("Nothing to recall: 'query' is required.");
        }
        let n = input.get("n").and_then(Value::as_u64).unwrap_or(3) as usize;
        let records = self.store.recall_async(query.to_string(), n, None).await;
        if records.is_empty() {
            return ToolOutput::text("No memories found.");
        }
        ToolOutput::text(format_for_context(Lang::detect(), &records))
    }
}

async fn read_image_b64(path: &str) -> Option<String> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() <= MAX_IMAGE_BYTES => match tokio::fs::read(path).await {
            Ok(bytes) => Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            Err(e) => {
                warn!(path, error = %e, "could not read image for memory");
                None
            }
        },
        Ok(meta) => {
            warn!(path, size = meta.len(), "image too large to inline, skipping");
            None
        }
        Err(e) => {
            warn!(path, error = %e, "image path not accessible");
            None
        }
    }
}

#[async_trait]
impl Tool for MemoryTools {
    fn defs(&self) -> Vec<ToolDef> {
        vec![
            ToolDef {
                name: "remember".into(),
                description: "Save something worth keeping to long-term memory. Use for \
                              observations, facts about people, and moments that matter."
                    .into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "content": {"type": "string", "description": "What to remember"},
                        "emotion": {
                            "type": "string",
                            "enum": ["neutral", "happy", "sad", "curious", "excited", "moved"],
                            "description": "How this memory feels",
                        },
                        "image_path": {
                            "type": "string",
                            "description": "Optional path to an image to attach",
                        },
                    },
                    "required": ["content"],
                }),
            },
            ToolDef {
                name: "recall".into(),
                description: "Search long-term memory for related past observations and \
                              conversations."
                    .into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "What to look for"},
                        "n": {
                            "type": "integer",
                            "description": "How many memories to return (default 3)",
                            "minimum": 1,
                            "maximum": 10,
                        },
                    },
                    "required": ["query"],
                }),
            },
        ]
    }

    fn handles(&self, name: &str) -> bool {
        matches!(name, "remember" | "recall")
    }

    async fn call(&self, name: &str, input: &Value) -> anyhow::Result<ToolOutput> {
        match name {
            "remember" => Ok(self.remember(input).await),
            "recall" => Ok(self.recall(input).await),
            other => Ok(ToolOutput::text(format!("Unknown tool: {other}"))),
        }
    }
}
