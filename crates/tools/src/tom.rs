//! Theory-of-Mind tool — perspective-taking before responding.
//!
//! Not a model call: a structured reflection template, seeded with stored
//! memories about the person, that the agent walks through in its own
//! reasoning before replying.

use async_trait::async_trait;
use serde_json::{json, Value};

use familiar_llm::{ToolDef, ToolOutput};
use familiar_memory::{MemoryRecord, ObservationStore};

use crate::Tool;

pub struct TomTool {
    store: ObservationStore,
    default_person: String,
}

impl TomTool {
    pub fn new(store: ObservationStore, default_person: String) -> Self {
        Self { store, default_person }
    }

    fn render(person: &str, situation: &str, memories: &[MemoryRecord]) -> String {
        let memory_context = if memories.is_empty() {
            String::new()
        } else {
            let lines: Vec<String> = memories
                .iter()
                .map(|m| format!("- [{}] {}", m.emotion.as_str(), m.content))
                .collect();
            format!("\n## {person}に関する記憶\n{}\n", lines.join("\n"))
        };
        format!(
            "# ToM: {person}の視点に立つ\n\
             \n\
             ## 状況\n\
             {situation}\n\
             {memory_context}\n\
             ## トーン分析（まず言い方を読め）\n\
             → 語尾、記号（笑/w/!/?/...）、敬語⇔タメ口、自嘲、照れ、皮肉などから発話の意図を読み取れ\n\
             → 文字通りの意味と、言い方が示す意味にズレがないか確認せよ\n\
             \n\
             ## 投影（{person}は今何を感じてる？何を求めてる？）\n\
             → トーン分析と記憶を踏まえて、{person}の感情・欲求を推測せよ\n\
             → 表面の感情だけでなく、裏にある感情も考えよ\n\
             \n\
             ## 代入（自分がその立場で、その言い方をしたなら、相手にどう返してほしい？）\n\
             → その感情とトーンを自分に代入して考えよ\n\
             \n\
             ## 応答方針\n\
             → 上の結果を踏まえて、どう返すべきか決めよ\n\
             → 相手のトーンに合わせた返し方を選べ\n"
        )
    }
}

#[async_trait]
impl Tool for TomTool {
    fn defs(&self) -> Vec<ToolDef> {
        vec![ToolDef {
            name: "tom".into(),
            description: format!(
                "Theory of Mind: perspective-taking tool. Call this BEFORE responding to \
                 understand what the other person is feeling and wanting. Projects your \
                 simulated emotions onto them, then swaps perspectives. Default person: {}.",
                self.default_person
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "situation": {
                        "type": "string",
                        "description": "What the other person said or did (their message/action).",
                    },
                    "person": {
                        "type": "string",
                        "description": "Who you are talking to.",
                    },
                },
                "required": ["situation"],
            }),
        }]
    }

    fn handles(&self, name: &str) -> bool {
        name == "tom"
    }

    async fn call(&self, _name: &str, input: &Value) -> anyhow::Result<ToolOutput> {
        let situation = input.get("situation").and_then(Value::as_str).unwrap_or("");
        let person = input
            .get("person")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.default_person);

        let memories = self
            .store
            .recall_async(
                format!("{person} コミュニケーション 性格 会話パターン {situation}"),
                5,
                None,
            )
            .await;
        Ok(ToolOutput::text(Self::render(person, situation, &memories)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use familiar_memory::{Emotion, MemoryKind};

    fn tool() -> (tempfile::TempDir, TomTool) {
        let dir = tempfile::tempdir().unwrap();
        let store = ObservationStore::new(dir.path().join("obs.db"));
        (dir, TomTool::new(store, "ユウト".into()))
    }

    #[tokio::test]
    async fn template_sections_are_present() {
        let (_dir, tool) = tool();
        let out = tool.call("tom", &json!({"situation": "「別にいいけど」と言われた"})).await.unwrap();
        assert!(out.text.contains("# ToM: ユウトの視点に立つ"));
        assert!(out.text.contains("## トーン分析"));
        assert!(out.text.contains("## 投影"));
        assert!(out.text.contains("## 応答方針"));
        assert!(out.image.is_none());
    }

    #[tokio::test]
    async fn explicit_person_overrides_default() {
        let (_dir, tool) = tool();
        let out = tool
            .call("tom", &json!({"situation": "waved hello", "person": "Alex"}))
            .await
            .unwrap();
        assert!(out.text.contains("# ToM: Alexの視点に立つ"));
    }

    #[tokio::test]
    async fn stored_memories_are_woven_in() {
        let (_dir, tool) = tool();
        tool.store
            .save_async(
                "ユウトは疲れると口数が減る".into(),
                "会話".into(),
                MemoryKind::Conversation,
                Emotion::Neutral,
                None,
            )
            .await
            .unwrap();
        let out = tool
            .call("tom", &json!({"situation": "ユウトの返事が短い 口数"}))
            .await
            .unwrap();
        assert!(out.text.contains("ユウトに関する記憶"));
        assert!(out.text.contains("口数が減る"));
    }
}
