//! Voice tool — the only way the agent makes actual sound.
//!
//! Text is synthesized by the TTS service and played locally, or pushed to
//! a go2rtc stream when one is configured (speaker on the camera). Spoken
//! text is truncated to a provider-safe length; spoken words should be
//! brief anyway.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use familiar_config::TtsConfig;
use familiar_llm::{ToolDef, ToolOutput};

use crate::Tool;

const SPOKEN_CHAR_LIMIT: usize = 200;

pub struct VoiceTool {
    config: TtsConfig,
    client: reqwest::Client,
}

impl VoiceTool {
    pub fn new(config: TtsConfig) -> Self {
        Self { config, client: reqwest::Client::new() }
    }

    async fn synthesize(&self, text: &str) -> anyhow::Result<Vec<u8>> {
        let url =
            format!("https://api.elevenlabs.io/v1/text-to-speech/{}", self.config.voice_id);
        let payload = json!({
            "text": text,
            "model_id": "eleven_flash_v2_5",
            "voice_settings": {"stability": 0.5, "similarity_boost": 0.75},
        });
        let resp = self
            .client
            .post(&url)
            .header("xi-api-key", &self.config.api_key)
            .json(&payload)
            .timeout(Duration::from_secs(30))
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("TTS failed: {}", resp.status());
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn play(&self, audio: &[u8]) -> anyhow::Result<()> {
        let tmp = std::env::temp_dir().join(format!("familiar_say_{}.mp3", std::process::id()));
        tokio::fs::write(&tmp, audio).await?;

        let status = if self.config.go2rtc_url.is_empty() {
            // Local playback.
            tokio::process::Command::new("mpv")
                .arg("--no-terminal")
                .arg(&tmp)
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status()
                .await
        } else {
            // Push into the go2rtc stream so the camera speaker plays it.
            let target = format!(
                "{}/api/streams?dst={}",
                self.config.go2rtc_url.trim_end_matches('/'),
                self.config.go2rtc_stream
            );
            tokio::process::Command::new("ffmpeg")
                .args(["-re", "-i"])
                .arg(&tmp)
                .args(["-acodec", "pcm_alaw", "-f", "rtp", &target])
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status()
                .await
        };
        let _ = tokio::fs::remove_file(&tmp).await;
        match status {
            Ok(s) if s.success() => Ok(()),
            Ok(s) => anyhow::bail!("playback exited with {s}"),
            Err(e) => anyhow::bail!("playback failed: {e}"),
        }
    }

    async fn say(&self, text: &str) -> String {
        let spoken = truncate_spoken(text);
        match self.synthesize(&spoken).await {
            Ok(audio) => {
                if let Err(e) = self.play(&audio).await {
                    warn!(error = %e, "audio playback failed");
                }
                let head: String = spoken.chars().take(50).collect();
                format!("Said: {head}...")
            }
            Err(e) => {
                warn!(error = %e, "TTS failed");
                format!("TTS failed: {e}")
            }
        }
    }
}

fn truncate_spoken(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= SPOKEN_CHAR_LIMIT {
        return text.to_string();
    }
    let mut head: String = chars[..SPOKEN_CHAR_LIMIT - 3].iter().collect();
    head.push_str("...");
    head
}

#[async_trait]
impl Tool for VoiceTool {
    fn defs(&self) -> Vec<ToolDef> {
        vec![ToolDef {
            name: "say".into(),
            description: "Speak text aloud. Use to communicate with people in the room.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": {
                        "type": "string",
                        "description": "Text to speak. Keep it to 1-2 short sentences.",
                    },
                },
                "required": ["text"],
            }),
        }]
    }

    fn handles(&self, name: &str) -> bool {
        name == "say"
    }

    async fn call(&self, _name: &str, input: &Value) -> anyhow::Result<ToolOutput> {
        let text = input.get("text").and_then(Value::as_str).unwrap_or("");
        if text.is_empty() {
            return Ok(ToolOutput::text("Nothing to say."));
        }
        Ok(ToolOutput::text(self.say(text).await))
    }
}
