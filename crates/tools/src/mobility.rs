//! Mobility tool — legs of the embodied agent (a robot vacuum base).
//!
//! Commands go through the vendor's cloud API with HMAC-SHA256 request
//! signing. A timed move sleeps for the requested duration and then sends
//! stop, so the base never keeps rolling after the turn moves on.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::warn;

use familiar_config::MobilityConfig;
use familiar_llm::{ToolDef, ToolOutput};

use crate::Tool;

const DIRECTION_COMMANDS: [(&str, &str); 5] = [
    ("forward", "forward"),
    ("backward", "backward"),
    ("left", "turn_left"),
    ("right", "turn_right"),
    ("stop", "stop"),
];

pub struct MobilityTool {
    config: MobilityConfig,
    client: reqwest::Client,
    /// Cached cloud access token; refreshed when a command is rejected.
    token: Mutex<Option<String>>,
}

impl MobilityTool {
    pub fn new(config: MobilityConfig) -> Self {
        Self { config, client: reqwest::Client::new(), token: Mutex::new(None) }
    }

    fn base_url(&self) -> String {
        format!("https://openapi.tuya{}.com", self.config.api_region)
    }

    fn now_millis() -> u128 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0)
    }

    /// Cloud request signature: HMAC-SHA256 over
    /// `client_id [+ token] + t + stringToSign`, uppercased hex.
    fn sign(&self, token: &str, t: u128, method: &str, path: &str, body: &str) -> String {
        let body_hash = hex::encode(Sha256::digest(body.as_bytes()));
        let string_to_sign = format!("{method}\n{body_hash}\n\n{path}");
        let message = format!("{}{}{}{}", self.config.api_key, token, t, string_to_sign);
        let mut mac = Hmac::<Sha256>::new_from_slice(self.config.api_secret.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes()).to_uppercase()
    }

    async fn fetch_token(&self) -> anyhow::Result<String> {
        let path = "/v1.0/token?grant_type=1";
        let t = Self::now_millis();
        let sign = self.sign("", t, "GET", path, "");
        let resp: Value = self
            .client
            .get(format!("{}{}", self.base_url(), path))
            .header("client_id", &self.config.api_key)
            .header("t", t.to_string())
            .header("sign_method", "HMAC-SHA256")
            .header("sign", sign)
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .json()
            .await?;
        resp.pointer("/result/access_token")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| anyhow::anyhow!("token response missing access_token: {resp}"))
    }

    async fn send_command(&self, command: &str) -> anyhow::Result<()> {
        let mut token_guard = self.token.lock().await;
        if token_guard.is_none() {
            *token_guard = Some(self.fetch_token().await?);
        }
        let token = token_guard.clone().unwrap_or_default();
        drop(token_guard);

        let path = format!("/v1.0/devices/{}/commands", self.config.device_id);
        let body =
            json!({"commands": [{"code": "direction_control", "value": command}]}).to_string();
        let t = Self::now_millis();
        let sign = self.sign(&token, t, "POST", &path, &body);
        let resp: Value = self
            .client
            .post(format!("{}{}", self.base_url(), path))
            .header("client_id", &self.config.api_key)
            .header("access_token", &token)
            .header("t", t.to_string())
            .header("sign_method", "HMAC-SHA256")
            .header("sign", sign)
            .header("content-type", "application/json")
            .body(body)
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .json()
            .await?;

        if resp.get("success").and_then(Value::as_bool) == Some(true) {
            Ok(())
        } else {
            // Token may have expired; drop it so the next call re-auths.
            *self.token.lock().await = None;
            anyhow::bail!("command rejected: {resp}")
        }
    }

    async fn walk(&self, direction: &str, duration: Option<f64>) -> anyhow::Result<String> {
        let Some(command) =
            DIRECTION_COMMANDS.iter().find(|(d, _)| *d == direction).map(|(_, c)| *c)
        else {
            return Ok(format!("Invalid direction: {direction}"));
        };

        self.send_command(command).await?;
        if let Some(secs) = duration {
            if command != "stop" {
                let secs = secs.clamp(0.1, 10.0);
                tokio::time::sleep(Duration::from_secs_f64(secs)).await;
                self.send_command("stop").await?;
                return Ok(format!("Moved {direction} for {secs}s and stopped."));
            }
        }
        Ok(if direction == "stop" {
            "Stopped.".to_string()
        } else {
            format!("Moving {direction}.")
        })
    }
}

#[async_trait]
impl Tool for MobilityTool {
    fn defs(&self) -> Vec<ToolDef> {
        vec![ToolDef {
            name: "walk".into(),
            description: "Move the robot body. Use to navigate around the room. Always stop \
                          after moving to avoid collisions."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "direction": {
                        "type": "string",
                        "enum": ["forward", "backward", "left", "right", "stop"],
                        "description": "Direction to move",
                    },
                    "duration": {
                        "type": "number",
                        "description": "How long to move in seconds (0.1-10). If omitted, moves until stopped.",
                        "minimum": 0.1,
                        "maximum": 10.0,
                    },
                },
                "required": ["direction"],
            }),
        }]
    }

    fn handles(&self, name: &str) -> bool {
        name == "walk"
    }

    async fn call(&self, _name: &str, input: &Value) -> anyhow::Result<ToolOutput> {
        let direction = input.get("direction").and_then(Value::as_str).unwrap_or("");
        let duration = input.get("duration").and_then(Value::as_f64);
        match self.walk(direction, duration).await {
            Ok(text) => Ok(ToolOutput::text(text)),
            Err(e) => {
                warn!(error = %e, "walk failed");
                Ok(ToolOutput::text(format!("Move failed: {e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> MobilityTool {
        MobilityTool::new(MobilityConfig {
            api_region: "us".into(),
            api_key: "client123".into(),
            api_secret: "secret456".into(),
            device_id: "dev789".into(),
        })
    }

    #[test]
    fn signature_is_uppercase_hex_and_deterministic() {
        let t = tool();
        let a = t.sign("tok", 1700000000000, "POST", "/v1.0/devices/dev789/commands", "{}");
        let b = t.sign("tok", 1700000000000, "POST", "/v1.0/devices/dev789/commands", "{}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(a, a.to_uppercase());
    }

    #[test]
    fn signature_varies_with_body() {
        let t = tool();
        let a = t.sign("tok", 1, "POST", "/p", "{\"x\":1}");
        let b = t.sign("tok", 1, "POST", "/p", "{\"x\":2}");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn invalid_direction_short_circuits() {
        let t = tool();
        // No network call happens for an invalid direction.
        let msg = t.walk("sideways", None).await.unwrap();
        assert_eq!(msg, "Invalid direction: sideways");
    }

    #[test]
    fn direction_map_covers_schema_enum() {
        let t = tool();
        let schema = &t.defs()[0].input_schema;
        let enum_dirs: Vec<&str> = schema["properties"]["direction"]["enum"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        for dir in enum_dirs {
            assert!(DIRECTION_COMMANDS.iter().any(|(d, _)| *d == dir));
        }
    }
}
