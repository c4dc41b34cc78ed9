//! Camera tool — the eyes and neck of the embodied agent.
//!
//! `see` grabs one RTSP frame through an ffmpeg subprocess with a hard
//! wall-clock timeout; the JPEG is saved to the capture directory and
//! returned base64-encoded. `look` sends an ONVIF RelativeMove so the model
//! can pan/tilt before the next capture.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::Local;
use serde_json::{json, Value};
use tracing::warn;

use familiar_config::CameraConfig;
use familiar_llm::{ToolDef, ToolOutput};

use crate::Tool;

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(8);

pub struct CameraTool {
    config: CameraConfig,
    capture_dir: PathBuf,
    client: reqwest::Client,
}

impl CameraTool {
    pub fn new(config: CameraConfig, capture_dir: PathBuf) -> Self {
        Self { config, capture_dir, client: reqwest::Client::new() }
    }

    /// Grab one frame. Returns (base64 JPEG, saved path) or `None` when the
    /// camera is unreachable; the caller words the failure for the model.
    async fn capture(&self) -> Option<(String, PathBuf)> {
        let tmp = std::env::temp_dir().join(format!("familiar_frame_{}.jpg", std::process::id()));
        let mut child = match tokio::process::Command::new("ffmpeg")
            .args([
                "-rtsp_transport",
                "tcp",
                "-fflags",
                "nobuffer",
                "-flags",
                "low_delay",
                "-i",
                &self.config.rtsp_url(),
                "-vframes",
                "1",
                "-q:v",
                "3",
                "-vf",
                "scale=1280:-1",
                "-y",
            ])
            .arg(&tmp)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "ffmpeg not available");
                return None;
            }
        };

        // Hard timeout: a wedged RTSP stream must not stall the turn.
        match tokio::time::timeout(CAPTURE_TIMEOUT, child.wait()).await {
            Ok(Ok(_status)) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "capture process failed");
                return None;
            }
            Err(_) => {
                warn!("RTSP capture timed out");
                let _ = child.kill().await;
                let _ = tokio::fs::remove_file(&tmp).await;
                return None;
            }
        }

        let data = match tokio::fs::read(&tmp).await {
            Ok(data) if !data.is_empty() => data,
            _ => {
                let _ = tokio::fs::remove_file(&tmp).await;
                return None;
            }
        };
        let _ = tokio::fs::remove_file(&tmp).await;

        let b64 = base64::engine::general_purpose::STANDARD.encode(&data);
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let save_path = self.capture_dir.join(format!("capture_{stamp}.jpg"));
        if let Err(e) = tokio::fs::create_dir_all(&self.capture_dir).await {
            warn!(error = %e, "could not create capture dir");
        } else if let Err(e) = tokio::fs::write(&save_path, &data).await {
            warn!(error = %e, "could not save capture");
        }
        Some((b64, save_path))
    }

    /// ONVIF RelativeMove. Positive pan is physically left on this camera
    /// family; tilt is inverted the same way.
    async fn move_relative(&self, direction: &str, degrees: i64) -> String {
        let degrees = degrees.clamp(1, 90);
        let (pan, tilt) = match direction {
            "left" => (degrees as f64 / 180.0, 0.0),
            "right" => (-(degrees as f64) / 180.0, 0.0),
            "up" => (0.0, -(degrees as f64) / 90.0),
            "down" => (0.0, degrees as f64 / 90.0),
            other => return format!("Invalid direction: {other}"),
        };

        let endpoint = format!(
            "http://{}:{}/onvif/ptz_service",
            self.config.host, self.config.port
        );
        let envelope = relative_move_envelope(
            &self.config.username,
            &self.config.password,
            "Profile_1",
            pan,
            tilt,
        );
        let sent = self
            .client
            .post(&endpoint)
            .header("content-type", "application/soap+xml; charset=utf-8")
            .body(envelope)
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        match sent {
            Ok(resp) if resp.status().is_success() => {
                // Let the motion settle before the next capture.
                tokio::time::sleep(Duration::from_millis(400)).await;
                format!("Looked {direction} by ~{degrees} degrees.")
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "camera move rejected");
                format!("Camera move failed: HTTP {}", resp.status())
            }
            Err(e) => {
                warn!(error = %e, "camera move failed");
                format!("Camera move failed: {e}")
            }
        }
    }
}

/// SOAP envelope for RelativeMove with a plain-text WS-UsernameToken.
fn relative_move_envelope(
    username: &str,
    password: &str,
    profile: &str,
    pan: f64,
    tilt: f64,
) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd"
            xmlns:tptz="http://www.onvif.org/ver20/ptz/wsdl"
            xmlns:tt="http://www.onvif.org/ver10/schema">
  <s:Header>
    <wsse:Security>
      <wsse:UsernameToken>
        <wsse:Username>{username}</wsse:Username>
        <wsse:Password Type="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText">{password}</wsse:Password>
      </wsse:UsernameToken>
    </wsse:Security>
  </s:Header>
  <s:Body>
    <tptz:RelativeMove>
      <tptz:ProfileToken>{profile}</tptz:ProfileToken>
      <tptz:Translation>
        <tt:PanTilt x="{pan:.4}" y="{tilt:.4}"/>
      </tptz:Translation>
    </tptz:RelativeMove>
  </s:Body>
</s:Envelope>"#
    )
}

#[async_trait]
impl Tool for CameraTool {
    fn defs(&self) -> Vec<ToolDef> {
        vec![
            ToolDef {
                name: "see".into(),
                description: "Take a photo with your eyes (camera). Use this to see what's in \
                              front of you. Always capture after moving to see your new \
                              surroundings."
                    .into(),
                input_schema: json!({"type": "object", "properties": {}, "required": []}),
            },
            ToolDef {
                name: "look".into(),
                description: "Move your neck (camera) to look in a direction. Use to explore \
                              different areas around you."
                    .into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "direction": {
                            "type": "string",
                            "enum": ["left", "right", "up", "down"],
                            "description": "Direction to look",
                        },
                        "degrees": {
                            "type": "integer",
                            "description": "How many degrees to turn (1-90, default 30)",
                            "minimum": 1,
                            "maximum": 90,
                        },
                    },
                    "required": ["direction"],
                }),
            },
        ]
    }

    fn handles(&self, name: &str) -> bool {
        matches!(name, "see" | "look")
    }

    async fn call(&self, name: &str, input: &Value) -> anyhow::Result<ToolOutput> {
        match name {
            "see" => match self.capture().await {
                Some((b64, path)) => Ok(ToolOutput {
                    text: format!("Image captured. Saved to {}", path.display()),
                    image: Some(b64),
                }),
                None => Ok(ToolOutput::text("Camera not available or capture failed.")),
            },
            "look" => {
                let direction = input.get("direction").and_then(Value::as_str).unwrap_or("");
                let degrees = input.get("degrees").and_then(Value::as_i64).unwrap_or(30);
                Ok(ToolOutput::text(self.move_relative(direction, degrees).await))
            }
            other => Ok(ToolOutput::text(format!("Unknown tool: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_credentials_and_translation() {
        let xml = relative_move_envelope("admin", "pw", "Profile_1", 0.1667, 0.0);
        assert!(xml.contains("<wsse:Username>admin</wsse:Username>"));
        assert!(xml.contains("Profile_1"));
        assert!(xml.contains(r#"x="0.1667" y="0.0000""#));
    }

    #[test]
    fn handles_only_camera_tools() {
        let tool = CameraTool::new(CameraConfig::default(), PathBuf::from("/tmp"));
        assert!(tool.handles("see"));
        assert!(tool.handles("look"));
        assert!(!tool.handles("walk"));
    }

    #[test]
    fn defs_expose_direction_enum() {
        let tool = CameraTool::new(CameraConfig::default(), PathBuf::from("/tmp"));
        let defs = tool.defs();
        assert_eq!(defs.len(), 2);
        let look = defs.iter().find(|d| d.name == "look").unwrap();
        let dirs = &look.input_schema["properties"]["direction"]["enum"];
        assert_eq!(dirs, &json!(["left", "right", "up", "down"]));
    }
}
