//! Configuration for the familiar agent.
//!
//! Everything is environment-driven (optionally seeded from a dotfile by the
//! app crate before construction). Each device section is optional: a tool is
//! only advertised to the model when its credentials are present.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub mod locale;
pub mod paths;

pub use locale::Lang;
pub use paths::Paths;

/// Which LLM wire protocol to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Anthropic,
    OpenAi,
    Gemini,
    Kimi,
    Cli,
}

impl Platform {
    /// Parse a `PLATFORM` value. Unknown strings fall back to Anthropic,
    /// matching the behavior users expect from an unset variable.
    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "gemini" => Platform::Gemini,
            "openai" => Platform::OpenAi,
            "kimi" => Platform::Kimi,
            "cli" => Platform::Cli,
            _ => Platform::Anthropic,
        }
    }
}

/// How tools are delivered to OpenAI-compatible endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolsMode {
    /// Native function-calling API.
    Native,
    /// Tools injected into the system prompt, `<tool_call>` tags parsed out.
    Prompt,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub port: u16,
}

impl CameraConfig {
    fn from_env() -> Self {
        Self {
            host: env_or("CAMERA_HOST", ""),
            username: env_or("CAMERA_USERNAME", "admin"),
            password: env_or("CAMERA_PASSWORD", ""),
            port: env_or("CAMERA_PORT", "2020").parse().unwrap_or(2020),
        }
    }

    pub fn enabled(&self) -> bool {
        // Host alone is enough for local RTSP without auth.
        !self.host.is_empty()
    }

    pub fn rtsp_url(&self) -> String {
        format!(
            "rtsp://{}:{}@{}:554/stream1",
            self.username, self.password, self.host
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MobilityConfig {
    pub api_region: String,
    pub api_key: String,
    pub api_secret: String,
    pub device_id: String,
}

impl MobilityConfig {
    fn from_env() -> Self {
        Self {
            api_region: env_or("MOBILITY_REGION", "us"),
            api_key: env_or("MOBILITY_API_KEY", ""),
            api_secret: env_or("MOBILITY_API_SECRET", ""),
            device_id: env_or("MOBILITY_DEVICE_ID", ""),
        }
    }

    pub fn enabled(&self) -> bool {
        !self.api_key.is_empty() && !self.device_id.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TtsConfig {
    pub api_key: String,
    pub voice_id: String,
    pub go2rtc_url: String,
    pub go2rtc_stream: String,
}

impl TtsConfig {
    fn from_env() -> Self {
        Self {
            api_key: env_or("TTS_API_KEY", ""),
            voice_id: env_or("TTS_VOICE_ID", "cgSgspJ2msm6clMCkdW9"),
            go2rtc_url: env_or("GO2RTC_URL", ""),
            go2rtc_stream: env_or("GO2RTC_STREAM", ""),
        }
    }

    pub fn enabled(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SttConfig {
    pub api_key: String,
    pub language: String,
}

impl SttConfig {
    fn from_env() -> Self {
        Self {
            api_key: env_or("STT_API_KEY", ""),
            language: env_or("STT_LANGUAGE", "ja"),
        }
    }

    pub fn enabled(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodingConfig {
    /// Base directory for relative tool paths. Empty means process cwd.
    pub workdir: String,
    /// `bash` is only advertised when explicitly opted in.
    pub bash_enabled: bool,
}

impl CodingConfig {
    fn from_env() -> Self {
        Self {
            workdir: env_or("CODING_WORKDIR", ""),
            bash_enabled: env_or("CODING_BASH", "").eq_ignore_ascii_case("true"),
        }
    }

    pub fn workdir_path(&self) -> PathBuf {
        if self.workdir.is_empty() {
            env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(&self.workdir)
        }
    }
}

/// Top-level agent configuration, read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub platform: Platform,
    pub api_key: String,
    /// Model identifier, or for [`Platform::Cli`] the shell command template.
    pub model: String,
    pub base_url: String,
    pub tools_mode: Option<ToolsMode>,
    pub max_tokens: u32,
    pub agent_name: String,
    pub companion_name: String,
    pub camera: CameraConfig,
    pub mobility: MobilityConfig,
    pub tts: TtsConfig,
    pub stt: SttConfig,
    pub coding: CodingConfig,
    pub lang: Lang,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        let lang = Lang::detect();
        let tools_mode = match env::var("TOOLS_MODE").ok().as_deref() {
            Some("native") => Some(ToolsMode::Native),
            Some("prompt") => Some(ToolsMode::Prompt),
            _ => None,
        };
        Self {
            platform: Platform::parse(&env_or("PLATFORM", "anthropic")),
            api_key: env_or("API_KEY", ""),
            model: env_or("MODEL", ""),
            base_url: env_or("BASE_URL", ""),
            tools_mode,
            max_tokens: env_or("MAX_TOKENS", "4096").parse().unwrap_or(4096),
            agent_name: env_or("AGENT_NAME", "Familiar"),
            companion_name: env_or(
                "COMPANION_NAME",
                locale::tr(lang, "default_companion_name"),
            ),
            camera: CameraConfig::from_env(),
            mobility: MobilityConfig::from_env(),
            tts: TtsConfig::from_env(),
            stt: SttConfig::from_env(),
            coding: CodingConfig::from_env(),
            lang,
        }
    }

    /// The CLI backend is credential-free; every other platform needs a key.
    pub fn has_credentials(&self) -> bool {
        self.platform == Platform::Cli || !self.api_key.is_empty()
    }
}

fn env_or(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}
