//! MCP server config file.
//!
//! Same `mcpServers` shape as other agent CLIs use:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "filesystem": {
//!       "type": "stdio",
//!       "command": "npx",
//!       "args": ["-y", "@modelcontextprotocol/server-filesystem", "/home/user"]
//!     },
//!     "memory": { "type": "sse", "url": "http://localhost:3000/sse" }
//!   }
//! }
//! ```
//!
//! `type` defaults to stdio. Entries with an unknown type, or missing the
//! field their type requires, are skipped with a warning.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpTransportKind {
    Stdio,
    Sse,
}

#[derive(Debug, Clone)]
pub struct McpServerConfig {
    pub name: String,
    pub transport: McpTransportKind,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub url: String,
}

/// Read server entries from the config file. Missing or malformed files
/// yield an empty list; individual bad entries are skipped.
pub fn load_servers(config_path: &Path) -> Vec<McpServerConfig> {
    let raw = match std::fs::read_to_string(config_path) {
        Ok(raw) => raw,
        Err(_) => return Vec::new(),
    };
    let data: Value = match serde_json::from_str(&raw) {
        Ok(data) => data,
        Err(e) => {
            warn!(path = %config_path.display(), error = %e, "failed to parse MCP config");
            return Vec::new();
        }
    };
    let Some(servers) = data.get("mcpServers").and_then(Value::as_object) else {
        if data.get("mcpServers").is_some() {
            warn!("MCP config: mcpServers must be an object, ignoring");
        }
        return Vec::new();
    };

    let mut out = Vec::new();
    for (name, entry) in servers {
        match parse_entry(name, entry) {
            Some(cfg) => out.push(cfg),
            None => continue,
        }
    }
    out
}

fn parse_entry(name: &str, entry: &Value) -> Option<McpServerConfig> {
    let kind_str = entry.get("type").and_then(Value::as_str).unwrap_or("stdio");
    let transport = match kind_str {
        "stdio" => McpTransportKind::Stdio,
        "sse" => McpTransportKind::Sse,
        other => {
            warn!(server = name, kind = other, "unsupported MCP transport type, skipping");
            return None;
        }
    };

    let command = entry.get("command").and_then(Value::as_str).unwrap_or("").to_string();
    let url = entry.get("url").and_then(Value::as_str).unwrap_or("").to_string();
    match transport {
        McpTransportKind::Stdio if command.is_empty() => {
            warn!(server = name, "MCP server missing 'command', skipping");
            return None;
        }
        McpTransportKind::Sse if url.is_empty() => {
            warn!(server = name, "MCP server missing 'url' for sse type, skipping");
            return None;
        }
        _ => {}
    }

    let args = entry
        .get("args")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default();
    let env = entry
        .get("env")
        .and_then(Value::as_object)
        .map(|o| {
            o.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();

    Some(McpServerConfig { name: name.to_string(), transport, command, args, env, url })
}
