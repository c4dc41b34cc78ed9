//! Session manager: owns every MCP server connection, discovers tools, and
//! routes calls by tool name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use crate::config::{load_servers, McpServerConfig, McpTransportKind};
use crate::protocol::{self, McpToolDef, ToolCallResult, ToolsListResult};
use crate::transport::{McpTransport, SseTransport, StdioTransport};
use crate::McpError;

/// Neutral view of one discovered tool, for registry conversion.
#[derive(Debug, Clone)]
pub struct McpToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

struct McpSession {
    name: String,
    transport: Box<dyn McpTransport>,
}

impl McpSession {
    /// Connect, handshake, discover tools.
    async fn initialize(config: &McpServerConfig) -> Result<(Self, Vec<McpToolDef>), McpError> {
        let transport: Box<dyn McpTransport> = match config.transport {
            McpTransportKind::Stdio => Box::new(StdioTransport::spawn(config)?),
            McpTransportKind::Sse => Box::new(SseTransport::connect(&config.url).await?),
        };

        let resp = transport
            .send_request("initialize", Some(protocol::initialize_params()))
            .await?;
        resp.into_result()
            .map_err(|e| McpError::Protocol(format!("initialize failed: {e}")))?;

        transport.send_notification("notifications/initialized").await?;

        let tools_resp = transport.send_request("tools/list", None).await?;
        let tools = match tools_resp.into_result() {
            Ok(value) => match serde_json::from_value::<ToolsListResult>(value) {
                Ok(parsed) => parsed.tools,
                Err(e) => {
                    warn!(server = %config.name, error = %e, "failed to parse tools/list result");
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(server = %config.name, error = %e, "tools/list returned error");
                Vec::new()
            }
        };

        Ok((Self { name: config.name.clone(), transport }, tools))
    }

    async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        if !self.transport.is_alive() {
            return Err(McpError::ServerNotConnected(self.name.clone()));
        }
        let params = serde_json::json!({"name": tool_name, "arguments": arguments});
        let resp = self.transport.send_request("tools/call", Some(params)).await?;
        let value = resp
            .into_result()
            .map_err(|e| McpError::Protocol(format!("tools/call failed: {e}")))?;
        serde_json::from_value(value)
            .map_err(|e| McpError::Protocol(format!("failed to parse tools/call result: {e}")))
    }
}

/// Holds all MCP sessions for the life of the agent process.
///
/// Construction is cheap; [`McpManager::start`] does the connecting and is
/// idempotent, so the first turn pays the cost rather than process startup.
/// On a tool-name collision the first registration wins and later ones are
/// dropped with a warning.
pub struct McpManager {
    config_path: PathBuf,
    // Registration order; shutdown releases in reverse.
    sessions: Vec<McpSession>,
    /// tool name → index into `sessions`.
    router: HashMap<String, usize>,
    tool_defs: Vec<McpToolInfo>,
    started: bool,
}

impl McpManager {
    pub fn new(config_path: impl AsRef<Path>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            sessions: Vec::new(),
            router: HashMap::new(),
            tool_defs: Vec::new(),
            started: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Connect to every configured server. Servers that fail are skipped.
    pub async fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;

        for config in load_servers(&self.config_path) {
            info!(server = %config.name, transport = ?config.transport, "initializing MCP server");
            match McpSession::initialize(&config).await {
                Ok((session, tools)) => {
                    let index = self.sessions.len();
                    let mut registered = 0usize;
                    for tool in tools {
                        if let Some(&existing) = self.router.get(&tool.name) {
                            warn!(
                                tool = %tool.name,
                                first = %self.sessions[existing].name,
                                second = %session.name,
                                "MCP tool name collision; first registration wins"
                            );
                            continue;
                        }
                        self.router.insert(tool.name.clone(), index);
                        self.tool_defs.push(McpToolInfo {
                            name: tool.name,
                            description: tool.description,
                            input_schema: tool.input_schema,
                        });
                        registered += 1;
                    }
                    info!(server = %session.name, tools = registered, "connected to MCP server");
                    self.sessions.push(session);
                }
                Err(e) => {
                    warn!(server = %config.name, error = %e, "failed to connect to MCP server");
                }
            }
        }
    }

    /// Tool definitions across all connected servers, collision-free.
    pub fn tool_defs(&self) -> &[McpToolInfo] {
        &self.tool_defs
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.router.contains_key(name)
    }

    /// Call a tool by name. Never raises past here: errors come back as the
    /// text payload so the model can react in-turn.
    pub async fn call(&self, tool_name: &str, arguments: Value) -> (String, Option<String>) {
        let Some(&index) = self.router.get(tool_name) else {
            return (format!("MCP tool '{tool_name}' not found."), None);
        };
        let session = &self.sessions[index];
        match session.call_tool(tool_name, arguments).await {
            Ok(result) => result.normalize(),
            Err(e) => {
                warn!(tool = tool_name, error = %e, "MCP tool call failed");
                (format!("MCP tool '{tool_name}' error: {e}"), None)
            }
        }
    }

    /// Tear down all sessions, newest first (nested-acquisition order).
    pub async fn stop(&mut self) {
        for session in self.sessions.drain(..).rev() {
            info!(server = %session.name, "shutting down MCP server");
            session.transport.shutdown().await;
        }
        self.router.clear();
        self.tool_defs.clear();
    }
}
