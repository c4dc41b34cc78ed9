//! MCP (Model Context Protocol) client.
//!
//! Connects to external MCP servers and exposes their tools to the agent.
//! Body-related tools (camera, voice, mobility) stay built in; MCP covers
//! everything else. Supported transports: stdio (child process, default)
//! and SSE (HTTP endpoint). Servers that fail to connect are skipped, never
//! fatal.

mod config;
mod manager;
mod protocol;
mod transport;

pub use config::{load_servers, McpServerConfig, McpTransportKind};
pub use manager::{McpManager, McpToolInfo};
pub use protocol::{McpToolDef, ToolCallResult};
pub use transport::TransportError;

/// Errors specific to MCP operations. Dispatch callers convert these to
/// plain result text for the model; they never propagate past the registry.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP tool not found: {0}")]
    ToolNotFound(String),

    #[error("MCP server not connected: {0}")]
    ServerNotConnected(String),
}
