//! Tool registry: one schema list and one dispatch entry point.
//!
//! The turn engine never learns whether a tool is built in or served by an
//! external MCP process. Dispatch never raises: an unknown tool or a failed
//! dependency comes back as a short result string the model can react to.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::warn;

use familiar_config::{AgentConfig, Paths};
use familiar_llm::{ToolDef, ToolOutput};
use familiar_mcp::McpManager;
use familiar_memory::ObservationStore;

pub mod camera;
pub mod coding;
pub mod memory_tools;
pub mod mobility;
pub mod tom;
pub mod voice;

pub use camera::CameraTool;
pub use coding::CodingTool;
pub use memory_tools::MemoryTools;
pub use mobility::MobilityTool;
pub use tom::TomTool;
pub use voice::VoiceTool;

/// A built-in tool provider. One provider may expose several tools (the
/// camera owns both `see` and `look`).
#[async_trait]
pub trait Tool: Send + Sync {
    fn defs(&self) -> Vec<ToolDef>;

    fn handles(&self, name: &str) -> bool;

    /// Run one call. Errors are allowed here; the registry converts them
    /// into `"Tool error: <msg>"` results.
    async fn call(&self, name: &str, input: &Value) -> anyhow::Result<ToolOutput>;
}

/// Aggregates built-in tools and MCP sessions behind one interface.
pub struct ToolRegistry {
    builtins: Vec<Box<dyn Tool>>,
    mcp: RwLock<McpManager>,
}

impl ToolRegistry {
    /// Wire up every tool the configuration enables. Devices with missing
    /// credentials are simply not advertised.
    pub fn from_config(config: &AgentConfig, paths: &Paths, memory: ObservationStore) -> Self {
        let mut builtins: Vec<Box<dyn Tool>> = Vec::new();
        if config.camera.enabled() {
            builtins.push(Box::new(CameraTool::new(config.camera.clone(), paths.capture_dir.clone())));
        }
        if config.mobility.enabled() {
            builtins.push(Box::new(MobilityTool::new(config.mobility.clone())));
        }
        if config.tts.enabled() {
            builtins.push(Box::new(VoiceTool::new(config.tts.clone())));
        }
        builtins.push(Box::new(MemoryTools::new(memory.clone())));
        builtins.push(Box::new(TomTool::new(memory, config.companion_name.clone())));
        builtins.push(Box::new(CodingTool::new(config.coding.clone())));

        Self {
            builtins,
            mcp: RwLock::new(McpManager::new(&paths.mcp_config)),
        }
    }

    /// Registry with an explicit tool list, for tests and special setups.
    pub fn with_tools(builtins: Vec<Box<dyn Tool>>, mcp: McpManager) -> Self {
        Self { builtins, mcp: RwLock::new(mcp) }
    }

    /// Connect MCP servers. Idempotent; the first turn pays the cost.
    pub async fn ensure_mcp_started(&self) {
        let mut mcp = self.mcp.write().await;
        mcp.start().await;
    }

    /// Advertised tool definitions: built-ins first, then MCP tools, with
    /// the first definition of a name winning.
    pub async fn tool_defs(&self) -> Vec<ToolDef> {
        let mut defs: Vec<ToolDef> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for tool in &self.builtins {
            for def in tool.defs() {
                if seen.insert(def.name.clone()) {
                    defs.push(def);
                } else {
                    warn!(tool = %def.name, "duplicate tool definition dropped");
                }
            }
        }
        let mcp = self.mcp.read().await;
        for info in mcp.tool_defs() {
            if seen.insert(info.name.clone()) {
                defs.push(ToolDef {
                    name: info.name.clone(),
                    description: info.description.clone(),
                    input_schema: info.input_schema.clone(),
                });
            } else {
                warn!(tool = %info.name, "MCP tool shadowed by built-in, dropped");
            }
        }
        defs
    }

    /// Whether any provider (built-in or MCP) serves this tool name.
    pub async fn has_tool(&self, name: &str) -> bool {
        if self.builtins.iter().any(|t| t.handles(name)) {
            return true;
        }
        self.mcp.read().await.has_tool(name)
    }

    /// Route one call. Built-ins take precedence; anything else goes to
    /// MCP. Never raises.
    pub async fn dispatch(&self, name: &str, input: &Value) -> ToolOutput {
        for tool in &self.builtins {
            if tool.handles(name) {
                return match tool.call(name, input).await {
                    Ok(output) => output,
                    Err(e) => {
                        warn!(tool = name, error = %e, "tool failed");
                        ToolOutput::text(format!("Tool error: {e}"))
                    }
                };
            }
        }

        let mcp = self.mcp.read().await;
        if mcp.has_tool(name) {
            let (text, image) = mcp.call(name, input.clone()).await;
            return ToolOutput { text, image };
        }
        ToolOutput::text(format!("Tool '{name}' not available (check configuration)."))
    }

    /// Close external sessions. Called once at shutdown.
    pub async fn close(&self) {
        let mut mcp = self.mcp.write().await;
        mcp.stop().await;
    }
}
