//! MCP transports: stdio child process and HTTP+SSE.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::McpServerConfig;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum non-JSON stdout lines to skip before declaring a server broken.
/// Misconfigured servers sometimes write their logging to stdout.
const MAX_SKIP_LINES: usize = 1000;

#[async_trait]
pub trait McpTransport: Send + Sync {
    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, TransportError>;

    async fn send_notification(&self, method: &str) -> Result<(), TransportError>;

    fn is_alive(&self) -> bool;

    async fn shutdown(&self);
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(String),

    #[error("MCP server process has exited")]
    ProcessExited,

    #[error("timeout waiting for response")]
    Timeout,
}

// ── Stdio ─────────────────────────────────────────────────────────────────

/// Child-process transport: one newline-delimited JSON-RPC message per line.
/// The request lock serializes whole request/response cycles so concurrent
/// callers cannot read each other's responses.
pub struct StdioTransport {
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Child>,
    request_lock: Mutex<()>,
    next_id: AtomicU64,
    alive: AtomicBool,
}

impl StdioTransport {
    pub fn spawn(config: &McpServerConfig) -> Result<Self, TransportError> {
        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdin",
            ))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdout",
            ))
        })?;

        Ok(Self {
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            child: Mutex::new(child),
            request_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
        })
    }

    async fn write_line(&self, json: &str) -> Result<(), TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::ProcessExited);
        }
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn read_json_line(&self) -> Result<String, TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::ProcessExited);
        }
        let mut stdout = self.stdout.lock().await;
        let mut skipped = 0usize;
        loop {
            let mut line = String::new();
            let n = stdout.read_line(&mut line).await?;
            if n == 0 {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::ProcessExited);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('{') {
                return Ok(trimmed.to_string());
            }
            skipped += 1;
            if skipped >= MAX_SKIP_LINES {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "MCP server produced too many non-JSON lines on stdout",
                )));
            }
            debug!(line = %trimmed, "skipping non-JSON line from MCP server stdout");
        }
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, TransportError> {
        let _guard = self.request_lock.lock().await;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);
        debug!(id, method, "sending MCP request");
        self.write_line(&serde_json::to_string(&req)?).await?;

        // Servers may interleave notifications; skip anything whose id
        // does not match ours.
        let waited = tokio::time::timeout(REQUEST_TIMEOUT, async {
            loop {
                let line = self.read_json_line().await?;
                if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&line) {
                    if resp.id == id {
                        return Ok(resp);
                    }
                }
                debug!(line = %line, "skipping non-matching message from MCP server");
            }
        })
        .await;
        waited.map_err(|_| TransportError::Timeout)?
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        let notif = JsonRpcNotification::new(method);
        self.write_line(&serde_json::to_string(&notif)?).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        // Closing stdin signals the server to exit.
        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.shutdown().await {
                debug!(error = %e, "error closing MCP server stdin");
            }
        }
        let mut child = self.child.lock().await;
        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(Ok(status)) => debug!(?status, "MCP server process exited"),
            Ok(Err(e)) => warn!(error = %e, "error waiting for MCP server process"),
            Err(_) => {
                warn!("MCP server did not exit within timeout, killing");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill MCP server process");
                }
            }
        }
    }
}

// ── SSE ───────────────────────────────────────────────────────────────────

/// HTTP+SSE transport. The server's event stream first announces a POST
/// endpoint (`event: endpoint`), then carries JSON-RPC responses as
/// `event: message` payloads. Request cycles are serialized the same way
/// as stdio.
pub struct SseTransport {
    client: reqwest::Client,
    post_url: String,
    events: Mutex<SseReader>,
    request_lock: Mutex<()>,
    next_id: AtomicU64,
    alive: AtomicBool,
}

struct SseReader {
    response: reqwest::Response,
    buf: String,
}

impl SseReader {
    /// Next `(event, data)` pair from the stream.
    async fn next_event(&mut self) -> Result<(String, String), TransportError> {
        loop {
            if let Some(end) = self.buf.find("\n\n") {
                let block: String = self.buf.drain(..end + 2).collect();
                let mut event = String::from("message");
                let mut data = String::new();
                for line in block.lines() {
                    if let Some(v) = line.strip_prefix("event:") {
                        event = v.trim().to_string();
                    } else if let Some(v) = line.strip_prefix("data:") {
                        if !data.is_empty() {
                            data.push('\n');
                        }
                        data.push_str(v.trim_start());
                    }
                }
                if data.is_empty() {
                    continue;
                }
                return Ok((event, data));
            }
            match self.response.chunk().await {
                Ok(Some(chunk)) => self.buf.push_str(&String::from_utf8_lossy(&chunk)),
                Ok(None) => return Err(TransportError::ProcessExited),
                Err(e) => return Err(TransportError::Http(e.to_string())),
            }
        }
    }
}

impl SseTransport {
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::new();
        let response = client
            .get(url)
            .header("accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::Http(format!("SSE connect failed: {}", response.status())));
        }

        let mut reader = SseReader { response, buf: String::new() };
        // The first event names the endpoint we POST requests to.
        let post_url = tokio::time::timeout(REQUEST_TIMEOUT, async {
            loop {
                let (event, data) = reader.next_event().await?;
                if event == "endpoint" {
                    return Ok::<_, TransportError>(resolve_endpoint(url, &data));
                }
            }
        })
        .await
        .map_err(|_| TransportError::Timeout)??;

        debug!(%post_url, "SSE transport connected");
        Ok(Self {
            client,
            post_url,
            events: Mutex::new(reader),
            request_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
        })
    }

    async fn post(&self, body: &impl serde::Serialize) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.post_url)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::Http(format!("POST failed: {}", response.status())));
        }
        Ok(())
    }
}

/// Resolve a possibly-relative endpoint path against the SSE URL's origin.
fn resolve_endpoint(sse_url: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }
    let origin = sse_url
        .find("://")
        .and_then(|scheme_end| {
            sse_url[scheme_end + 3..]
                .find('/')
                .map(|path_start| &sse_url[..scheme_end + 3 + path_start])
        })
        .unwrap_or(sse_url);
    format!("{}{}", origin, endpoint)
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::ProcessExited);
        }
        let _guard = self.request_lock.lock().await;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);
        debug!(id, method, "sending MCP request over SSE");
        self.post(&req).await?;

        let mut events = self.events.lock().await;
        let waited = tokio::time::timeout(REQUEST_TIMEOUT, async {
            loop {
                let (_event, data) = events.next_event().await?;
                if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&data) {
                    if resp.id == id {
                        return Ok(resp);
                    }
                }
            }
        })
        .await;
        match waited {
            Ok(inner) => inner,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        self.post(&JsonRpcNotification::new(method)).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_endpoint_keeps_absolute_urls() {
        assert_eq!(
            resolve_endpoint("http://localhost:3000/sse", "http://localhost:3000/messages?x=1"),
            "http://localhost:3000/messages?x=1"
        );
    }

    #[test]
    fn resolve_endpoint_joins_relative_paths_to_origin() {
        assert_eq!(
            resolve_endpoint("http://localhost:3000/sse", "/messages?session=abc"),
            "http://localhost:3000/messages?session=abc"
        );
        assert_eq!(
            resolve_endpoint("https://mcp.example.com/api/sse", "/rpc"),
            "https://mcp.example.com/rpc"
        );
    }

    #[tokio::test]
    async fn stdio_request_response_with_cat_like_server() {
        // A tiny shell server that answers one tools/list request.
        let config = McpServerConfig {
            name: "fake".into(),
            transport: crate::config::McpTransportKind::Stdio,
            command: "sh".into(),
            args: vec![
                "-c".into(),
                // Read a line, ignore it, emit a fixed response with id 1.
                r#"read line; echo '{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}'"#.into(),
            ],
            env: Default::default(),
            url: String::new(),
        };
        let transport = StdioTransport::spawn(&config).unwrap();
        let resp = transport.send_request("tools/list", None).await.unwrap();
        assert_eq!(resp.id, 1);
        assert!(resp.error.is_none());
        transport.shutdown().await;
        assert!(!transport.is_alive());
    }

    #[tokio::test]
    async fn stdio_skips_log_noise_before_json() {
        let config = McpServerConfig {
            name: "noisy".into(),
            transport: crate::config::McpTransportKind::Stdio,
            command: "sh".into(),
            args: vec![
                "-c".into(),
                r#"read line; echo 'starting up...'; echo '{"jsonrpc":"2.0","id":1,"result":{}}'"#
                    .into(),
            ],
            env: Default::default(),
            url: String::new(),
        };
        let transport = StdioTransport::spawn(&config).unwrap();
        let resp = transport.send_request("initialize", None).await.unwrap();
        assert_eq!(resp.id, 1);
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn stdio_dead_server_reports_exit() {
        let config = McpServerConfig {
            name: "dead".into(),
            transport: crate::config::McpTransportKind::Stdio,
            command: "true".into(),
            args: vec![],
            env: Default::default(),
            url: String::new(),
        };
        let transport = StdioTransport::spawn(&config).unwrap();
        let err = transport.send_request("initialize", None).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::ProcessExited | TransportError::Io(_)
        ));
        assert!(!transport.is_alive());
    }
}
