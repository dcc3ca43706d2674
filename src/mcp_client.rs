//! MCP - Model Context Protocol client for the preferred action service.
//!
//! The service is an MCP server spoken to over stdio JSON-RPC. It offers the
//! high-level capabilities (`search_web`, `automate_page`, `fetch_page`,
//! `play_first_result`) that the tiered executor tries before driving the
//! browser locally.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

// =====================================================
// SERVICE CONTRACT
// =====================================================

/// `{success, result|error}` as reported by the service for one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceResponse {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait ActionService: Send + Sync {
    /// Idempotent: later calls after a successful start are no-ops.
    async fn start(&self) -> Result<()>;
    async fn execute_action(&self, name: &str, params: Value) -> Result<ServiceResponse>;
}

// =====================================================
// CONFIG
// =====================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServer {
    #[serde(default)]
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

impl McpServer {
    fn default_definition() -> Self {
        Self {
            name: "steer-actions".to_string(),
            command: "npx".to_string(),
            args: vec!["-y".to_string(), "@steer/action-server".to_string()],
            env: HashMap::new(),
            enabled: false,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }

    /// Reads the definition, writing a disabled default first if none exists.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let default = Self::default_definition();
            std::fs::write(path, serde_json::to_string_pretty(&default)?)?;
            info!("📝 [MCP] Created default config: {}", path.display());
            return Ok(default);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut server: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid action service config {}", path.display()))?;
        if server.name.is_empty() {
            server.name = "action-service".to_string();
        }
        Ok(server)
    }
}

// =====================================================
// JSON-RPC MESSAGE TYPES
// =====================================================

#[derive(Debug, Clone, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

// =====================================================
// MCP CLIENT
// =====================================================

struct Connection {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    request_id: u64,
    tools: Vec<String>,
}

impl Connection {
    async fn write(&mut self, message: &JsonRpcRequest<'_>) -> Result<()> {
        let line = serde_json::to_string(message)?;
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value> {
        self.request_id += 1;
        let id = self.request_id;
        self.write(&JsonRpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        })
        .await?;

        // Servers may interleave notifications and log lines; skip to our id.
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or_else(|| anyhow!("MCP server closed its stdout"))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let response: JsonRpcResponse = match serde_json::from_str(trimmed) {
                Ok(r) => r,
                Err(_) => {
                    debug!("[MCP] ignoring non-JSON line: {}", trimmed);
                    continue;
                }
            };
            if response.id != Some(id) {
                continue;
            }
            if let Some(error) = response.error {
                return Err(anyhow!("MCP error {}: {}", error.code, error.message));
            }
            return Ok(response.result.unwrap_or(Value::Null));
        }
    }

    async fn notify(&mut self, method: &str) -> Result<()> {
        self.write(&JsonRpcRequest {
            jsonrpc: "2.0",
            id: None,
            method,
            params: None,
        })
        .await
    }
}

/// Stdio MCP client. The child process is spawned lazily by `start()` and
/// shared by every later call.
pub struct McpActionService {
    server: McpServer,
    conn: Mutex<Option<Connection>>,
}

impl McpActionService {
    pub fn new(server: McpServer) -> Self {
        Self {
            server,
            conn: Mutex::new(None),
        }
    }

    pub fn from_config_file(path: &Path) -> Result<Self> {
        Ok(Self::new(McpServer::load_or_create(path)?))
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms.max(1))
    }

    async fn connect(&self) -> Result<Connection> {
        info!("🔌 [MCP] Connecting to: {}", self.server.name);

        let mut cmd = Command::new(&self.server.command);
        cmd.args(&self.server.args)
            .envs(&self.server.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to start MCP server: {}", self.server.command))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("No stdin available"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("No stdout available"))?;

        let mut conn = Connection {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            request_id: 0,
            tools: Vec::new(),
        };

        let params = json!({
            "protocolVersion": "2024-11-05",
            "capabilities": { "tools": {} },
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        tokio::time::timeout(self.request_timeout(), conn.request("initialize", Some(params)))
            .await
            .map_err(|_| anyhow!("MCP initialize timed out"))??;
        conn.notify("notifications/initialized").await?;

        match tokio::time::timeout(self.request_timeout(), conn.request("tools/list", None)).await {
            Ok(Ok(result)) => conn.tools = tool_names(&result),
            Ok(Err(e)) => warn!("[MCP] tools/list failed: {}", e),
            Err(_) => warn!("[MCP] tools/list timed out"),
        }

        info!("✅ [MCP] Connected: {} tools", conn.tools.len());
        Ok(conn)
    }
}

#[async_trait]
impl ActionService for McpActionService {
    async fn start(&self) -> Result<()> {
        if !self.server.enabled {
            return Err(anyhow!("action service '{}' is disabled", self.server.name));
        }
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_mut() {
            match conn.child.try_wait() {
                Ok(None) => return Ok(()),
                _ => warn!("[MCP] server process exited, reconnecting"),
            }
        }
        *guard = Some(self.connect().await?);
        Ok(())
    }

    async fn execute_action(&self, name: &str, params: Value) -> Result<ServiceResponse> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| anyhow!("MCP server not connected"))?;

        if !conn.tools.is_empty() && !conn.tools.iter().any(|t| t == name) {
            return Ok(ServiceResponse::err(format!("tool '{}' not offered by server", name)));
        }

        info!("🔧 [MCP] Calling tool: {}", name);
        let call = conn.request("tools/call", Some(json!({ "name": name, "arguments": params })));
        let result = match tokio::time::timeout(self.request_timeout(), call).await {
            Ok(result) => result?,
            Err(_) => {
                // A timed-out request leaves an unread reply on the pipe; drop the connection.
                *guard = None;
                return Err(anyhow!("MCP call '{}' timed out", name));
            }
        };
        Ok(tool_result_to_response(&result))
    }
}

fn tool_names(list_result: &Value) -> Vec<String> {
    list_result["tools"]
        .as_array()
        .map(|tools| {
            tools
                .iter()
                .filter_map(|t| t["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Maps an MCP `tools/call` result onto `{success, result|error}`. Text content
/// that parses as JSON is returned structured, and a `success: false` inside it
/// counts as failure.
fn tool_result_to_response(result: &Value) -> ServiceResponse {
    let text = result["content"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|c| c["text"].as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    if result["isError"].as_bool() == Some(true) {
        let message = if text.is_empty() { "tool reported an error".to_string() } else { text };
        return ServiceResponse::err(message);
    }

    let payload = if let Some(structured) = result.get("structuredContent") {
        structured.clone()
    } else {
        serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text))
    };

    if payload.get("success").and_then(Value::as_bool) == Some(false) {
        let message = payload["error"]
            .as_str()
            .unwrap_or("service reported failure")
            .to_string();
        return ServiceResponse::err(message);
    }
    ServiceResponse::ok(payload)
}

// =====================================================
// TESTS
// =====================================================
