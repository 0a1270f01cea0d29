use super::error::McpError;
use crate::traits::TransportSpec;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tracing::{debug, info, warn};

pub const PROTOCOL_VERSION: &str = "2025-06-18";
const MAX_TOOL_PAGES: usize = 32;

type Responder = oneshot::Sender<Result<Value, McpError>>;

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq)]
pub struct McpToolInfo {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// What the server told us while connecting.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub server_name: Option<String>,
    pub instructions: Option<String>,
    pub tools: Vec<McpToolInfo>,
}

/// JSON-RPC client speaking MCP over the stdio of a child process.
#[derive(Clone)]
pub struct McpClient {
    inner: Arc<McpClientInner>,
}

struct McpClientInner {
    server: String,
    child: AsyncMutex<Option<Child>>,
    writer: AsyncMutex<Option<BufWriter<ChildStdin>>>,
    pending: AsyncMutex<HashMap<String, Responder>>,
    id_counter: AtomicU64,
    closed: AtomicBool,
}

impl McpClient {
    /// Spawns the server, runs the `initialize` handshake and discovers its
    /// tools. Each handshake request must answer within `startup_timeout`.
    ///
    /// A failed `tools/list` is not an error: the handshake carries an empty
    /// tool set instead.
    pub async fn connect(
        spec: &TransportSpec,
        startup_timeout: Duration,
    ) -> Result<(Self, Handshake), McpError> {
        let client = Self::spawn(spec)?;

        match client.handshake(startup_timeout).await {
            Ok(handshake) => Ok((client, handshake)),
            Err(err) => {
                client.shutdown().await;
                Err(err)
            }
        }
    }

    fn spawn(spec: &TransportSpec) -> Result<Self, McpError> {
        let server = if spec.name.is_empty() {
            spec.command.clone()
        } else {
            spec.name.clone()
        };

        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &spec.workdir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| McpError::Spawn {
            server: server.clone(),
            source,
        })?;

        let transport_error = |message: &str| McpError::Transport {
            server: server.clone(),
            message: message.to_string(),
        };
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| transport_error("failed to capture server stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| transport_error("failed to capture server stdout"))?;

        debug!(server = %server, command = %spec.command, "spawned MCP server");

        let inner = Arc::new(McpClientInner {
            server,
            child: AsyncMutex::new(Some(child)),
            writer: AsyncMutex::new(Some(BufWriter::new(stdin))),
            pending: AsyncMutex::new(HashMap::new()),
            id_counter: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        });

        let reader = Arc::clone(&inner);
        tokio::spawn(async move {
            reader.reader_loop(stdout).await;
        });

        Ok(Self { inner })
    }

    async fn handshake(&self, timeout: Duration) -> Result<Handshake, McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {}
        });
        let init = self
            .inner
            .send_request("initialize", params, Some(timeout))
            .await?;

        let mut handshake = Handshake {
            server_name: init
                .pointer("/serverInfo/name")
                .and_then(Value::as_str)
                .map(str::to_string),
            instructions: init
                .get("instructions")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string),
            tools: vec![],
        };

        self.inner
            .send_notification("notifications/initialized", json!({}))
            .await?;

        match self.list_tools(Some(timeout)).await {
            Ok(tools) => handshake.tools = tools,
            Err(err) => warn!(
                server = %self.inner.server,
                %err,
                "tool discovery failed; continuing without tools"
            ),
        }

        info!(
            server = %self.inner.server,
            tools = handshake.tools.len(),
            "MCP server ready"
        );
        Ok(handshake)
    }

    pub fn server(&self) -> &str {
        &self.inner.server
    }

    pub async fn list_tools(&self, timeout: Option<Duration>) -> Result<Vec<McpToolInfo>, McpError> {
        let mut tools = vec![];
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = match &cursor {
                Some(cursor) => json!({ "cursor": cursor }),
                None => json!({}),
            };
            let result = self
                .inner
                .send_request("tools/list", params, timeout)
                .await?;
            let (page, next) = parse_tool_list(&result);
            tools.extend(page);
            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(tools)
    }

    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, McpError> {
        let params = json!({
            "name": tool,
            "arguments": match arguments {
                Value::Null => Value::Object(Default::default()),
                other => other,
            }
        });
        self.inner.send_request("tools/call", params, None).await
    }

    /// Closes stdin, kills and reaps the child, and fails every request still
    /// waiting for an answer. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.inner.reset().await;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

/// Extracts the usable tools from a `tools/list` result plus the next page
/// cursor. Entries without a name are skipped.
pub fn parse_tool_list(result: &Value) -> (Vec<McpToolInfo>, Option<String>) {
    let tools = result
        .get("tools")
        .and_then(Value::as_array)
        .map(|array| {
            array
                .iter()
                .filter_map(|tool| {
                    let name = tool.get("name").and_then(Value::as_str)?.trim();
                    if name.is_empty() {
                        return None;
                    }
                    Some(McpToolInfo {
                        name: name.to_string(),
                        description: tool
                            .get("description")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        input_schema: tool
                            .get("inputSchema")
                            .cloned()
                            .unwrap_or_else(|| json!({ "type": "object" })),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let cursor = result
        .get("nextCursor")
        .and_then(Value::as_str)
        .filter(|cursor| !cursor.is_empty())
        .map(str::to_string);

    (tools, cursor)
}

impl McpClientInner {
    async fn reader_loop(self: Arc<Self>, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(raw)) = lines.next_line().await {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('\u{1b}') {
                debug!(
                    server = %self.server,
                    line = trimmed,
                    "skipping non-JSON ANSI log line from MCP server"
                );
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => {
                    if let Err(err) = self.process_inbound_message(value).await {
                        warn!(server = %self.server, %err, "failed to process message from MCP server");
                    }
                }
                Err(source) => {
                    warn!(
                        server = %self.server,
                        line = trimmed,
                        %source,
                        "received invalid JSON from MCP server"
                    );
                }
            }
        }

        debug!(server = %self.server, "MCP server stdout closed");
        self.reset().await;
    }

    async fn process_inbound_message(&self, value: Value) -> Result<(), McpError> {
        match (value.get("id").cloned(), value.get("method").is_some()) {
            (Some(id), true) => self.handle_server_request(id, &value).await,
            (Some(id), false) => {
                self.handle_response(&id, value).await;
                Ok(())
            }
            (None, true) => {
                self.handle_notification(&value);
                Ok(())
            }
            (None, false) => Ok(()),
        }
    }

    async fn handle_response(&self, id: &Value, value: Value) {
        let Some(key) = response_key(id) else {
            return;
        };

        let responder = self.pending.lock().await.remove(&key);
        let Some(sender) = responder else {
            debug!(server = %self.server, response_id = key, "received response for unknown request");
            return;
        };

        let outcome = match value.get("error") {
            Some(error) => Err(McpError::Rpc {
                server: self.server.clone(),
                code: error.get("code").and_then(Value::as_i64).unwrap_or(-32000),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            }),
            None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
        };
        let _ = sender.send(outcome);
    }

    async fn handle_server_request(&self, id: Value, value: &Value) -> Result<(), McpError> {
        let method = value
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default();
        match method {
            "ping" => self.send_response(id, json!({})).await,
            other => {
                warn!(server = %self.server, method = other, "server sent unsupported request");
                let error = json!({
                    "code": -32601,
                    "message": format!("client does not implement method '{other}'"),
                });
                self.send_error(id, error).await
            }
        }
    }

    fn handle_notification(&self, value: &Value) {
        let Some(method) = value.get("method").and_then(Value::as_str) else {
            return;
        };
        if method == "notifications/tools/list_changed" {
            info!(
                server = %self.server,
                "server reported a changed tool list; keeping the session's tool set"
            );
        } else {
            debug!(server = %self.server, method, "received notification from server");
        }
    }

    async fn send_request(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, McpError> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        if self.closed.load(Ordering::SeqCst) {
            self.pending.lock().await.remove(&id);
            return Err(self.terminated());
        }

        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        debug!(server = %self.server, method, id = %id, "sending MCP request");
        if let Err(err) = self.write_message(&payload).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        let answer = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(answer) => answer,
                Err(_) => {
                    self.pending.lock().await.remove(&id);
                    return Err(McpError::Timeout {
                        server: self.server.clone(),
                        method: method.to_string(),
                        secs: limit.as_secs(),
                    });
                }
            },
            None => rx.await,
        };

        answer.unwrap_or_else(|_| {
            Err(McpError::Cancelled {
                server: self.server.clone(),
            })
        })
    }

    async fn send_notification(&self, method: &str, params: Value) -> Result<(), McpError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });
        self.write_message(&payload).await
    }

    async fn send_response(&self, id: Value, result: Value) -> Result<(), McpError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": result
        });
        self.write_message(&payload).await
    }

    async fn send_error(&self, id: Value, error: Value) -> Result<(), McpError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": error
        });
        self.write_message(&payload).await
    }

    async fn write_message(&self, message: &Value) -> Result<(), McpError> {
        let mut encoded = serde_json::to_vec(message).map_err(|source| McpError::InvalidJson {
            server: self.server.clone(),
            source,
        })?;
        encoded.push(b'\n');

        let mut writer = self.writer.lock().await;
        let stream = writer.as_mut().ok_or_else(|| self.terminated())?;
        let io_error = |source: std::io::Error| McpError::Transport {
            server: self.server.clone(),
            message: source.to_string(),
        };
        stream.write_all(&encoded).await.map_err(io_error)?;
        stream.flush().await.map_err(io_error)?;
        Ok(())
    }

    async fn reset(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.writer.lock().await.take();

        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            if let Err(err) = child.kill().await {
                debug!(
                    server = %self.server,
                    %err,
                    "failed to kill MCP server process (may have already exited)"
                );
            }
            let _ = child.wait().await;
            debug!(server = %self.server, "MCP server process stopped");
        }

        let mut pending = self.pending.lock().await;
        for (_, sender) in pending.drain() {
            let _ = sender.send(Err(self.terminated()));
        }
    }

    fn next_id(&self) -> String {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        format!("req-{id}")
    }

    fn terminated(&self) -> McpError {
        McpError::Terminated {
            server: self.server.clone(),
        }
    }
}

fn response_key(id: &Value) -> Option<String> {
    match id {
        Value::String(value) => Some(value.clone()),
        Value::Number(num) => Some(num.to_string()),
        _ => None,
    }
}
