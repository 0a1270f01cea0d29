use super::client::{McpClient, McpToolInfo};
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::Value;

/// A tool exposed by an MCP server, invoked through `tools/call`.
pub struct McpTool {
    client: McpClient,
    name: String,
    description: String,
    input_schema: Value,
}

impl McpTool {
    pub fn new(client: McpClient, info: McpToolInfo) -> Self {
        let description = info
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("Tool '{}' provided by {}", info.name, client.server()));
        Self {
            client,
            name: info.name,
            description,
            input_schema: info.input_schema,
        }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.input_schema.clone()
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        if self.client.is_closed() {
            return Ok(ToolResult::error(format!(
                "MCP server '{}' is no longer running",
                self.client.server()
            )));
        }
        match self.client.call_tool(&self.name, args).await {
            Ok(result) => Ok(tool_result_from_call(&result)),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}

/// Flattens a `tools/call` result into a single text payload.
pub fn tool_result_from_call(result: &Value) -> ToolResult {
    let mut parts: Vec<String> = vec![];

    for item in result
        .get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        match item.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = item.get("text").and_then(Value::as_str) {
                    parts.push(text.to_string());
                }
            }
            Some("resource") => {
                let resource = item.get("resource");
                let text = resource
                    .and_then(|r| r.get("text"))
                    .and_then(Value::as_str)
                    .or_else(|| resource.and_then(|r| r.get("uri")).and_then(Value::as_str));
                if let Some(text) = text {
                    parts.push(text.to_string());
                }
            }
            Some(kind @ ("image" | "audio")) => {
                let mime = item
                    .get("mimeType")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                parts.push(format!("[{kind} content: {mime}]"));
            }
            _ => parts.push(item.to_string()),
        }
    }

    if parts.is_empty()
        && let Some(structured) = result.get("structuredContent")
    {
        parts.push(structured.to_string());
    }

    let text = parts.join("\n");
    if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        ToolResult::error(if text.is_empty() {
            "tool reported an error".to_string()
        } else {
            text
        })
    } else {
        ToolResult::success(text)
    }
}
