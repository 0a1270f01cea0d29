use super::client::McpClient;
use super::tool::McpTool;
use crate::traits::{Tool, Transport, TransportFactory, TransportSpec};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// An MCP server running as a child process, with the tools it advertised.
pub struct StdioTransport {
    name: String,
    client: McpClient,
    instructions: Option<String>,
    tools: Vec<Arc<dyn Tool>>,
}

#[async_trait]
impl Transport for StdioTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.clone()
    }

    fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    async fn release(self: Box<Self>) -> anyhow::Result<()> {
        debug!(server = %self.name, "releasing MCP transport");
        self.client.shutdown().await;
        Ok(())
    }
}

pub struct StdioTransportFactory {
    startup_timeout: Duration,
}

impl StdioTransportFactory {
    pub fn new(startup_timeout: Duration) -> Self {
        Self { startup_timeout }
    }
}

impl Default for StdioTransportFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[async_trait]
impl TransportFactory for StdioTransportFactory {
    async fn acquire(&self, spec: &TransportSpec) -> anyhow::Result<Box<dyn Transport>> {
        let (client, handshake) = McpClient::connect(spec, self.startup_timeout).await?;

        let tools = handshake
            .tools
            .into_iter()
            .map(|info| Arc::new(McpTool::new(client.clone(), info)) as Arc<dyn Tool>)
            .collect();

        Ok(Box::new(StdioTransport {
            name: client.server().to_string(),
            client,
            instructions: handshake.instructions,
            tools,
        }))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    const NO_TOOLS_SERVER: &str = r#"
read line
echo '{"jsonrpc":"2.0","id":"req-1","result":{"protocolVersion":"2025-06-18","capabilities":{},"serverInfo":{"name":"bare","version":"1"}}}'
read line
read line
echo '{"jsonrpc":"2.0","id":"req-2","error":{"code":-32601,"message":"Method not found"}}'
read line
"#;

    #[tokio::test]
    async fn failed_discovery_yields_empty_tool_set() {
        let spec = TransportSpec::new("bare", "sh").with_args(["-c", NO_TOOLS_SERVER]);
        let transport = StdioTransportFactory::new(Duration::from_secs(10))
            .acquire(&spec)
            .await
            .unwrap();

        assert_eq!(transport.name(), "bare");
        assert!(transport.tools().is_empty());
        assert!(transport.instructions().is_none());
        transport.release().await.unwrap();
    }

    #[tokio::test]
    async fn released_tools_report_errors() {
        const SERVER: &str = r#"
read line
echo '{"jsonrpc":"2.0","id":"req-1","result":{"protocolVersion":"2025-06-18","capabilities":{}}}'
read line
read line
echo '{"jsonrpc":"2.0","id":"req-2","result":{"tools":[{"name":"search","inputSchema":{"type":"object"}}]}}'
read line
"#;
        let spec = TransportSpec::new("search", "sh").with_args(["-c", SERVER]);
        let transport = StdioTransportFactory::new(Duration::from_secs(10))
            .acquire(&spec)
            .await
            .unwrap();

        let tools = transport.tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name(), "search");
        assert!(tools[0].description().contains("search"));

        transport.release().await.unwrap();
        let result = tools[0].execute(json!({ "q": "rust" })).await.unwrap();
        assert!(!result.success);
        assert!(
            result
                .error
                .as_deref()
                .is_some_and(|e| e.contains("no longer running"))
        );
    }
}
