use serde_json::Value;

pub mod agent_tool;
pub mod company_data;
pub mod knowledge_search;
pub mod memory_read;
pub mod memory_write;
pub mod stock_price;
pub mod web_search;

pub use agent_tool::AgentTool;
pub use company_data::{CompanyNewsTool, QuoteSummaryTool};
pub use knowledge_search::KnowledgeSearchTool;
pub use memory_read::MemoryReadTool;
pub use memory_write::MemoryWriteTool;
pub use stock_price::StockPriceTool;
pub use web_search::WebSearchTool;

pub fn extract_string_arg(args: &Value, key: &str) -> anyhow::Result<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Missing '{}' parameter", key))
        .map(|s| s.to_string())
}

pub fn extract_string_arg_opt(args: &Value, key: &str, default: &str) -> String {
    args.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or(default)
        .to_string()
}

pub fn extract_usize_arg_opt(args: &Value, key: &str, default: usize) -> usize {
    args.get(key)
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap_or(default)
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("Mozilla/5.0 (compatible; conduit/", env!("CARGO_PKG_VERSION"), ")"))
        .timeout(std::time::Duration::from_secs(30))
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()
        .unwrap_or_default()
}
