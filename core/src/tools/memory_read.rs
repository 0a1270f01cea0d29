use super::{extract_string_arg_opt, extract_usize_arg_opt};
use crate::traits::{Memory, Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub struct MemoryReadTool {
    memory: Arc<dyn Memory>,
}

impl MemoryReadTool {
    pub fn new(memory: Arc<dyn Memory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for MemoryReadTool {
    fn name(&self) -> &str {
        "memory_read"
    }

    fn description(&self) -> &str {
        "Retrieve memories from the memory store using a search query"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keywords or phrase to search for in memory"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default: 10)"
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let query = extract_string_arg_opt(&args, "query", "");
        let limit = extract_usize_arg_opt(&args, "limit", 10);

        match self.memory.recall(&query, limit, None).await {
            Ok(entries) if entries.is_empty() => Ok(ToolResult::success(
                "No memories found matching the query.",
            )),
            Ok(entries) => {
                let formatted: Vec<String> = entries
                    .iter()
                    .map(|e| {
                        let score = e
                            .score
                            .map(|s| format!(" (score: {:.2})", s))
                            .unwrap_or_default();
                        format!("- [{}] {}: {}{}", e.category, e.key, e.content, score)
                    })
                    .collect();
                Ok(ToolResult::success(format!(
                    "Found {} memories:\n{}",
                    entries.len(),
                    formatted.join("\n")
                )))
            }
            Err(e) => Ok(ToolResult::error(format!("Failed to read memory: {}", e))),
        }
    }
}
