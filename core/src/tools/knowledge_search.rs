use super::{extract_string_arg, extract_usize_arg_opt};
use crate::knowledge::KnowledgeBase;
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

pub struct KnowledgeSearchTool {
    knowledge: Arc<KnowledgeBase>,
}

impl KnowledgeSearchTool {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self { knowledge }
    }
}

#[async_trait]
impl Tool for KnowledgeSearchTool {
    fn name(&self) -> &str {
        "search_knowledge_base"
    }

    fn description(&self) -> &str {
        "Search the local knowledge base for passages relevant to a query. Prefer this over general knowledge when it has an answer."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look for"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of passages to return (default: 3)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let query = extract_string_arg(&args, "query")?;
        let limit = extract_usize_arg_opt(&args, "limit", 3).max(1);

        let hits = self.knowledge.search(&query, limit);
        if hits.is_empty() {
            return Ok(ToolResult::success(
                "No relevant passages found in the knowledge base.",
            ));
        }

        let passages: Vec<String> = hits
            .iter()
            .map(|(score, chunk)| {
                format!(
                    "[{}#{} score {:.2}]\n{}",
                    chunk.source.display(),
                    chunk.index,
                    score,
                    chunk.text
                )
            })
            .collect();
        Ok(ToolResult::success(passages.join("\n\n---\n\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[tokio::test]
    async fn returns_ranked_passages() {
        let mut base = KnowledgeBase::new();
        base.add_document(Path::new("thai.md"), "Green curry paste uses green chilies.");
        base.add_document(Path::new("pasta.md"), "Carbonara uses eggs and pecorino.");
        let tool = KnowledgeSearchTool::new(Arc::new(base));

        let result = tool.execute(json!({ "query": "green curry" })).await.unwrap();
        assert!(result.success);
        assert!(result.output.contains("thai.md#0"));
        assert!(!result.output.contains("pasta.md"));

        let empty = tool.execute(json!({ "query": "sushi" })).await.unwrap();
        assert!(empty.output.starts_with("No relevant passages"));
    }
}
