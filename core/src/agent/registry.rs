use crate::traits::{Tool, ToolResult, ToolSpec};
use std::collections::HashMap;
use std::sync::Arc;

/// Name to tool map, fixed at construction.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(vec![])
    }
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let mut map = HashMap::with_capacity(tools.len());
        let mut order = Vec::with_capacity(tools.len());

        for tool in tools {
            let name = tool.name().to_string();
            if map.contains_key(&name) {
                tracing::warn!(tool = %name, "duplicate tool name, keeping the first registration");
                continue;
            }
            order.push(name.clone());
            map.insert(name, tool);
        }

        Self { tools: map, order }
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.spec())
            .collect()
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub async fn execute(&self, name: &str, args: serde_json::Value) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            return ToolResult::error(format!("Tool '{}' not found", name));
        };

        match tool.execute(args).await {
            Ok(result) => result,
            Err(e) => ToolResult::error(format!("Execution failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct Echo(&'static str, &'static str);

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            self.1
        }

        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }

        async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
            match args.get("fail") {
                Some(_) => anyhow::bail!("boom"),
                None => Ok(ToolResult::success(format!("{}:{}", self.1, args))),
            }
        }
    }

    #[tokio::test]
    async fn first_registration_wins() {
        let registry = ToolRegistry::new(vec![
            Arc::new(Echo("echo", "first")),
            Arc::new(Echo("other", "second")),
            Arc::new(Echo("echo", "third")),
        ]);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), ["echo".to_string(), "other".to_string()]);
        assert_eq!(registry.specs()[0].description, "first");

        let result = registry.execute("echo", json!({})).await;
        assert_eq!(result.output, "first:{}");
    }

    #[tokio::test]
    async fn failures_become_error_results() {
        let registry = ToolRegistry::new(vec![Arc::new(Echo("echo", "e"))]);

        let missing = registry.execute("nope", json!({})).await;
        assert!(!missing.success);
        assert_eq!(missing.error.as_deref(), Some("Tool 'nope' not found"));

        let failed = registry.execute("echo", json!({ "fail": true })).await;
        assert_eq!(failed.error.as_deref(), Some("Execution failed: boom"));
        assert!(ToolRegistry::default().is_empty());
    }
}
