use super::extract_string_arg;
use crate::agent::Agent;
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

/// Exposes a member agent to a team agent as `ask_<member>`.
pub struct AgentTool {
    agent: Arc<Agent>,
    name: String,
    description: String,
}

impl AgentTool {
    pub fn new(agent: Arc<Agent>) -> Self {
        let slug: String = agent
            .name()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        let description = match agent.role() {
            Some(role) => format!("Delegate a task to the {} agent. Role: {}", agent.name(), role),
            None => format!("Delegate a task to the {} agent.", agent.name()),
        };

        Self {
            name: format!("ask_{}", slug.trim_matches('_')),
            description,
            agent,
        }
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "The task or question for this member, with any context it needs"
                }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let task = extract_string_arg(&args, "task")?;
        tracing::debug!(member = %self.agent.name(), "delegating task");

        match self.agent.respond_text(&task).await {
            Ok(answer) => Ok(ToolResult::success(answer)),
            Err(e) => Ok(ToolResult::error(format!(
                "{} agent failed: {:#}",
                self.agent.name(),
                e
            ))),
        }
    }
}
