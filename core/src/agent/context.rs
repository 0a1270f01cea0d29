use crate::traits::{ChatMessage, Memory, ToolSpec};
use std::fmt::Write;
use std::sync::Arc;

const MEMORY_MIN_RELEVANCE_SCORE: f64 = 0.4;
const MEMORY_RECALL_LIMIT: usize = 5;

/// Assembles the system prompt for one turn.
#[derive(Default)]
pub struct ContextBuilder {
    pub description: Option<String>,
    pub instructions: Vec<String>,
    pub transport_instructions: Option<String>,
    pub markdown: bool,
    pub add_datetime: bool,
    pub memory: Option<Arc<dyn Memory>>,
    pub tool_specs: Vec<ToolSpec>,
}

impl ContextBuilder {
    pub fn with_instructions(mut self, instructions: Vec<String>) -> Self {
        self.instructions = instructions;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_transport_instructions(mut self, instructions: Option<String>) -> Self {
        self.transport_instructions = instructions.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_markdown(mut self, markdown: bool) -> Self {
        self.markdown = markdown;
        self
    }

    pub fn with_datetime(mut self, add_datetime: bool) -> Self {
        self.add_datetime = add_datetime;
        self
    }

    pub fn with_memory(mut self, memory: Option<Arc<dyn Memory>>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_tool_specs(mut self, tool_specs: Vec<ToolSpec>) -> Self {
        self.tool_specs = tool_specs;
        self
    }

    pub async fn build_system_prompt(&self, user_message: &str) -> String {
        let mut parts = vec![];

        if let Some(description) = &self.description {
            parts.push(description.trim().to_string());
        }

        if !self.instructions.is_empty() {
            let mut section = String::from("## Instructions\n");
            for (i, instruction) in self.instructions.iter().enumerate() {
                let _ = write!(section, "\n{}. {}", i + 1, instruction.trim());
            }
            parts.push(section);
        }

        if let Some(server) = &self.transport_instructions {
            parts.push(format!("## Tool Server Notes\n\n{}", server.trim()));
        }

        if self.markdown {
            parts.push("Use markdown to format your answers.".to_string());
        }

        if self.add_datetime {
            let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M (%A)");
            parts.push(format!("## Current Time\n\n{}", timestamp));
        }

        if let Some(memory_context) = self.get_memory_context(user_message).await {
            parts.push(memory_context);
        }

        if !self.tool_specs.is_empty() {
            parts.push(self.get_tool_instructions());
        }

        parts.join("\n\n---\n\n")
    }

    fn get_tool_instructions(&self) -> String {
        let mut instructions = String::new();
        instructions.push_str("## Tool Use Protocol\n\n");
        instructions.push_str("If native tool calling is unavailable, wrap a JSON object in <tool_call> tags:\n\n");
        instructions.push_str("```\n<tool_call>\n{\"name\": \"tool_name\", \"arguments\": {\"param\": \"value\"}}\n</tool_call>\n```\n\n");
        instructions.push_str("You may use multiple tool calls in a single response. ");
        instructions
            .push_str("Continue reasoning with the results until you can give a final answer.\n\n");
        instructions.push_str("### Available Tools\n\n");

        for tool in &self.tool_specs {
            let _ = writeln!(
                instructions,
                "**{}**: {}\nParameters: `{}`\n",
                tool.name, tool.description, tool.parameters_schema
            );
        }

        instructions
    }

    async fn get_memory_context(&self, user_message: &str) -> Option<String> {
        let memory = self.memory.as_ref()?;

        let entries = match memory.recall(user_message, MEMORY_RECALL_LIMIT, None).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Memory recall failed: {}", e);
                return None;
            }
        };

        let relevant: Vec<String> = entries
            .iter()
            .filter(|e| e.score.is_none_or(|s| s >= MEMORY_MIN_RELEVANCE_SCORE))
            .filter(|e| !e.content.is_empty())
            .map(|e| format!("- {}", e.content))
            .collect();

        if relevant.is_empty() {
            None
        } else {
            Some(format!("## Relevant Memory\n\n{}", relevant.join("\n")))
        }
    }

    pub async fn build_messages(
        &self,
        history: &[ChatMessage],
        current_message: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(
            self.build_system_prompt(current_message).await,
        )];
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(current_message));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FileMemory;
    use crate::traits::MemoryCategory;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn prompt_numbers_instructions() {
        let builder = ContextBuilder::default()
            .with_instructions(vec!["Be brief".into(), "Cite sources".into()])
            .with_description("You are a research agent.")
            .with_transport_instructions(Some("Use search first.".into()))
            .with_markdown(true);

        let prompt = builder.build_system_prompt("hi").await;
        assert!(prompt.starts_with("You are a research agent."));
        assert!(prompt.contains("1. Be brief\n2. Cite sources"));
        assert!(prompt.contains("Use search first."));
        assert!(prompt.contains("markdown"));
        assert!(!prompt.contains("Current Time"));
        assert!(!prompt.contains("Tool Use Protocol"));
    }

    #[tokio::test]
    async fn tools_and_memory_sections() {
        let tmp = TempDir::new().unwrap();
        let memory: Arc<dyn Memory> = Arc::new(FileMemory::open(tmp.path()).await.unwrap());
        memory
            .store("lang", "User writes Rust daily", MemoryCategory::Core, None)
            .await
            .unwrap();

        let builder = ContextBuilder::default()
            .with_instructions(vec!["Help".into()])
            .with_memory(Some(memory))
            .with_tool_specs(vec![ToolSpec {
                name: "web_search".into(),
                description: "Search".into(),
                parameters_schema: json!({ "type": "object" }),
            }]);

        let messages = builder.build_messages(&[ChatMessage::assistant("earlier")], "rust tips").await;
        assert_eq!(messages.len(), 3);
        assert!(messages[0].content.contains("- User writes Rust daily"));
        assert!(messages[0].content.contains("**web_search**: Search"));
        assert_eq!(messages[2], ChatMessage::user("rust tips"));
    }
}
