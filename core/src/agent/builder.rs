use crate::agent::{Agent, AgentEvent};
use crate::config::{AgentConfig, Config};
use crate::providers::{ModelRef, create_provider};
use crate::session::{AgentBuilder, Responder};
use crate::traits::{Memory, Tool};
use anyhow::Result;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use std::sync::Arc;

impl Responder for Agent {
    fn respond<'a>(&'a self, input: &'a str) -> BoxStream<'a, Result<AgentEvent>> {
        Agent::respond(self, input)
    }

    fn finish(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.flush_memory())
    }
}

/// Builds a provider-backed [`Agent`] from config settings. Built-in tools
/// given here are registered ahead of the ones a transport discovers.
pub struct DefaultAgentBuilder {
    name: String,
    description: Option<String>,
    settings: AgentConfig,
    stream: bool,
    memory: Option<Arc<dyn Memory>>,
    builtin_tools: Vec<Arc<dyn Tool>>,
}

impl DefaultAgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            settings: AgentConfig::default(),
            stream: true,
            memory: None,
            builtin_tools: vec![],
        }
    }

    pub fn from_config(name: impl Into<String>, config: &Config) -> Self {
        Self {
            settings: config.agent,
            stream: config.stream.enabled,
            ..Self::new(name)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_memory(mut self, memory: Option<Arc<dyn Memory>>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.builtin_tools = tools;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn build_agent(
        &self,
        model: &ModelRef,
        instructions: &[String],
        tools: Vec<Arc<dyn Tool>>,
        transport_instructions: Option<&str>,
    ) -> Result<Agent> {
        let provider = create_provider(model)?;

        let mut all_tools = self.builtin_tools.clone();
        all_tools.extend(tools);

        let mut agent = Agent::new(self.name.clone(), provider, model.model.clone())
            .with_temperature(model.temperature)
            .with_instructions(instructions.to_vec())
            .with_transport_instructions(transport_instructions.map(str::to_string))
            .with_tools(all_tools)
            .with_memory(self.memory.clone())
            .with_markdown(self.settings.markdown)
            .with_datetime(self.settings.add_datetime)
            .with_max_iterations(self.settings.max_iterations)
            .with_max_history(self.settings.max_history)
            .with_stream(self.stream);
        if let Some(description) = &self.description {
            agent = agent.with_description(description.clone());
        }

        tracing::debug!(
            agent = %self.name,
            model = %model.model,
            tools = agent.tool_names().len(),
            "agent built"
        );
        Ok(agent)
    }
}

impl AgentBuilder for DefaultAgentBuilder {
    fn build(
        &self,
        model: &ModelRef,
        instructions: &[String],
        tools: Vec<Arc<dyn Tool>>,
        transport_instructions: Option<&str>,
    ) -> Result<Arc<dyn Responder>> {
        let agent = self.build_agent(model, instructions, tools, transport_instructions)?;
        Ok(Arc::new(agent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{StockPriceTool, WebSearchTool};

    fn model(provider: &str) -> ModelRef {
        ModelRef {
            provider: provider.into(),
            model: "gpt-4o-mini".into(),
            api_key: "sk-test".into(),
            base_url: None,
            temperature: 0.2,
        }
    }

    #[test]
    fn builtin_tools_come_first() {
        let builder = DefaultAgentBuilder::new("finance")
            .with_tools(vec![Arc::new(StockPriceTool::new())]);

        let agent = builder
            .build_agent(
                &model("openai"),
                &["Use tables".into()],
                vec![
                    Arc::new(WebSearchTool::new()) as Arc<dyn Tool>,
                    Arc::new(StockPriceTool::new()),
                ],
                None,
            )
            .unwrap();

        assert_eq!(agent.name(), "finance");
        assert_eq!(agent.tool_names(), ["get_stock_price".to_string(), "web_search".to_string()]);
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let builder = DefaultAgentBuilder::new("x");
        assert!(builder.build(&model("nope"), &["a".into()], vec![], None).is_err());
    }
}
