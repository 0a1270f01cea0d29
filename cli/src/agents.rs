//! Prebuilt agent profiles.

use anyhow::Result;
use conduit_core::{
    Agent, AgentTool, CompanyNewsTool, Config, DefaultAgentBuilder, KnowledgeBase,
    KnowledgeSearchTool, Memory, MemoryReadTool, MemoryWriteTool, ModelRef, QuoteSummaryTool,
    StockPriceTool, Tool, WebSearchTool,
};
use std::sync::Arc;

pub const ASSISTANT_NAME: &str = "Conduit";
pub const DEFAULT_ASK_QUERY: &str = "Who won the Indian Premier League in 2024?";
pub const DEFAULT_TEAM_QUERY: &str =
    "What are the analyst recommendations for Amazon and Netflix? Should I invest in them?";
pub const DEFAULT_MCP_INSTRUCTIONS: &str =
    "You are a helpful assistant with Model Context Protocol (MCP) tool access. Use the available tools to answer the user.";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Price, analyst, fundamentals, profile and news lookups.
fn finance_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(StockPriceTool::new()),
        Arc::new(QuoteSummaryTool::analyst_recommendations()),
        Arc::new(QuoteSummaryTool::fundamentals()),
        Arc::new(QuoteSummaryTool::company_info()),
        Arc::new(CompanyNewsTool::new()),
    ]
}

pub fn assistant_instructions(with_knowledge: bool) -> Vec<String> {
    let mut instructions = strings(&[
        "Answer the user's questions directly and accurately.",
        "Search the web for anything recent or outside your knowledge and always include sources.",
        "Use the finance tools for prices, analyst recommendations, fundamentals and company news, and show numbers in tables.",
        "Store lasting facts about the user in memory and recall them when relevant.",
    ]);
    if with_knowledge {
        instructions.insert(0, "Search your knowledge base first.".to_string());
        instructions.insert(
            1,
            "If the question is better suited for the web, search the web to fill in gaps.".to_string(),
        );
        instructions.insert(
            2,
            "Prefer the information in your knowledge base over the web results.".to_string(),
        );
    }
    instructions
}

/// Builder for the interactive `chat` assistant.
pub fn assistant_builder(
    config: &Config,
    memory: Arc<dyn Memory>,
    knowledge: Option<Arc<KnowledgeBase>>,
) -> DefaultAgentBuilder {
    let mut tools: Vec<Arc<dyn Tool>> = vec![Arc::new(WebSearchTool::new())];
    tools.extend(finance_tools());
    tools.push(Arc::new(MemoryReadTool::new(memory.clone())));
    tools.push(Arc::new(MemoryWriteTool::new(memory.clone())));
    if let Some(knowledge) = knowledge {
        tools.insert(0, Arc::new(KnowledgeSearchTool::new(knowledge)));
    }

    DefaultAgentBuilder::from_config(ASSISTANT_NAME, config)
        .with_description("You are Conduit, a research assistant that can search the web and look up market data.")
        .with_memory(Some(memory))
        .with_tools(tools)
}

pub fn web_agent(config: &Config, model: &ModelRef) -> Result<Agent> {
    let agent = DefaultAgentBuilder::from_config("Web Agent", config)
        .with_tools(vec![Arc::new(WebSearchTool::new()) as Arc<dyn Tool>])
        .build_agent(model, &strings(&["Always include sources"]), vec![], None)?;
    Ok(agent.with_role("Search the web for information"))
}

pub fn finance_agent(config: &Config, model: &ModelRef) -> Result<Agent> {
    let agent = DefaultAgentBuilder::from_config("Finance Agent", config)
        .with_tools(finance_tools())
        .build_agent(model, &strings(&["Use tables to display data"]), vec![], None)?;
    Ok(agent.with_role("Get financial data"))
}

/// A coordinator whose only tools are the web and finance members.
pub fn team_agent(config: &Config, model: &ModelRef) -> Result<Agent> {
    let members: Vec<Arc<dyn Tool>> = vec![
        Arc::new(AgentTool::new(Arc::new(web_agent(config, model)?))),
        Arc::new(AgentTool::new(Arc::new(finance_agent(config, model)?))),
    ];

    DefaultAgentBuilder::from_config("Team", config)
        .with_description("You lead a team of agents. Delegate each part of the request to the member best suited for it, then combine their answers.")
        .with_tools(members)
        .build_agent(
            model,
            &strings(&["Always include sources", "Use tables to display data"]),
            vec![],
            None,
        )
}

pub fn ask_agent(config: &Config, model: &ModelRef, stream: bool) -> Result<Agent> {
    DefaultAgentBuilder::from_config(ASSISTANT_NAME, config)
        .with_stream(stream)
        .with_description("You are an assistant please reply based on the user queries")
        .with_tools(vec![Arc::new(WebSearchTool::new()) as Arc<dyn Tool>])
        .build_agent(
            model,
            &strings(&["Search the web when the answer may have changed recently."]),
            vec![],
            None,
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ModelRef {
        ModelRef {
            provider: "groq".into(),
            model: "llama-3.3-70b-versatile".into(),
            api_key: "gsk-test".into(),
            base_url: None,
            temperature: 0.7,
        }
    }

    #[test]
    fn knowledge_instructions_come_first() {
        let plain = assistant_instructions(false);
        let with_kb = assistant_instructions(true);
        assert_eq!(with_kb.len(), plain.len() + 3);
        assert_eq!(with_kb[0], "Search your knowledge base first.");
    }

    #[test]
    fn finance_agent_covers_analyst_data() {
        let agent = finance_agent(&Config::default(), &model()).unwrap();
        assert_eq!(
            agent.tool_names(),
            [
                "get_stock_price",
                "get_analyst_recommendations",
                "get_stock_fundamentals",
                "get_company_info",
                "get_company_news"
            ]
            .map(String::from)
        );
    }

    #[test]
    fn team_delegates_to_members() {
        let team = team_agent(&Config::default(), &model()).unwrap();
        assert_eq!(
            team.tool_names(),
            ["ask_web_agent".to_string(), "ask_finance_agent".to_string()]
        );
    }
}
