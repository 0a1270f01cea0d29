pub mod agent;
pub mod config;
pub mod knowledge;
pub mod mcp;
pub mod memory;
pub mod providers;
pub mod session;
pub mod tools;
pub mod traits;

pub use agent::{Agent, AgentEvent, ContextBuilder, DefaultAgentBuilder, ToolRegistry};
pub use config::*;
pub use knowledge::{KnowledgeBase, KnowledgeChunk};
pub use mcp::{McpClient, McpError, McpPreset, StdioTransportFactory};
pub use memory::{FileMemory, create_memory};
pub use providers::{ModelRef, OpenAIProvider, available_providers, create_provider, resolve_api_key};
pub use session::{
    AgentBuilder, Console, ConsoleInput, ExitReason, Responder, SessionConfig, SessionOutcome,
    SessionState, StartupError, run_session,
};
pub use tools::{
    AgentTool, CompanyNewsTool, KnowledgeSearchTool, MemoryReadTool, MemoryWriteTool, QuoteSummaryTool,
    StockPriceTool, WebSearchTool,
};
pub use traits::{
    ChatMessage, ChatRequest, ChatResponse, Memory, MemoryCategory, MemoryEntry, NullTransport,
    NullTransportFactory, Provider, ProviderEvent, Tool, ToolCall, ToolResult, ToolSpec,
    Transport, TransportFactory, TransportSpec,
};
