pub mod builder;
pub mod context;
pub mod loop_;
pub mod parser;
pub mod registry;

pub use builder::DefaultAgentBuilder;
pub use context::ContextBuilder;
pub use loop_::{Agent, AgentEvent, MAX_ITERATIONS_NOTICE};
pub use parser::parse_tool_calls;
pub use registry::ToolRegistry;
