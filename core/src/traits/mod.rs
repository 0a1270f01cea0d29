pub mod memory;
pub mod provider;
pub mod tool;
pub mod transport;

pub use memory::{Memory, MemoryCategory, MemoryEntry};
pub use provider::{ChatMessage, ChatRequest, ChatResponse, Provider, ProviderEvent, ToolCall};
pub use tool::{Tool, ToolResult, ToolSpec};
pub use transport::{NullTransport, NullTransportFactory, Transport, TransportFactory, TransportSpec};
