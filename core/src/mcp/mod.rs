pub mod client;
pub mod error;
pub mod presets;
pub mod tool;
pub mod transport;

pub use client::{Handshake, McpClient, McpToolInfo};
pub use error::McpError;
pub use presets::{McpPreset, PRESET_NAMES, preset};
pub use tool::McpTool;
pub use transport::{StdioTransport, StdioTransportFactory};
