pub mod loader;
pub mod model;

pub use loader::ConfigLoader;
pub use model::{McpConfig, McpServerConfig, SERVER_TOOL_SEPARATOR};
