mod manager;
mod server;

pub use manager::McpManager;
pub use server::McpToolServer;
