/// Errors shared across the mcphost crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("agent error: {0}")]
    Agent(String),

    /// The provider reported that it is temporarily overloaded. This is the only
    /// provider failure the turn loop retries.
    #[error("provider overloaded: {0}")]
    Overloaded(String),

    #[error(
        "provider is currently overloaded (gave up after {attempts} attempts). \
         please wait a few minutes and try again"
    )]
    RetriesExhausted { attempts: u32 },

    #[error("mcp error: {0}")]
    Mcp(String),

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the failure is worth retrying under the backoff policy.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Overloaded(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
